use std::sync::Arc;

use image::{GrayImage, RgbImage, RgbaImage};

/// Pixel layouts understood by the composition engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit RGBA, straight alpha.
    Rgba8,
    /// 8-bit RGB without alpha.
    Rgb8,
    /// 8-bit single channel, used for selection masks.
    Gray8,
}

impl PixelFormat {
    /// Return `true` when the format carries an alpha channel.
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba8)
    }
}

/// Shared reference to a pixel buffer.
///
/// Equality is identity: two references are equal only when they point at the same
/// allocation, which is what a buffer-source node cares about.
#[derive(Clone)]
pub enum BufferRef {
    /// RGBA pixels.
    Rgba(Arc<RgbaImage>),
    /// RGB pixels.
    Rgb(Arc<RgbImage>),
    /// Single-channel pixels.
    Gray(Arc<GrayImage>),
}

impl BufferRef {
    /// Allocate a transparent RGBA buffer.
    pub fn new_rgba(width: u32, height: u32) -> Self {
        Self::Rgba(Arc::new(RgbaImage::new(width, height)))
    }

    /// Allocate a black RGB buffer.
    pub fn new_rgb(width: u32, height: u32) -> Self {
        Self::Rgb(Arc::new(RgbImage::new(width, height)))
    }

    /// Allocate an empty (all-zero) mask buffer.
    pub fn new_gray(width: u32, height: u32) -> Self {
        Self::Gray(Arc::new(GrayImage::new(width, height)))
    }

    /// Buffer width in pixels.
    pub fn width(&self) -> u32 {
        match self {
            Self::Rgba(b) => b.width(),
            Self::Rgb(b) => b.width(),
            Self::Gray(b) => b.width(),
        }
    }

    /// Buffer height in pixels.
    pub fn height(&self) -> u32 {
        match self {
            Self::Rgba(b) => b.height(),
            Self::Rgb(b) => b.height(),
            Self::Gray(b) => b.height(),
        }
    }

    /// Pixel layout of the buffer.
    pub fn format(&self) -> PixelFormat {
        match self {
            Self::Rgba(_) => PixelFormat::Rgba8,
            Self::Rgb(_) => PixelFormat::Rgb8,
            Self::Gray(_) => PixelFormat::Gray8,
        }
    }

    /// Return `true` when every sample is zero.
    pub fn is_all_zero(&self) -> bool {
        match self {
            Self::Rgba(b) => b.as_raw().iter().all(|&v| v == 0),
            Self::Rgb(b) => b.as_raw().iter().all(|&v| v == 0),
            Self::Gray(b) => b.as_raw().iter().all(|&v| v == 0),
        }
    }

    fn ptr(&self) -> *const () {
        match self {
            Self::Rgba(b) => Arc::as_ptr(b).cast(),
            Self::Rgb(b) => Arc::as_ptr(b).cast(),
            Self::Gray(b) => Arc::as_ptr(b).cast(),
        }
    }
}

impl PartialEq for BufferRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.ptr(), other.ptr())
    }
}

impl std::fmt::Debug for BufferRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferRef")
            .field("format", &self.format())
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl serde::Serialize for BufferRef {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut st = s.serialize_struct("BufferRef", 3)?;
        st.serialize_field("format", &self.format())?;
        st.serialize_field("width", &self.width())?;
        st.serialize_field("height", &self.height())?;
        st.end()
    }
}
