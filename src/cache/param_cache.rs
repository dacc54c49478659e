use smallvec::SmallVec;

/// One scalar component of a cache key.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Scalar {
    /// Integer parameter (pixel sizes).
    Int(i64),
    /// Floating-point parameter, compared exactly.
    Float(f64),
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Key tuple of a [`ParamCache`].
pub type Params = SmallVec<[Scalar; 6]>;

/// Options for a [`ParamCache`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ParamCacheOpts {
    /// Name used in trace output.
    pub label: String,
    /// Maintain hit/miss counters.
    pub count_stats: bool,
}

impl Default for ParamCacheOpts {
    fn default() -> Self {
        Self {
            label: "cache".to_owned(),
            count_stats: true,
        }
    }
}

/// Diagnostic counters; they never influence lookups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Successful lookups.
    pub hits: u64,
    /// Failed lookups.
    pub misses: u64,
}

type Release<T> = Box<dyn FnMut(T)>;

/// Single-slot memo of one derived artifact keyed by a tuple of scalars.
///
/// A lookup hits only when every parameter equals the one stored by the last
/// [`ParamCache::add`]. Storing a new entry hands the previous one to the release callback.
/// Not thread-safe.
pub struct ParamCache<T> {
    opts: ParamCacheOpts,
    entry: Option<(T, Params)>,
    release: Option<Release<T>>,
    stats: CacheStats,
}

impl<T> ParamCache<T> {
    /// Cache whose evicted entries are simply dropped.
    pub fn new(opts: ParamCacheOpts) -> Self {
        Self {
            opts,
            entry: None,
            release: None,
            stats: CacheStats::default(),
        }
    }

    /// Cache whose evicted entries go through `release`.
    pub fn with_release(opts: ParamCacheOpts, release: impl FnMut(T) + 'static) -> Self {
        Self {
            opts,
            entry: None,
            release: Some(Box::new(release)),
            stats: CacheStats::default(),
        }
    }

    /// Look up the artifact stored for exactly `params`.
    pub fn get(&mut self, params: &[Scalar]) -> Option<&T> {
        let hit = matches!(&self.entry, Some((_, p)) if p.as_slice() == params);
        if self.opts.count_stats {
            if hit {
                self.stats.hits = self.stats.hits.saturating_add(1);
            } else {
                self.stats.misses = self.stats.misses.saturating_add(1);
            }
        }
        tracing::trace!(cache = %self.opts.label, hit, "param cache lookup");
        if hit {
            self.entry.as_ref().map(|(data, _)| data)
        } else {
            None
        }
    }

    /// Store `data` for `params`, releasing the previous entry.
    pub fn add(&mut self, data: T, params: impl IntoIterator<Item = Scalar>) {
        self.clear();
        self.entry = Some((data, params.into_iter().collect()));
    }

    /// Release the stored entry, if any.
    pub fn clear(&mut self) {
        if let Some((old, _)) = self.entry.take()
            && let Some(release) = self.release.as_mut()
        {
            release(old);
        }
    }

    /// Return `true` when an entry is stored.
    pub fn is_filled(&self) -> bool {
        self.entry.is_some()
    }

    /// Lookup counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl<T> Drop for ParamCache<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> std::fmt::Debug for ParamCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamCache")
            .field("label", &self.opts.label)
            .field("params", &self.entry.as_ref().map(|(_, p)| p))
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Geometry of a transformed brush, the usual key of a brush mask cache.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BrushTransform {
    /// Transformed mask width.
    pub width: u32,
    /// Transformed mask height.
    pub height: u32,
    /// Scale factor, must be positive.
    pub scale: f64,
    /// Aspect ratio in `[-20, 20]`; 0 keeps the original shape.
    pub aspect_ratio: f64,
    /// Rotation angle.
    pub angle: f64,
    /// Hardness in `[0, 1]`.
    pub hardness: f64,
}

impl BrushTransform {
    /// Return `true` when the transform leaves the source mask unchanged.
    pub fn is_identity(&self) -> bool {
        self.scale == 1.0 && self.aspect_ratio == 0.0 && self.angle == 0.0 && self.hardness == 1.0
    }

    /// Cache key for this transform.
    pub fn params(&self) -> Params {
        [
            Scalar::from(self.width),
            Scalar::from(self.height),
            Scalar::from(self.scale),
            Scalar::from(self.aspect_ratio),
            Scalar::from(self.angle),
            Scalar::from(self.hardness),
        ]
        .into_iter()
        .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/param_cache.rs"]
mod tests;
