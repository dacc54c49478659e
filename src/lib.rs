//! `layergraph` is the per-layer composition engine of a raster image editor.
//!
//! It edits a dataflow graph description that an external execution engine evaluates; it never
//! touches pixels itself. The pieces, leaves first:
//!
//! - [`ParamCache`]: single-slot memo keyed by a tuple of scalars (brush masks and the like)
//! - [`Stack`]: ordered, typed stage container with change hooks
//! - [`FilterStack`]: a stack whose pipeline graph is kept in step incrementally
//! - [`Drawable`]: composition root wiring raw pixels through filters into a blend node
//! - floating selections: an overlay stage borrowing another layer's source, driven by
//!   [`Image::attach_floating`] and [`Image::detach_floating`]
//!
//! [`Image`] owns the [`NodeGraph`] and every drawable, and is the entry point for edits.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod cache;
pub(crate) mod document;
pub(crate) mod drawable;
pub(crate) mod graph;
pub(crate) mod overlay;
pub(crate) mod pipeline;
pub(crate) mod stack;

pub use crate::foundation::buffer::{BufferRef, PixelFormat};
pub use crate::foundation::core::{BlendMode, ChannelMask, PixelRect, Rect};
pub use crate::foundation::error::{ComposeError, ComposeResult};

pub use crate::cache::param_cache::{
    BrushTransform, CacheStats, ParamCache, ParamCacheOpts, Params, Scalar,
};
pub use crate::document::model::Image;
pub use crate::document::opts::{ImageEvent, ImageOpts};
pub use crate::drawable::root::{Drawable, DrawableId};
pub use crate::graph::node::{
    Invalidation, NodeGraph, NodeId, Operation, Port, PropValue, Ripped,
};
pub use crate::graph::snapshot::{GraphFingerprint, GraphSnapshot, SnapshotEdge, SnapshotNode};
pub use crate::overlay::applicator::Applicator;
pub use crate::overlay::floating::Overlay;
pub use crate::pipeline::sync::{FilterStack, PipelineSync};
pub use crate::stack::container::{Stack, StackCx, StackHooks};
pub use crate::stack::stage::{Stage, StageId, StageKind, StackId, StagePool};
