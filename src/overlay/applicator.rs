use crate::foundation::buffer::BufferRef;
use crate::foundation::core::{BlendMode, ChannelMask};
use crate::foundation::error::ComposeResult;
use crate::graph::node::{NodeGraph, NodeId, Operation, PropValue};

/// Masked, channel-restricted blend node with cached parameters.
///
/// Every setter compares against the last value it wrote and leaves the graph alone when
/// nothing changed, so a burst of identical re-syncs edits nothing.
#[derive(Debug)]
pub struct Applicator {
    node: NodeId,
    apply_offset: (i32, i32),
    mask: Option<BufferRef>,
    mask_offset: (i32, i32),
    mode: BlendMode,
    opacity: f64,
    affect: ChannelMask,
}

impl Applicator {
    /// Create the applicator node inside the meta node `parent`.
    pub(crate) fn new(
        graph: &mut NodeGraph,
        parent: NodeId,
        label: impl Into<String>,
        linear: bool,
    ) -> ComposeResult<Self> {
        let node = graph.create_child(parent, Operation::Applicator, label)?;
        let this = Self {
            node,
            apply_offset: (0, 0),
            mask: None,
            mask_offset: (0, 0),
            mode: BlendMode::Normal,
            opacity: 1.0,
            affect: ChannelMask::all(),
        };

        graph.set_property(node, "linear", PropValue::Bool(linear))?;
        graph.set_property(node, "apply_x", PropValue::Int(0))?;
        graph.set_property(node, "apply_y", PropValue::Int(0))?;
        graph.set_property(node, "mask", PropValue::Buffer(None))?;
        graph.set_property(node, "mask_x", PropValue::Int(0))?;
        graph.set_property(node, "mask_y", PropValue::Int(0))?;
        graph.set_property(node, "mode", PropValue::Mode(this.mode))?;
        graph.set_property(node, "opacity", PropValue::Float(this.opacity))?;
        graph.set_property(node, "affect", PropValue::Channels(this.affect))?;
        Ok(this)
    }

    /// The blend node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Offset at which the `aux` input is composited.
    pub fn apply_offset(&self) -> (i32, i32) {
        self.apply_offset
    }

    /// Current mask buffer.
    pub fn mask(&self) -> Option<&BufferRef> {
        self.mask.as_ref()
    }

    /// Offset of the mask buffer.
    pub fn mask_offset(&self) -> (i32, i32) {
        self.mask_offset
    }

    /// Blend mode.
    pub fn mode(&self) -> BlendMode {
        self.mode
    }

    /// Opacity in `0.0..=1.0`.
    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// Channels the blend may write.
    pub fn affect(&self) -> ChannelMask {
        self.affect
    }

    pub(crate) fn set_apply_offset(
        &mut self,
        graph: &mut NodeGraph,
        x: i32,
        y: i32,
    ) -> ComposeResult<bool> {
        if self.apply_offset == (x, y) {
            return Ok(false);
        }
        self.apply_offset = (x, y);
        graph.set_property(self.node, "apply_x", PropValue::Int(x.into()))?;
        graph.set_property(self.node, "apply_y", PropValue::Int(y.into()))?;
        Ok(true)
    }

    pub(crate) fn set_mask(
        &mut self,
        graph: &mut NodeGraph,
        mask: Option<BufferRef>,
    ) -> ComposeResult<bool> {
        if self.mask == mask {
            return Ok(false);
        }
        graph.set_property(self.node, "mask", PropValue::Buffer(mask.clone()))?;
        self.mask = mask;
        Ok(true)
    }

    pub(crate) fn set_mask_offset(
        &mut self,
        graph: &mut NodeGraph,
        x: i32,
        y: i32,
    ) -> ComposeResult<bool> {
        if self.mask_offset == (x, y) {
            return Ok(false);
        }
        self.mask_offset = (x, y);
        graph.set_property(self.node, "mask_x", PropValue::Int(x.into()))?;
        graph.set_property(self.node, "mask_y", PropValue::Int(y.into()))?;
        Ok(true)
    }

    pub(crate) fn set_mode(
        &mut self,
        graph: &mut NodeGraph,
        opacity: f64,
        mode: BlendMode,
    ) -> ComposeResult<bool> {
        if self.opacity == opacity && self.mode == mode {
            return Ok(false);
        }
        self.opacity = opacity;
        self.mode = mode;
        graph.set_property(self.node, "opacity", PropValue::Float(opacity))?;
        graph.set_property(self.node, "mode", PropValue::Mode(mode))?;
        Ok(true)
    }

    pub(crate) fn set_affect(
        &mut self,
        graph: &mut NodeGraph,
        affect: ChannelMask,
    ) -> ComposeResult<bool> {
        if self.affect == affect {
            return Ok(false);
        }
        self.affect = affect;
        graph.set_property(self.node, "affect", PropValue::Channels(affect))?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/applicator.rs"]
mod tests;
