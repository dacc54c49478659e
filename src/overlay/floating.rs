use crate::foundation::buffer::BufferRef;
use crate::foundation::core::{BlendMode, ChannelMask, PixelRect};
use crate::foundation::error::ComposeResult;
use crate::graph::node::{NodeGraph, NodeId, Operation, Port, PropValue, Ripped};
use crate::overlay::applicator::Applicator;
use crate::pipeline::sync::FilterStack;
use crate::stack::container::StackCx;
use crate::stack::stage::{StageId, StageKind};

/// Current state every overlay parameter is derived from.
///
/// Captured fresh for each re-sync; nothing is patched incrementally.
#[derive(Clone, Debug)]
pub(crate) struct OverlayParams {
    /// Bounds of the drawable hosting the overlay, in image space.
    pub target: PixelRect,
    /// Bounds of the floating layer, in image space.
    pub layer: PixelRect,
    pub mode: BlendMode,
    pub opacity: f64,
    /// Selection mask, `None` when the selection is empty.
    pub selection: Option<BufferRef>,
    /// Active-channel mask of the hosting drawable.
    pub affect: ChannelMask,
}

/// Floating-selection stage materialized inside a drawable's filter stack.
///
/// Holds the floating layer's source subgraph while it is composited here; the layer gets it
/// back when the overlay is dismantled.
#[derive(Debug)]
pub struct Overlay {
    stage: StageId,
    node: NodeId,
    ripped: Ripped,
    crop: NodeId,
    applicator: Applicator,
}

impl Overlay {
    /// Stage sitting on top of the host's filter stack.
    pub fn stage(&self) -> StageId {
        self.stage
    }

    /// Meta node of the overlay stage.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Crop node between the borrowed layer source and the applicator.
    pub fn crop_node(&self) -> NodeId {
        self.crop
    }

    /// Source node borrowed from the floating layer.
    pub fn layer_source(&self) -> NodeId {
        self.ripped.node()
    }

    /// Blend node compositing the floating layer.
    pub fn applicator(&self) -> &Applicator {
        &self.applicator
    }

    /// Build the overlay stage around `layer_source` and put it on top of `filters`.
    ///
    /// `layer_source` is pulled out of whatever composition it belongs to; the returned overlay
    /// owns the only way back.
    pub(crate) fn materialize(
        cx: &mut StackCx<'_>,
        filters: &mut FilterStack,
        layer_source: NodeId,
        name: &str,
        linear: bool,
    ) -> ComposeResult<Self> {
        let stage = cx.stages.create(name, StageKind::Filter, Operation::Meta);
        let node = cx.stages.ensure_node(stage, cx.graph)?;

        let mut ripped = cx.graph.rip_out(layer_source)?;
        cx.graph.host(&mut ripped, node)?;

        let applicator = Applicator::new(cx.graph, node, format!("{name}:applicator"), linear)?;
        let crop = cx
            .graph
            .create_child(node, Operation::Crop, format!("{name}:crop"))?;
        cx.graph.connect(layer_source, crop, Port::Input)?;
        cx.graph.connect(crop, applicator.node(), Port::Aux)?;

        let input = cx.graph.input_proxy(node)?;
        let output = cx.graph.output_proxy(node)?;
        cx.graph.connect(input, applicator.node(), Port::Input)?;
        cx.graph.connect(applicator.node(), output, Port::Input)?;

        filters.add(cx, stage)?;
        tracing::debug!(stack = filters.label(), "materialized floating selection overlay");

        Ok(Self {
            stage,
            node,
            ripped,
            crop,
            applicator,
        })
    }

    /// Re-derive crop, offsets, mask, blend and channel parameters from `p`.
    ///
    /// Returns whether anything in the graph changed.
    pub(crate) fn resync(
        &mut self,
        graph: &mut NodeGraph,
        p: &OverlayParams,
    ) -> ComposeResult<bool> {
        let mut changed = false;

        // The host's window, expressed in the floating layer's own coordinates.
        let window = PixelRect::new(
            p.target.x.saturating_sub(p.layer.x),
            p.target.y.saturating_sub(p.layer.y),
            p.target.width,
            p.target.height,
        )
        .to_kurbo();
        for (key, value) in [
            ("x", window.x0),
            ("y", window.y0),
            ("width", window.width()),
            ("height", window.height()),
        ] {
            changed |= graph.set_property(self.crop, key, PropValue::Float(value))?;
        }

        changed |= self.applicator.set_apply_offset(
            graph,
            p.layer.x.saturating_sub(p.target.x),
            p.layer.y.saturating_sub(p.target.y),
        )?;

        match &p.selection {
            None => changed |= self.applicator.set_mask(graph, None)?,
            Some(mask) => {
                changed |= self.applicator.set_mask(graph, Some(mask.clone()))?;
                changed |= self.applicator.set_mask_offset(
                    graph,
                    p.target.x.saturating_neg(),
                    p.target.y.saturating_neg(),
                )?;
            }
        }

        changed |= self.applicator.set_mode(graph, p.opacity, p.mode)?;
        changed |= self.applicator.set_affect(graph, p.affect)?;

        tracing::trace!(changed, "re-synced floating selection overlay");
        Ok(changed)
    }

    /// Take the overlay stage out of `filters` and return the borrowed source to `home`,
    /// feeding `consumer` again.
    pub(crate) fn dismantle(
        self,
        cx: &mut StackCx<'_>,
        filters: &mut FilterStack,
        home: Option<NodeId>,
        consumer: Option<(NodeId, Port)>,
    ) -> ComposeResult<NodeId> {
        let Self { stage, ripped, .. } = self;
        filters.remove(cx, stage)?;
        let source = cx.graph.splice_back(ripped, home, consumer)?;
        cx.stages.release(stage, cx.graph)?;
        tracing::debug!(stack = filters.label(), "dismantled floating selection overlay");
        Ok(source)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/floating.rs"]
mod tests;
