use crate::foundation::buffer::BufferRef;
use crate::foundation::core::{BlendMode, ChannelMask, PixelRect};
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::graph::node::{NodeGraph, NodeId, Operation, Port, PropValue};
use crate::overlay::floating::Overlay;
use crate::pipeline::sync::FilterStack;
use crate::stack::container::StackCx;
use crate::stack::stage::{StageId, StageKind, StagePool};

/// Handle to a drawable owned by an [`Image`](crate::Image).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct DrawableId(pub(crate) u32);

/// Floating-selection role of a drawable hosting one.
#[derive(Debug, Default)]
pub(crate) enum FloatingState {
    #[default]
    None,
    Attached {
        layer: DrawableId,
        /// `None` until the host's source node exists.
        overlay: Option<Overlay>,
    },
}

#[derive(Clone, Copy, Debug, Default)]
struct RootNodes {
    source: Option<NodeId>,
    buffer_source: Option<NodeId>,
    layer: Option<NodeId>,
    offset: Option<NodeId>,
    mode: Option<NodeId>,
}

/// Per-drawable composition root.
///
/// Wires the raw pixel source through the drawable's filter pipeline (the *source node*) and,
/// for layers, through an offset and a blend-mode node (the *layer node*). Nodes are built on
/// first request; see [`Image::source_node`](crate::Image::source_node) and
/// [`Image::layer_node`](crate::Image::layer_node).
#[derive(Debug)]
pub struct Drawable {
    id: DrawableId,
    name: String,
    x: i32,
    y: i32,
    buffer: BufferRef,
    visible: bool,
    mode: BlendMode,
    opacity: f64,
    pub(crate) filters: FilterStack,
    nodes: RootNodes,
    pub(crate) floating: FloatingState,
    pub(crate) layer_stage: Option<StageId>,
}

impl Drawable {
    pub(crate) fn new(
        id: DrawableId,
        name: String,
        x: i32,
        y: i32,
        buffer: BufferRef,
        stages: &mut StagePool,
    ) -> Self {
        let filters =
            FilterStack::with_pipeline(stages, format!("{name}:filters"), StageKind::Filter);
        Self {
            id,
            name,
            x,
            y,
            buffer,
            visible: true,
            mode: BlendMode::Normal,
            opacity: 1.0,
            filters,
            nodes: RootNodes::default(),
            floating: FloatingState::None,
            layer_stage: None,
        }
    }

    /// Drawable handle.
    pub fn id(&self) -> DrawableId {
        self.id
    }

    /// Drawable name; also the label prefix of its nodes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Origin in image space.
    pub fn offset(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Origin plus buffer size, in image space.
    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(self.x, self.y, self.buffer.width(), self.buffer.height())
    }

    /// Backing pixel buffer.
    pub fn buffer(&self) -> &BufferRef {
        &self.buffer
    }

    /// Whether the layer is composited.
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Blend mode of the layer.
    pub fn mode(&self) -> BlendMode {
        self.mode
    }

    /// Layer opacity in `0.0..=1.0`.
    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// Filters applied between the raw source and the layer.
    pub fn filters(&self) -> &FilterStack {
        &self.filters
    }

    /// Source node, if built.
    pub fn source_node(&self) -> Option<NodeId> {
        self.nodes.source
    }

    /// Raw buffer-source node, if built.
    pub fn buffer_source_node(&self) -> Option<NodeId> {
        self.nodes.buffer_source
    }

    /// Layer node, if built.
    pub fn layer_node(&self) -> Option<NodeId> {
        self.nodes.layer
    }

    /// Offset node inside the layer node, if built.
    pub fn offset_node(&self) -> Option<NodeId> {
        self.nodes.offset
    }

    /// Blend-mode node inside the layer node, if built.
    pub fn mode_node(&self) -> Option<NodeId> {
        self.nodes.mode
    }

    /// Floating layer attached to this drawable.
    pub fn floating_selection(&self) -> Option<DrawableId> {
        match &self.floating {
            FloatingState::None => None,
            FloatingState::Attached { layer, .. } => Some(*layer),
        }
    }

    /// Materialized floating-selection overlay.
    pub fn overlay(&self) -> Option<&Overlay> {
        match &self.floating {
            FloatingState::Attached {
                overlay: Some(o), ..
            } => Some(o),
            _ => None,
        }
    }

    /// Stage representing this drawable in the image's layer stack.
    pub fn layer_stage(&self) -> Option<StageId> {
        self.layer_stage
    }

    /// Channels this drawable may write: `image_channels` minus alpha when the buffer has none.
    pub fn active_mask(&self, image_channels: ChannelMask) -> ChannelMask {
        if self.buffer.format().has_alpha() {
            image_channels
        } else {
            image_channels - ChannelMask::ALPHA
        }
    }

    /// Build `buffer source -> filters -> output` inside a fresh meta node.
    ///
    /// Idempotent. Floating-selection sync is left to the caller.
    pub(crate) fn build_source(&mut self, cx: &mut StackCx<'_>) -> ComposeResult<NodeId> {
        if let Some(source) = self.nodes.source {
            return Ok(source);
        }

        let source = cx
            .graph
            .create_node(Operation::Meta, format!("{}:source", self.name));
        let buffer_source = cx.graph.create_child(
            source,
            Operation::BufferSource,
            format!("{}:buffer", self.name),
        )?;
        cx.graph.set_property(
            buffer_source,
            "buffer",
            PropValue::Buffer(Some(self.buffer.clone())),
        )?;

        let filters = self.filters.get_graph(cx)?;
        cx.graph.add_child(source, filters)?;
        cx.graph.connect(buffer_source, filters, Port::Input)?;
        let output = cx.graph.output_proxy(source)?;
        cx.graph.connect(filters, output, Port::Input)?;

        self.nodes.source = Some(source);
        self.nodes.buffer_source = Some(buffer_source);
        tracing::debug!(drawable = %self.name, "built source node");
        Ok(source)
    }

    /// Build the layer node: `source -> offset -> mode.aux`, `input -> mode -> output`.
    ///
    /// A source already owned by another meta node has been borrowed by a floating-selection
    /// overlay and is left where it is.
    pub(crate) fn build_layer(&mut self, cx: &mut StackCx<'_>) -> ComposeResult<NodeId> {
        if let Some(layer) = self.nodes.layer {
            return Ok(layer);
        }
        let source = self.build_source(cx)?;

        let layer = cx.graph.create_node(Operation::Meta, self.name.clone());
        let hijacked = cx.graph.parent(source).is_some();
        if !hijacked {
            cx.graph.add_child(layer, source)?;
        }

        let offset = cx.graph.create_child(
            layer,
            Operation::Translate,
            format!("{}:offset", self.name),
        )?;
        cx.graph.set_property(offset, "x", PropValue::Int(self.x.into()))?;
        cx.graph.set_property(offset, "y", PropValue::Int(self.y.into()))?;
        if !hijacked {
            cx.graph.connect(source, offset, Port::Input)?;
        }

        let mode = cx
            .graph
            .create_child(layer, Operation::LayerMode, format!("{}:mode", self.name))?;
        cx.graph.set_property(mode, "mode", PropValue::Mode(self.mode))?;
        cx.graph.set_property(mode, "opacity", PropValue::Float(self.opacity))?;
        cx.graph.connect(offset, mode, Port::Aux)?;

        self.nodes.layer = Some(layer);
        self.nodes.offset = Some(offset);
        self.nodes.mode = Some(mode);
        self.wire_visibility(cx.graph)?;

        tracing::debug!(drawable = %self.name, hijacked, "built layer node");
        Ok(layer)
    }

    fn wire_visibility(&self, graph: &mut NodeGraph) -> ComposeResult<()> {
        let (Some(layer), Some(mode)) = (self.nodes.layer, self.nodes.mode) else {
            return Ok(());
        };
        let input = graph.input_proxy(layer)?;
        let output = graph.output_proxy(layer)?;
        if self.visible {
            graph.connect(input, mode, Port::Input)?;
            graph.connect(mode, output, Port::Input)
        } else {
            graph.disconnect(mode, Port::Input)?;
            graph.connect(input, output, Port::Input)
        }
    }

    /// Where the source node lives when no overlay has borrowed it.
    pub(crate) fn source_home(&self) -> (Option<NodeId>, Option<(NodeId, Port)>) {
        (self.nodes.layer, self.nodes.offset.map(|n| (n, Port::Input)))
    }

    pub(crate) fn set_visible(
        &mut self,
        graph: &mut NodeGraph,
        visible: bool,
    ) -> ComposeResult<bool> {
        if self.visible == visible {
            return Ok(false);
        }
        self.visible = visible;
        self.wire_visibility(graph)?;
        Ok(true)
    }

    pub(crate) fn set_mode(
        &mut self,
        graph: &mut NodeGraph,
        mode: BlendMode,
    ) -> ComposeResult<bool> {
        if self.mode == mode {
            return Ok(false);
        }
        self.mode = mode;
        if let Some(node) = self.nodes.mode {
            graph.set_property(node, "mode", PropValue::Mode(mode))?;
        }
        Ok(true)
    }

    pub(crate) fn set_opacity(
        &mut self,
        graph: &mut NodeGraph,
        opacity: f64,
    ) -> ComposeResult<bool> {
        if !opacity.is_finite() {
            return Err(ComposeError::invalid_argument(format!(
                "opacity must be finite, got {opacity}"
            )));
        }
        let opacity = opacity.clamp(0.0, 1.0);
        if self.opacity == opacity {
            return Ok(false);
        }
        self.opacity = opacity;
        if let Some(node) = self.nodes.mode {
            graph.set_property(node, "opacity", PropValue::Float(opacity))?;
        }
        Ok(true)
    }

    pub(crate) fn set_offset(
        &mut self,
        graph: &mut NodeGraph,
        x: i32,
        y: i32,
    ) -> ComposeResult<bool> {
        if (self.x, self.y) == (x, y) {
            return Ok(false);
        }
        self.x = x;
        self.y = y;
        if let Some(node) = self.nodes.offset {
            graph.set_property(node, "x", PropValue::Int(x.into()))?;
            graph.set_property(node, "y", PropValue::Int(y.into()))?;
        }
        Ok(true)
    }

    /// Swap the backing buffer. The buffer-source node keeps its place in the graph.
    pub(crate) fn set_buffer(
        &mut self,
        graph: &mut NodeGraph,
        buffer: BufferRef,
    ) -> ComposeResult<()> {
        if let Some(node) = self.nodes.buffer_source {
            graph.set_property(node, "buffer", PropValue::Buffer(Some(buffer.clone())))?;
        }
        self.buffer = buffer;
        Ok(())
    }

    /// Record damage in drawable coordinates. Nothing to record before the source exists.
    pub(crate) fn update(&self, graph: &mut NodeGraph, rect: PixelRect) -> ComposeResult<()> {
        match self.nodes.source {
            Some(source) => graph.invalidate(source, rect),
            None => Ok(()),
        }
    }

    /// Free every node and filter stage this drawable owns.
    ///
    /// Must not host or be borrowed by a floating-selection overlay, and must be out of the
    /// layer stack.
    pub(crate) fn teardown(mut self, cx: &mut StackCx<'_>) -> ComposeResult<()> {
        if self.overlay().is_some() {
            return Err(ComposeError::contract(format!(
                "drawable '{}' still hosts a floating selection",
                self.name
            )));
        }
        for stage in self.filters.clear(cx)? {
            cx.stages.release(stage, cx.graph)?;
        }
        self.filters.release_graph(cx)?;

        let root = self.nodes.layer.or(self.nodes.source);
        if let Some(root) = root
            && cx.graph.contains(root)
        {
            cx.graph.remove_node(root)?;
        }
        if let Some(source) = self.nodes.source
            && cx.graph.contains(source)
        {
            cx.graph.remove_node(source)?;
        }
        tracing::debug!(drawable = %self.name, "tore down drawable");
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/drawable/root.rs"]
mod tests;
