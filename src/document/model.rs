use std::collections::VecDeque;

use crate::document::opts::{ImageEvent, ImageOpts};
use crate::drawable::root::{Drawable, DrawableId, FloatingState};
use crate::foundation::buffer::{BufferRef, PixelFormat};
use crate::foundation::core::{BlendMode, ChannelMask, PixelRect};
use crate::foundation::error::{ComposeError, ComposeResult};
use crate::graph::node::{Invalidation, NodeGraph, NodeId, Operation};
use crate::overlay::floating::{Overlay, OverlayParams};
use crate::pipeline::sync::FilterStack;
use crate::stack::container::StackCx;
use crate::stack::stage::{StageId, StageKind, StagePool};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FloatingLink {
    layer: DrawableId,
    target: DrawableId,
}

/// An image: drawables, their layer stack, the selection, and the graph describing them.
///
/// All graph edits go through here. Property changes that affect a floating selection are
/// queued as [`ImageEvent`]s and handled once the setter that caused them is done, so the
/// overlay is never restructured halfway through another edit.
#[derive(Debug)]
pub struct Image {
    opts: ImageOpts,
    width: u32,
    height: u32,
    graph: NodeGraph,
    stages: StagePool,
    drawables: Vec<Option<Drawable>>,
    layers: FilterStack,
    selection: Option<BufferRef>,
    active_channels: ChannelMask,
    floating: Option<FloatingLink>,
    events: VecDeque<ImageEvent>,
}

fn slot(drawables: &[Option<Drawable>], id: DrawableId) -> ComposeResult<&Drawable> {
    drawables
        .get(id.0 as usize)
        .and_then(Option::as_ref)
        .ok_or_else(|| ComposeError::invalid_argument(format!("unknown drawable {}", id.0)))
}

fn slot_mut(drawables: &mut [Option<Drawable>], id: DrawableId) -> ComposeResult<&mut Drawable> {
    drawables
        .get_mut(id.0 as usize)
        .and_then(Option::as_mut)
        .ok_or_else(|| ComposeError::invalid_argument(format!("unknown drawable {}", id.0)))
}

/// The whole of `d` in its own coordinates.
fn extent(d: &Drawable) -> PixelRect {
    let b = d.bounds();
    PixelRect::new(0, 0, b.width, b.height)
}

impl Image {
    /// Create an empty `width` x `height` image.
    pub fn new(width: u32, height: u32, opts: ImageOpts) -> Self {
        let mut stages = StagePool::new();
        let layers = FilterStack::with_pipeline(&mut stages, "image", StageKind::Layer);
        Self {
            graph: NodeGraph::with_invalidations(opts.record_damage),
            opts,
            width,
            height,
            stages,
            drawables: Vec::new(),
            layers,
            selection: None,
            active_channels: ChannelMask::all(),
            floating: None,
            events: VecDeque::new(),
        }
    }

    /// Options the image was created with.
    pub fn opts(&self) -> &ImageOpts {
        &self.opts
    }

    /// Canvas width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Canvas height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Graph description for the execution engine.
    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    /// Stage arena shared by every stack of this image.
    pub fn stages(&self) -> &StagePool {
        &self.stages
    }

    /// Layer stack; index 0 is the topmost layer.
    pub fn layers(&self) -> &FilterStack {
        &self.layers
    }

    /// Look up a drawable.
    pub fn drawable(&self, id: DrawableId) -> Option<&Drawable> {
        slot(&self.drawables, id).ok()
    }

    /// Every live drawable.
    pub fn drawables(&self) -> impl Iterator<Item = &Drawable> + '_ {
        self.drawables.iter().flatten()
    }

    /// Current selection mask, empty or not.
    pub fn selection(&self) -> Option<&BufferRef> {
        self.selection.as_ref()
    }

    /// Return `true` when no pixel is selected.
    pub fn is_selection_empty(&self) -> bool {
        self.selection.as_ref().is_none_or(BufferRef::is_all_zero)
    }

    /// Channels editing operations may write.
    pub fn active_channels(&self) -> ChannelMask {
        self.active_channels
    }

    /// The floating layer, if one is attached.
    pub fn floating_layer(&self) -> Option<DrawableId> {
        self.floating.map(|l| l.layer)
    }

    /// Drawable hosting the floating layer.
    pub fn floating_target(&self) -> Option<DrawableId> {
        self.floating.map(|l| l.target)
    }

    /// Events waiting for [`Image::dispatch_events`].
    pub fn pending_events(&self) -> impl Iterator<Item = ImageEvent> + '_ {
        self.events.iter().copied()
    }

    /// Drain the damage recorded since the last call.
    pub fn take_invalidations(&mut self) -> Vec<Invalidation> {
        self.graph.take_invalidations()
    }

    /// Create a drawable with its top-left corner at `(x, y)`. It is not yet a layer.
    pub fn add_drawable(
        &mut self,
        name: impl Into<String>,
        x: i32,
        y: i32,
        buffer: BufferRef,
    ) -> ComposeResult<DrawableId> {
        let name = name.into();
        if name.is_empty() {
            return Err(ComposeError::invalid_argument("drawable name must not be empty"));
        }
        let id = DrawableId(self.drawables.len() as u32);
        let d = Drawable::new(id, name, x, y, buffer, &mut self.stages);
        self.drawables.push(Some(d));
        Ok(id)
    }

    /// Put a drawable into the layer stack at `index` (0 = top).
    #[tracing::instrument(skip(self))]
    pub fn add_layer(&mut self, id: DrawableId, index: usize) -> ComposeResult<()> {
        let d = slot(&self.drawables, id)?;
        if d.layer_stage.is_some() {
            tracing::warn!(drawable = d.name(), "already in the layer stack");
            return Err(ComposeError::invalid_argument(format!(
                "drawable '{}' is already a layer",
                d.name()
            )));
        }

        let stage = self
            .stages
            .create(d.name().to_owned(), StageKind::Layer, Operation::Meta);
        if let Err(e) = self.link_layer(id, stage, index) {
            self.stages.release(stage, &mut self.graph)?;
            return Err(e);
        }
        slot_mut(&mut self.drawables, id)?.layer_stage = Some(stage);
        Ok(())
    }

    fn link_layer(&mut self, id: DrawableId, stage: StageId, index: usize) -> ComposeResult<()> {
        if self.layers.peek_graph().is_some() {
            let node = self.layer_node(id)?;
            self.stages.bind_node(stage, node)?;
        }
        let mut cx = StackCx::new(&mut self.stages, &mut self.graph);
        self.layers.insert(&mut cx, stage, index)
    }

    /// Take a drawable out of the layer stack, detaching a floating selection it hosts.
    #[tracing::instrument(skip(self))]
    pub fn remove_layer(&mut self, id: DrawableId) -> ComposeResult<()> {
        let d = slot(&self.drawables, id)?;
        let Some(stage) = d.layer_stage else {
            tracing::warn!(drawable = d.name(), "not in the layer stack");
            return Err(ComposeError::invalid_argument(format!(
                "drawable '{}' is not a layer",
                d.name()
            )));
        };
        if self.floating.is_some_and(|l| l.target == id) {
            self.detach_floating(id)?;
        }

        let mut cx = StackCx::new(&mut self.stages, &mut self.graph);
        self.layers.remove(&mut cx, stage)?;
        self.stages.release(stage, &mut self.graph)?;
        slot_mut(&mut self.drawables, id)?.layer_stage = None;
        Ok(())
    }

    /// Move a layer to `index` in the layer stack.
    pub fn reorder_layer(&mut self, id: DrawableId, index: usize) -> ComposeResult<()> {
        let d = slot(&self.drawables, id)?;
        let stage = d.layer_stage.ok_or_else(|| {
            ComposeError::invalid_argument(format!("drawable '{}' is not a layer", d.name()))
        })?;
        let mut cx = StackCx::new(&mut self.stages, &mut self.graph);
        self.layers.reorder(&mut cx, stage, index)
    }

    /// Projection graph of the layer stack, built on first call.
    pub fn get_graph(&mut self) -> ComposeResult<NodeId> {
        if let Some(meta) = self.layers.peek_graph() {
            return Ok(meta);
        }
        let members: Vec<(DrawableId, StageId)> = self
            .drawables()
            .filter_map(|d| d.layer_stage.map(|s| (d.id(), s)))
            .collect();
        for (id, stage) in members {
            let node = self.layer_node(id)?;
            self.stages.bind_node(stage, node)?;
        }
        let mut cx = StackCx::new(&mut self.stages, &mut self.graph);
        self.layers.get_graph(&mut cx)
    }

    /// Source node of a drawable: raw pixels through its filter pipeline.
    ///
    /// Built on first call, at which point an attached floating selection is materialized.
    pub fn source_node(&mut self, id: DrawableId) -> ComposeResult<NodeId> {
        let d = slot_mut(&mut self.drawables, id)?;
        let fresh = d.source_node().is_none();
        let mut cx = StackCx::new(&mut self.stages, &mut self.graph);
        let node = d.build_source(&mut cx)?;
        if fresh {
            self.sync_floating(id)?;
        }
        Ok(node)
    }

    /// Layer node of a drawable: source, offset and blend mode.
    pub fn layer_node(&mut self, id: DrawableId) -> ComposeResult<NodeId> {
        let d = slot_mut(&mut self.drawables, id)?;
        let fresh = d.source_node().is_none();
        let mut cx = StackCx::new(&mut self.stages, &mut self.graph);
        let node = d.build_layer(&mut cx)?;
        if fresh {
            self.sync_floating(id)?;
        }
        Ok(node)
    }

    /// Blend-mode node inside a drawable's layer node.
    pub fn mode_node(&mut self, id: DrawableId) -> ComposeResult<NodeId> {
        self.layer_node(id)?;
        slot(&self.drawables, id)?
            .mode_node()
            .ok_or_else(|| ComposeError::graph(format!("drawable {} has no mode node", id.0)))
    }

    /// Create a free-standing filter stage running `operation`.
    pub fn create_filter(
        &mut self,
        name: impl Into<String>,
        operation: impl Into<String>,
    ) -> StageId {
        self.stages.create(
            name,
            StageKind::Filter,
            Operation::Filter(operation.into()),
        )
    }

    /// Filter stack of a drawable.
    pub fn filters(&self, id: DrawableId) -> ComposeResult<&FilterStack> {
        Ok(slot(&self.drawables, id)?.filters())
    }

    /// Pipeline meta node of a drawable's filter stack, built on first call.
    pub fn filter_graph(&mut self, id: DrawableId) -> ComposeResult<NodeId> {
        self.with_filters(id, |filters, cx| filters.get_graph(cx))
    }

    /// Add `stage` on top of a drawable's filters.
    pub fn add_filter(&mut self, id: DrawableId, stage: StageId) -> ComposeResult<()> {
        self.insert_filter(id, stage, 0)
    }

    /// Insert `stage` at `index` of a drawable's filters.
    pub fn insert_filter(
        &mut self,
        id: DrawableId,
        stage: StageId,
        index: usize,
    ) -> ComposeResult<()> {
        self.with_filters(id, |filters, cx| filters.insert(cx, stage, index))
    }

    /// Take `stage` out of a drawable's filters. The stage survives until released.
    pub fn remove_filter(&mut self, id: DrawableId, stage: StageId) -> ComposeResult<()> {
        self.guard_overlay_stage(id, stage)?;
        self.with_filters(id, |filters, cx| filters.remove(cx, stage))
    }

    /// Move `stage` to `index` of a drawable's filters.
    pub fn reorder_filter(
        &mut self,
        id: DrawableId,
        stage: StageId,
        index: usize,
    ) -> ComposeResult<()> {
        self.with_filters(id, |filters, cx| filters.reorder(cx, stage, index))
    }

    /// Destroy a stage that is in no stack.
    pub fn release_stage(&mut self, stage: StageId) -> ComposeResult<()> {
        self.stages.release(stage, &mut self.graph)
    }

    fn with_filters<R>(
        &mut self,
        id: DrawableId,
        f: impl FnOnce(&mut FilterStack, &mut StackCx<'_>) -> ComposeResult<R>,
    ) -> ComposeResult<R> {
        let d = slot_mut(&mut self.drawables, id)?;
        let mut cx = StackCx::new(&mut self.stages, &mut self.graph);
        f(&mut d.filters, &mut cx)
    }

    fn guard_overlay_stage(&self, id: DrawableId, stage: StageId) -> ComposeResult<()> {
        let d = slot(&self.drawables, id)?;
        if d.overlay().is_some_and(|o| o.stage() == stage) {
            tracing::warn!(drawable = d.name(), "refusing to remove the floating selection stage");
            return Err(ComposeError::contract(
                "the floating selection stage is removed by detaching the floating selection",
            ));
        }
        Ok(())
    }

    /// Show or hide a layer.
    #[tracing::instrument(skip(self))]
    pub fn set_visible(&mut self, id: DrawableId, visible: bool) -> ComposeResult<()> {
        if slot_mut(&mut self.drawables, id)?.set_visible(&mut self.graph, visible)? {
            self.notify_floating(id, ImageEvent::FloatingVisible);
        }
        self.flush_events()
    }

    /// Change a layer's blend mode.
    #[tracing::instrument(skip(self))]
    pub fn set_mode(&mut self, id: DrawableId, mode: BlendMode) -> ComposeResult<()> {
        if slot_mut(&mut self.drawables, id)?.set_mode(&mut self.graph, mode)? {
            self.notify_floating(id, ImageEvent::FloatingMode);
        }
        self.flush_events()
    }

    /// Change a layer's opacity; values are clamped to `0.0..=1.0`.
    #[tracing::instrument(skip(self))]
    pub fn set_opacity(&mut self, id: DrawableId, opacity: f64) -> ComposeResult<()> {
        if slot_mut(&mut self.drawables, id)?.set_opacity(&mut self.graph, opacity)? {
            self.notify_floating(id, ImageEvent::FloatingOpacity);
        }
        self.flush_events()
    }

    /// Move a drawable's origin to `(x, y)`, damaging both the old and the new area.
    #[tracing::instrument(skip(self))]
    pub fn set_offset(&mut self, id: DrawableId, x: i32, y: i32) -> ComposeResult<()> {
        let full = extent(slot(&self.drawables, id)?);
        if slot(&self.drawables, id)?.offset() == (x, y) {
            return self.flush_events();
        }
        self.damage(id, full)?;
        slot_mut(&mut self.drawables, id)?.set_offset(&mut self.graph, x, y)?;
        self.damage(id, full)?;
        self.notify_geometry(id);
        self.flush_events()
    }

    /// Replace a drawable's pixels.
    #[tracing::instrument(skip(self, buffer))]
    pub fn set_buffer(&mut self, id: DrawableId, buffer: BufferRef) -> ComposeResult<()> {
        let d = slot_mut(&mut self.drawables, id)?;
        d.set_buffer(&mut self.graph, buffer)?;
        let full = extent(d);
        self.damage(id, full)?;
        self.notify_geometry(id);
        self.flush_events()
    }

    /// Record that `rect` of a drawable changed, in drawable coordinates.
    pub fn update(&mut self, id: DrawableId, rect: PixelRect) -> ComposeResult<()> {
        self.damage(id, rect)
    }

    /// Replace the selection mask; `None` or an all-zero mask means nothing is selected.
    #[tracing::instrument(skip(self, mask))]
    pub fn set_selection(&mut self, mask: Option<BufferRef>) -> ComposeResult<()> {
        if let Some(m) = &mask
            && (m.format() != PixelFormat::Gray8
                || m.width() != self.width
                || m.height() != self.height)
        {
            tracing::warn!(format = ?m.format(), "rejecting selection mask");
            return Err(ComposeError::invalid_argument(format!(
                "selection mask must be a {}x{} gray buffer, got {:?}",
                self.width, self.height, m
            )));
        }
        if self.selection == mask {
            return self.flush_events();
        }
        self.selection = mask;
        if self.floating.is_some() {
            self.events.push_back(ImageEvent::SelectionMask);
        }
        self.flush_events()
    }

    /// Change the channels editing operations may write.
    #[tracing::instrument(skip(self))]
    pub fn set_active_channels(&mut self, channels: ChannelMask) -> ComposeResult<()> {
        if self.active_channels != channels {
            self.active_channels = channels;
            if self.floating.is_some() {
                self.events.push_back(ImageEvent::ActiveChannels);
            }
        }
        self.flush_events()
    }

    fn notify_floating(&mut self, id: DrawableId, event: ImageEvent) {
        if self.floating.is_some_and(|l| l.layer == id) {
            self.events.push_back(event);
        }
    }

    /// Either side of a floating selection changed position or size.
    fn notify_geometry(&mut self, id: DrawableId) {
        if self.floating.is_some_and(|l| l.layer == id || l.target == id) {
            self.events.push_back(ImageEvent::FloatingOffset);
        }
    }

    fn flush_events(&mut self) -> ComposeResult<()> {
        if self.opts.deferred_dispatch {
            return Ok(());
        }
        self.dispatch_events().map(|_| ())
    }

    /// Handle every queued event. Returns how many re-synced a floating selection.
    ///
    /// Each event fully re-derives the overlay from current state, so a burst collapses to
    /// one effective change.
    #[tracing::instrument(skip(self))]
    pub fn dispatch_events(&mut self) -> ComposeResult<usize> {
        let mut handled = 0;
        while let Some(event) = self.events.pop_front() {
            let Some(link) = self.floating else {
                tracing::trace!(?event, "no floating selection, dropping event");
                continue;
            };
            self.sync_floating(link.target)?;
            if event.damages_floating_layer() {
                let full = extent(slot(&self.drawables, link.layer)?);
                self.damage(link.layer, full)?;
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Attach `layer` as the floating selection of `target`.
    ///
    /// `target` must be in the layer stack and the image must have no floating selection.
    #[tracing::instrument(skip(self))]
    pub fn attach_floating(&mut self, target: DrawableId, layer: DrawableId) -> ComposeResult<()> {
        if target == layer {
            tracing::warn!("drawable cannot float over itself");
            return Err(ComposeError::contract(format!(
                "drawable {} cannot be its own floating selection",
                target.0
            )));
        }
        slot(&self.drawables, layer)?;
        let t = slot(&self.drawables, target)?;
        if t.floating_selection().is_some() {
            tracing::warn!(drawable = t.name(), "already has a floating selection");
            return Err(ComposeError::contract(format!(
                "drawable '{}' already has a floating selection",
                t.name()
            )));
        }
        if !t.layer_stage.is_some_and(|s| self.layers.contains(s)) {
            tracing::warn!(drawable = t.name(), "not part of the image");
            return Err(ComposeError::contract(format!(
                "drawable '{}' is not in the layer stack",
                t.name()
            )));
        }
        if let Some(link) = self.floating {
            tracing::warn!(?link, "image already has a floating selection");
            return Err(ComposeError::contract(format!(
                "the image already floats drawable {} over drawable {}",
                link.layer.0, link.target.0
            )));
        }

        slot_mut(&mut self.drawables, target)?.floating = FloatingState::Attached {
            layer,
            overlay: None,
        };
        self.floating = Some(FloatingLink { layer, target });
        tracing::debug!("attached floating selection");

        self.sync_floating(target)?;
        let full = extent(slot(&self.drawables, layer)?);
        self.fs_update(target, layer, full)
    }

    /// Detach the floating selection of `target`, giving the floating layer its source back.
    #[tracing::instrument(skip(self))]
    pub fn detach_floating(&mut self, target: DrawableId) -> ComposeResult<()> {
        let t = slot_mut(&mut self.drawables, target)?;
        let FloatingState::Attached { layer, overlay } = std::mem::take(&mut t.floating) else {
            tracing::warn!(drawable = t.name(), "no floating selection to detach");
            return Err(ComposeError::contract(format!(
                "drawable '{}' has no floating selection",
                t.name()
            )));
        };

        if let Some(overlay) = overlay {
            let (home, consumer) = slot(&self.drawables, layer)?.source_home();
            let t = slot_mut(&mut self.drawables, target)?;
            let mut cx = StackCx::new(&mut self.stages, &mut self.graph);
            overlay.dismantle(&mut cx, &mut t.filters, home, consumer)?;
        }

        let full = extent(slot(&self.drawables, layer)?);
        self.fs_update(target, layer, full)?;
        self.floating = None;
        tracing::debug!("detached floating selection");
        Ok(())
    }

    /// Remove a drawable for good, detaching any floating selection it takes part in.
    #[tracing::instrument(skip(self))]
    pub fn remove_drawable(&mut self, id: DrawableId) -> ComposeResult<()> {
        slot(&self.drawables, id)?;
        if let Some(link) = self.floating
            && (link.layer == id || link.target == id)
        {
            self.detach_floating(link.target)?;
        }
        if slot(&self.drawables, id)?.layer_stage.is_some() {
            self.remove_layer(id)?;
        }
        let d = self.drawables[id.0 as usize]
            .take()
            .ok_or_else(|| ComposeError::invalid_argument(format!("unknown drawable {}", id.0)))?;
        let mut cx = StackCx::new(&mut self.stages, &mut self.graph);
        d.teardown(&mut cx)
    }

    /// Materialize the overlay if needed and re-derive all of its parameters.
    ///
    /// Does nothing while `target` has no floating selection or no source node.
    fn sync_floating(&mut self, target: DrawableId) -> ComposeResult<()> {
        let t = slot(&self.drawables, target)?;
        if t.source_node().is_none() {
            return Ok(());
        }
        let FloatingState::Attached { layer, overlay } = &t.floating else {
            return Ok(());
        };
        let layer = *layer;
        let materialized = overlay.is_some();
        let fs = slot(&self.drawables, layer)?;
        let params = OverlayParams {
            target: t.bounds(),
            layer: fs.bounds(),
            mode: fs.mode(),
            opacity: fs.opacity(),
            selection: self.selection_mask(),
            affect: t.active_mask(self.active_channels),
        };

        if !materialized {
            let mut cx = StackCx::new(&mut self.stages, &mut self.graph);
            let fs_source = slot_mut(&mut self.drawables, layer)?.build_source(&mut cx)?;
            let t = slot_mut(&mut self.drawables, target)?;
            let overlay = Overlay::materialize(
                &mut cx,
                &mut t.filters,
                fs_source,
                &self.opts.floating_stage_name,
                self.opts.linear,
            )?;
            t.floating = FloatingState::Attached {
                layer,
                overlay: Some(overlay),
            };
        }

        if let FloatingState::Attached {
            overlay: Some(overlay),
            ..
        } = &mut slot_mut(&mut self.drawables, target)?.floating
        {
            overlay.resync(&mut self.graph, &params)?;
        }
        Ok(())
    }

    /// Propagate damage of the floating layer (in its own coordinates) to `target`.
    fn fs_update(
        &mut self,
        target: DrawableId,
        layer: DrawableId,
        rect: PixelRect,
    ) -> ComposeResult<()> {
        let fs = slot(&self.drawables, layer)?.bounds();
        let t = slot(&self.drawables, target)?;
        let tb = t.bounds();
        if let Some(hit) = rect.translate(fs.x, fs.y).intersect(tb) {
            t.update(
                &mut self.graph,
                hit.translate(tb.x.saturating_neg(), tb.y.saturating_neg()),
            )?;
        }
        Ok(())
    }

    fn damage(&mut self, id: DrawableId, rect: PixelRect) -> ComposeResult<()> {
        slot(&self.drawables, id)?.update(&mut self.graph, rect)?;
        if let Some(link) = self.floating
            && link.layer == id
        {
            self.fs_update(link.target, id, rect)?;
        }
        Ok(())
    }

    fn selection_mask(&self) -> Option<BufferRef> {
        self.selection
            .as_ref()
            .filter(|m| !m.is_all_zero())
            .cloned()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/document/model.rs"]
mod tests;
