use crate::foundation::error::{ComposeError, ComposeResult};
use crate::graph::node::{NodeId, Operation, Port};
use crate::stack::container::{Stack, StackCx, StackHooks};
use crate::stack::stage::{StageId, StageKind, StagePool};

/// Stack whose order is mirrored by a pipeline graph.
pub type FilterStack = Stack<PipelineSync>;

/// Keeps a meta node's internal chain in step with a stack's order.
///
/// Built lazily by [`FilterStack::get_graph`]; afterwards every stack mutation is applied with
/// a constant number of edge operations. Invariant once built: stage `i`'s output feeds stage
/// `i - 1` (or the output proxy for `i == 0`), and the bottommost stage reads from the input
/// proxy. An empty stack connects the proxies directly.
#[derive(Debug, Default)]
pub struct PipelineSync {
    label: String,
    graph: Option<NodeId>,
}

impl PipelineSync {
    /// Hooks for a pipeline whose meta node will be labelled `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            graph: None,
        }
    }

    /// The meta node, if it has been built.
    pub fn peek_graph(&self) -> Option<NodeId> {
        self.graph
    }

    fn build(&mut self, cx: &mut StackCx<'_>, order: &[StageId]) -> ComposeResult<NodeId> {
        let meta = cx.graph.create_node(Operation::Meta, self.label.clone());
        let input = cx.graph.input_proxy(meta)?;
        let output = cx.graph.output_proxy(meta)?;

        let mut below = input;
        for &stage in order.iter().rev() {
            let node = cx.stages.ensure_node(stage, cx.graph)?;
            cx.graph.add_child(meta, node)?;
            cx.graph.connect(below, node, Port::Input)?;
            below = node;
        }
        cx.graph.connect(below, output, Port::Input)?;

        tracing::debug!(pipeline = %self.label, stages = order.len(), "built pipeline graph");
        self.graph = Some(meta);
        Ok(meta)
    }

    fn above(
        cx: &mut StackCx<'_>,
        meta: NodeId,
        order: &[StageId],
        index: usize,
    ) -> ComposeResult<NodeId> {
        match index.checked_sub(1) {
            Some(i) => cx.stages.ensure_node(order[i], cx.graph),
            None => cx.graph.output_proxy(meta),
        }
    }

    fn below(
        cx: &mut StackCx<'_>,
        meta: NodeId,
        order: &[StageId],
        index: usize,
    ) -> ComposeResult<NodeId> {
        match order.get(index) {
            Some(&s) => cx.stages.ensure_node(s, cx.graph),
            None => cx.graph.input_proxy(meta),
        }
    }

    fn link(
        cx: &mut StackCx<'_>,
        meta: NodeId,
        order: &[StageId],
        stage: StageId,
        index: usize,
    ) -> ComposeResult<()> {
        let node = cx.stages.ensure_node(stage, cx.graph)?;
        cx.graph.add_child(meta, node)?;

        let above = Self::above(cx, meta, order, index)?;
        cx.graph.connect(node, above, Port::Input)?;

        let below = Self::below(cx, meta, order, index + 1)?;
        cx.graph.connect(below, node, Port::Input)
    }

    fn unlink(
        cx: &mut StackCx<'_>,
        meta: NodeId,
        order: &[StageId],
        stage: StageId,
        former_index: usize,
    ) -> ComposeResult<()> {
        let node = cx.stages.require(stage)?.node().ok_or_else(|| {
            ComposeError::graph(format!("stage {} has no node in a built pipeline", stage.0))
        })?;
        cx.graph.disconnect(node, Port::Input)?;
        cx.graph.remove_child(meta, node)?;

        let above = Self::above(cx, meta, order, former_index)?;
        let below = Self::below(cx, meta, order, former_index)?;
        cx.graph.connect(below, above, Port::Input)
    }

    fn release(&mut self, cx: &mut StackCx<'_>, order: &[StageId]) -> ComposeResult<()> {
        let Some(meta) = self.graph.take() else {
            return Ok(());
        };
        for &stage in order {
            if let Some(node) = cx.stages.get(stage).and_then(|s| s.node())
                && cx.graph.parent(node) == Some(meta)
            {
                cx.graph.remove_child(meta, node)?;
            }
        }
        cx.graph.remove_node(meta)
    }
}

impl StackHooks for PipelineSync {
    fn stage_added(
        &mut self,
        cx: &mut StackCx<'_>,
        order: &[StageId],
        stage: StageId,
        index: usize,
    ) -> ComposeResult<()> {
        let Some(meta) = self.graph else {
            return Ok(());
        };
        Self::link(cx, meta, order, stage, index)
    }

    fn stage_removed(
        &mut self,
        cx: &mut StackCx<'_>,
        order: &[StageId],
        stage: StageId,
        former_index: usize,
    ) -> ComposeResult<()> {
        let Some(meta) = self.graph else {
            return Ok(());
        };
        Self::unlink(cx, meta, order, stage, former_index)
    }

    fn stage_reordered(
        &mut self,
        cx: &mut StackCx<'_>,
        order: &[StageId],
        stage: StageId,
        old_index: usize,
        new_index: usize,
    ) -> ComposeResult<()> {
        let Some(meta) = self.graph else {
            return Ok(());
        };
        let without: Vec<StageId> = order.iter().copied().filter(|s| *s != stage).collect();
        Self::unlink(cx, meta, &without, stage, old_index)?;
        Self::link(cx, meta, order, stage, new_index)
    }
}

impl Stack<PipelineSync> {
    /// Create an empty pipeline-backed stack.
    pub fn with_pipeline(
        stages: &mut StagePool,
        label: impl Into<String>,
        children_kind: StageKind,
    ) -> Self {
        let label = label.into();
        let hooks = PipelineSync::new(label.clone());
        Self::new(stages, label, children_kind, hooks)
    }

    /// Meta node mirroring this stack, built on first call.
    ///
    /// Repeated calls without intervening mutation return the same handle.
    pub fn get_graph(&mut self, cx: &mut StackCx<'_>) -> ComposeResult<NodeId> {
        if let Some(meta) = self.hooks().peek_graph() {
            return Ok(meta);
        }
        let (hooks, order) = self.split_hooks();
        hooks.build(cx, order)
    }

    /// The meta node, if it has been built.
    pub fn peek_graph(&self) -> Option<NodeId> {
        self.hooks().peek_graph()
    }

    /// Drop the pipeline's meta node and proxies. Stage nodes stay with their stages.
    pub fn release_graph(&mut self, cx: &mut StackCx<'_>) -> ComposeResult<()> {
        let (hooks, order) = self.split_hooks();
        hooks.release(cx, order)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/sync.rs"]
mod tests;
