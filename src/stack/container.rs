use crate::foundation::error::{ComposeError, ComposeResult};
use crate::graph::node::NodeGraph;
use crate::stack::stage::{StackId, StageId, StageKind, StagePool};

/// Mutable state a stack and its hooks operate on.
#[derive(Debug)]
pub struct StackCx<'a> {
    /// Stage arena.
    pub stages: &'a mut StagePool,
    /// Graph description.
    pub graph: &'a mut NodeGraph,
}

impl<'a> StackCx<'a> {
    /// Bundle a pool and a graph.
    pub fn new(stages: &'a mut StagePool, graph: &'a mut NodeGraph) -> Self {
        Self { stages, graph }
    }
}

/// Change notifications delivered by a [`Stack`] after each list splice.
///
/// `order` is the post-mutation order (index 0 = top).
pub trait StackHooks {
    /// `stage` now sits at `index`.
    fn stage_added(
        &mut self,
        cx: &mut StackCx<'_>,
        order: &[StageId],
        stage: StageId,
        index: usize,
    ) -> ComposeResult<()> {
        let _ = (cx, order, stage, index);
        Ok(())
    }

    /// `stage` was taken out from `former_index`.
    fn stage_removed(
        &mut self,
        cx: &mut StackCx<'_>,
        order: &[StageId],
        stage: StageId,
        former_index: usize,
    ) -> ComposeResult<()> {
        let _ = (cx, order, stage, former_index);
        Ok(())
    }

    /// `stage` moved from `old_index` to `new_index`.
    fn stage_reordered(
        &mut self,
        cx: &mut StackCx<'_>,
        order: &[StageId],
        stage: StageId,
        old_index: usize,
        new_index: usize,
    ) -> ComposeResult<()> {
        let _ = (cx, order, stage, old_index, new_index);
        Ok(())
    }
}

impl StackHooks for () {}

/// Ordered, typed collection of stages with strong ownership.
///
/// Index 0 is the top (executes last, nearest the output); the highest index is the bottom
/// (executes first). The bottommost stage carries the base flag.
#[derive(Debug)]
pub struct Stack<H = ()> {
    id: StackId,
    label: String,
    children_kind: StageKind,
    order: Vec<StageId>,
    base: Option<StageId>,
    hooks: H,
}

impl<H: StackHooks> Stack<H> {
    /// Create an empty stack accepting `children_kind` stages.
    pub fn new(
        stages: &mut StagePool,
        label: impl Into<String>,
        children_kind: StageKind,
        hooks: H,
    ) -> Self {
        Self {
            id: stages.next_stack_id(),
            label: label.into(),
            children_kind,
            order: Vec::new(),
            base: None,
            hooks,
        }
    }

    /// Stack identity.
    pub fn id(&self) -> StackId {
        self.id
    }

    /// Stack label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Kind of stage this stack accepts.
    pub fn children_kind(&self) -> StageKind {
        self.children_kind
    }

    /// Installed hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub(crate) fn split_hooks(&mut self) -> (&mut H, &[StageId]) {
        (&mut self.hooks, &self.order)
    }

    /// Number of stages.
    pub fn count(&self) -> usize {
        self.order.len()
    }

    /// Return `true` when the stack holds no stages.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Stage at `index`.
    pub fn get_at(&self, index: usize) -> Option<StageId> {
        self.order.get(index).copied()
    }

    /// Position of `stage`.
    pub fn index_of(&self, stage: StageId) -> Option<usize> {
        self.order.iter().position(|s| *s == stage)
    }

    /// Return `true` when `stage` is in this stack.
    pub fn contains(&self, stage: StageId) -> bool {
        self.order.contains(&stage)
    }

    /// Topmost stage.
    pub fn first(&self) -> Option<StageId> {
        self.order.first().copied()
    }

    /// Bottommost stage, the one carrying the base flag.
    pub fn last(&self) -> Option<StageId> {
        self.order.last().copied()
    }

    /// Stages from top to bottom.
    pub fn iter(&self) -> impl Iterator<Item = StageId> + '_ {
        self.order.iter().copied()
    }

    /// First stage named `name`.
    pub fn get_by_name(&self, stages: &StagePool, name: &str) -> Option<StageId> {
        self.iter()
            .find(|id| stages.get(*id).is_some_and(|s| s.name() == name))
    }

    /// Stage below `stage`, or the one above when `stage` is the bottommost.
    pub fn neighbor_of(&self, stage: StageId) -> Option<StageId> {
        let i = self.index_of(stage)?;
        self.get_at(i + 1)
            .or_else(|| i.checked_sub(1).and_then(|j| self.get_at(j)))
    }

    /// Add `stage` on top.
    pub fn add(&mut self, cx: &mut StackCx<'_>, stage: StageId) -> ComposeResult<()> {
        self.insert(cx, stage, 0)
    }

    /// Insert `stage` at `index`; `index == count()` appends at the bottom.
    #[tracing::instrument(skip(self, cx), fields(stack = %self.label))]
    pub fn insert(
        &mut self,
        cx: &mut StackCx<'_>,
        stage: StageId,
        index: usize,
    ) -> ComposeResult<()> {
        let s = cx.stages.require(stage)?;
        if s.kind() != self.children_kind {
            tracing::warn!(kind = ?s.kind(), expected = ?self.children_kind, "wrong stage kind");
            return Err(ComposeError::invalid_argument(format!(
                "stack '{}' holds {:?} stages, '{}' is {:?}",
                self.label,
                self.children_kind,
                s.name(),
                s.kind()
            )));
        }
        if let Some(owner) = s.owner() {
            tracing::warn!(stage = s.name(), "stage already in a stack");
            return Err(ComposeError::invalid_argument(if owner == self.id {
                format!("stack '{}' already contains '{}'", self.label, s.name())
            } else {
                format!("'{}' already belongs to stack {}", s.name(), owner.0)
            }));
        }
        if index > self.order.len() {
            return Err(ComposeError::invalid_argument(format!(
                "insert index {index} out of range for stack of {}",
                self.order.len()
            )));
        }

        self.order.insert(index, stage);
        cx.stages.set_owner(stage, Some(self.id))?;
        self.sync_base(cx.stages);
        self.hooks.stage_added(cx, &self.order, stage, index)
    }

    /// Remove `stage`. The stage stays in the pool until released.
    #[tracing::instrument(skip(self, cx), fields(stack = %self.label))]
    pub fn remove(&mut self, cx: &mut StackCx<'_>, stage: StageId) -> ComposeResult<()> {
        let Some(index) = self.index_of(stage) else {
            tracing::warn!("stage not in stack");
            return Err(ComposeError::invalid_argument(format!(
                "stack '{}' does not contain stage {}",
                self.label, stage.0
            )));
        };

        self.order.remove(index);
        cx.stages.set_owner(stage, None)?;
        self.sync_base(cx.stages);
        self.hooks.stage_removed(cx, &self.order, stage, index)
    }

    /// Move `stage` to `new_index`.
    #[tracing::instrument(skip(self, cx), fields(stack = %self.label))]
    pub fn reorder(
        &mut self,
        cx: &mut StackCx<'_>,
        stage: StageId,
        new_index: usize,
    ) -> ComposeResult<()> {
        let Some(old_index) = self.index_of(stage) else {
            tracing::warn!("stage not in stack");
            return Err(ComposeError::invalid_argument(format!(
                "stack '{}' does not contain stage {}",
                self.label, stage.0
            )));
        };
        if new_index >= self.order.len() {
            return Err(ComposeError::invalid_argument(format!(
                "reorder index {new_index} out of range for stack of {}",
                self.order.len()
            )));
        }
        if old_index == new_index {
            return Ok(());
        }

        self.order.remove(old_index);
        self.order.insert(new_index, stage);
        self.sync_base(cx.stages);
        self.hooks
            .stage_reordered(cx, &self.order, stage, old_index, new_index)
    }

    /// Remove every stage, bottom first.
    pub fn clear(&mut self, cx: &mut StackCx<'_>) -> ComposeResult<Vec<StageId>> {
        let mut removed = Vec::with_capacity(self.order.len());
        while let Some(stage) = self.last() {
            self.remove(cx, stage)?;
            removed.push(stage);
        }
        Ok(removed)
    }

    fn sync_base(&mut self, stages: &mut StagePool) {
        let bottom = self.order.last().copied();
        if self.base == bottom {
            return;
        }
        if let Some(old) = self.base {
            stages.set_base(old, false);
        }
        if let Some(new) = bottom {
            stages.set_base(new, true);
        }
        self.base = bottom;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stack/container.rs"]
mod tests;
