use crate::foundation::error::{ComposeError, ComposeResult};
use crate::graph::node::{NodeGraph, NodeId, Operation};

/// Handle to a [`Stage`] in a [`StagePool`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct StageId(pub(crate) u32);

/// Identity of a stack, recorded on the stages it owns.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct StackId(pub(crate) u32);

/// Kind of stage a stack accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Non-destructive processing step attached to a drawable.
    Filter,
    /// A drawable composited into the image projection.
    Layer,
}

/// Named processing unit with a lazily created node.
#[derive(Clone, Debug)]
pub struct Stage {
    name: String,
    kind: StageKind,
    op: Operation,
    node: Option<NodeId>,
    owns_node: bool,
    is_base: bool,
    owner: Option<StackId>,
}

impl Stage {
    /// Stage name; also the label of its node.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage kind.
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Node handle, if it has been created.
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// `true` iff this is the bottommost stage of its stack.
    pub fn is_base(&self) -> bool {
        self.is_base
    }

    /// Stack currently owning the stage.
    pub fn owner(&self) -> Option<StackId> {
        self.owner
    }
}

/// Arena of stages and allocator of stack ids.
#[derive(Debug, Default)]
pub struct StagePool {
    stages: Vec<Option<Stage>>,
    next_stack: u32,
}

impl StagePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stage whose node is built from `op` on first use.
    pub fn create(&mut self, name: impl Into<String>, kind: StageKind, op: Operation) -> StageId {
        self.push(Stage {
            name: name.into(),
            kind,
            op,
            node: None,
            owns_node: true,
            is_base: false,
            owner: None,
        })
    }

    /// Create a stage around an existing node that something else owns.
    pub fn create_with_node(
        &mut self,
        name: impl Into<String>,
        kind: StageKind,
        node: NodeId,
    ) -> StageId {
        self.push(Stage {
            name: name.into(),
            kind,
            op: Operation::Meta,
            node: Some(node),
            owns_node: false,
            is_base: false,
            owner: None,
        })
    }

    /// Point a node-less stage at a node that something else owns.
    pub(crate) fn bind_node(&mut self, id: StageId, node: NodeId) -> ComposeResult<()> {
        let stage = self.require_mut(id)?;
        if let Some(existing) = stage.node {
            if existing == node {
                return Ok(());
            }
            return Err(ComposeError::graph(format!(
                "stage '{}' is already bound to node {}",
                stage.name, existing.0
            )));
        }
        stage.node = Some(node);
        stage.owns_node = false;
        Ok(())
    }

    fn push(&mut self, stage: Stage) -> StageId {
        let id = StageId(self.stages.len() as u32);
        self.stages.push(Some(stage));
        id
    }

    pub(crate) fn next_stack_id(&mut self) -> StackId {
        let id = StackId(self.next_stack);
        self.next_stack += 1;
        id
    }

    /// Look up a live stage.
    pub fn get(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.stages.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub(crate) fn require(&self, id: StageId) -> ComposeResult<&Stage> {
        self.get(id)
            .ok_or_else(|| ComposeError::invalid_argument(format!("unknown stage {}", id.0)))
    }

    pub(crate) fn require_mut(&mut self, id: StageId) -> ComposeResult<&mut Stage> {
        self.get_mut(id)
            .ok_or_else(|| ComposeError::invalid_argument(format!("unknown stage {}", id.0)))
    }

    pub(crate) fn set_owner(&mut self, id: StageId, owner: Option<StackId>) -> ComposeResult<()> {
        self.require_mut(id)?.owner = owner;
        Ok(())
    }

    pub(crate) fn set_base(&mut self, id: StageId, is_base: bool) {
        if let Some(s) = self.get_mut(id) {
            s.is_base = is_base;
        }
    }

    /// Node of `id`, created in `graph` on first use.
    pub fn ensure_node(&mut self, id: StageId, graph: &mut NodeGraph) -> ComposeResult<NodeId> {
        let stage = self.require_mut(id)?;
        if let Some(node) = stage.node {
            return Ok(node);
        }
        let node = graph.create_node(stage.op.clone(), stage.name.clone());
        stage.node = Some(node);
        Ok(node)
    }

    /// Destroy a stage that no stack owns, freeing the node it created.
    pub fn release(&mut self, id: StageId, graph: &mut NodeGraph) -> ComposeResult<()> {
        let stage = self.require(id)?;
        if let Some(owner) = stage.owner {
            return Err(ComposeError::invalid_argument(format!(
                "stage '{}' is still owned by stack {}",
                stage.name, owner.0
            )));
        }
        if stage.owns_node
            && let Some(node) = stage.node
            && graph.contains(node)
        {
            graph.remove_node(node)?;
        }
        self.stages[id.0 as usize] = None;
        Ok(())
    }
}
