use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::foundation::buffer::BufferRef;
use crate::foundation::core::{BlendMode, ChannelMask, PixelRect};
use crate::foundation::error::{ComposeError, ComposeResult};

/// Handle to a node in a [`NodeGraph`].
///
/// Ids are never reused, so a handle to a removed node stays dead.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(pub(crate) u32);

/// Named pad on a node.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Port {
    /// Primary input.
    Input,
    /// Auxiliary input (the layer content of a mode node, the overlay of an applicator).
    Aux,
    /// The single output pad.
    Output,
}

impl Port {
    /// Pad name as used by the execution engine.
    pub fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Aux => "aux",
            Self::Output => "output",
        }
    }
}

/// Operation a node performs when the execution engine evaluates it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Container for child nodes, with lazily created input/output proxies.
    Meta,
    /// Pseudo-node standing for a meta node's `input` pad.
    InputProxy,
    /// Pseudo-node standing for a meta node's `output` pad.
    OutputProxy,
    /// Emits the pixels of the `buffer` property.
    BufferSource,
    /// Crops its input to the `x`/`y`/`width`/`height` properties.
    Crop,
    /// Translates its input by the `x`/`y` properties.
    Translate,
    /// Composites `aux` over `input` using `mode`/`opacity`.
    LayerMode,
    /// Masked, channel-restricted blend of `aux` over `input`.
    Applicator,
    /// Any other pixel operation, by name.
    Filter(String),
}

impl Operation {
    /// Operation name as used by the execution engine.
    pub fn name(&self) -> &str {
        match self {
            Self::Meta => "meta",
            Self::InputProxy => "proxy:input",
            Self::OutputProxy => "proxy:output",
            Self::BufferSource => "buffer-source",
            Self::Crop => "crop",
            Self::Translate => "translate",
            Self::LayerMode => "layer-mode",
            Self::Applicator => "applicator",
            Self::Filter(name) => name,
        }
    }
}

/// Value stored in a node's property bag.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value (offsets).
    Int(i64),
    /// Floating-point value (crop geometry, opacity).
    Float(f64),
    /// Blend mode.
    Mode(BlendMode),
    /// Affected-channel mask.
    Channels(ChannelMask),
    /// Buffer reference; `None` clears it.
    Buffer(Option<BufferRef>),
}

/// Damage recorded against a node for the execution engine to pick up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Invalidation {
    /// Node whose output changed.
    pub node: NodeId,
    /// Affected region in the node's coordinate space.
    pub rect: PixelRect,
}

#[derive(Clone, Debug)]
pub(crate) struct NodeData {
    pub(crate) op: Operation,
    pub(crate) label: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: SmallVec<[NodeId; 4]>,
    pub(crate) inputs: SmallVec<[(Port, NodeId); 2]>,
    pub(crate) props: BTreeMap<&'static str, PropValue>,
    pub(crate) input_proxy: Option<NodeId>,
    pub(crate) output_proxy: Option<NodeId>,
}

impl NodeData {
    fn new(op: Operation, label: String) -> Self {
        Self {
            op,
            label,
            parent: None,
            children: SmallVec::new(),
            inputs: SmallVec::new(),
            props: BTreeMap::new(),
            input_proxy: None,
            output_proxy: None,
        }
    }
}

/// Subgraph that has been pulled out of its composition.
///
/// Produced by [`NodeGraph::rip_out`] and consumed by [`NodeGraph::splice_back`]; it cannot be
/// cloned, so the node has exactly one pending way home.
#[must_use = "a ripped-out subgraph must be spliced back"]
#[derive(Debug)]
pub struct Ripped {
    node: NodeId,
    host: Option<NodeId>,
}

impl Ripped {
    /// Root node of the ripped-out subgraph.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Meta node currently hosting the subgraph, if any.
    pub fn host(&self) -> Option<NodeId> {
        self.host
    }
}

/// Graph description handed to the execution engine.
///
/// This crate only edits the description; it never evaluates it. Nodes live in an arena and
/// are addressed by [`NodeId`]. Each input pad has at most one source: connecting to an
/// already-fed pad replaces the previous edge.
#[derive(Debug, Default)]
pub struct NodeGraph {
    pub(crate) nodes: Vec<Option<NodeData>>,
    invalidations: Vec<Invalidation>,
    record_invalidations: bool,
}

impl NodeGraph {
    /// Create an empty graph that records invalidations.
    pub fn new() -> Self {
        Self::with_invalidations(true)
    }

    /// Create an empty graph, choosing whether [`NodeGraph::invalidate`] records anything.
    pub fn with_invalidations(record: bool) -> Self {
        Self {
            nodes: Vec::new(),
            invalidations: Vec::new(),
            record_invalidations: record,
        }
    }

    /// Number of live nodes, proxies included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Return `true` when no node is alive.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return `true` when `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.data(id).is_some()
    }

    pub(crate) fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn live(&self, id: NodeId) -> ComposeResult<&NodeData> {
        self.data(id)
            .ok_or_else(|| ComposeError::graph(format!("node {} is not alive", id.0)))
    }

    fn live_mut(&mut self, id: NodeId) -> ComposeResult<&mut NodeData> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| ComposeError::graph(format!("node {} is not alive", id.0)))
    }

    /// Create a free-standing node.
    pub fn create_node(&mut self, op: Operation, label: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(NodeData::new(op, label.into())));
        id
    }

    /// Create a node and make it a child of the meta node `parent`.
    pub fn create_child(
        &mut self,
        parent: NodeId,
        op: Operation,
        label: impl Into<String>,
    ) -> ComposeResult<NodeId> {
        self.live(parent)?;
        let id = self.create_node(op, label);
        self.add_child(parent, id)?;
        Ok(id)
    }

    /// Operation of a live node.
    pub fn operation(&self, id: NodeId) -> Option<&Operation> {
        self.data(id).map(|n| &n.op)
    }

    /// Label of a live node.
    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.data(id).map(|n| n.label.as_str())
    }

    /// Meta node that contains `id`.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).and_then(|n| n.parent)
    }

    /// Children of a meta node, in insertion order. Proxies are not listed.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.data(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Add `child` to the meta node `parent`.
    ///
    /// A node belongs to at most one parent at a time.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> ComposeResult<()> {
        if parent == child {
            return Err(ComposeError::graph("a node cannot contain itself"));
        }
        if self.live(parent)?.op != Operation::Meta {
            return Err(ComposeError::graph(format!(
                "node {} is not a meta node",
                parent.0
            )));
        }
        let c = self.live_mut(child)?;
        if let Some(p) = c.parent {
            return Err(ComposeError::graph(format!(
                "node {} already belongs to node {}",
                child.0, p.0
            )));
        }
        c.parent = Some(parent);
        self.live_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Remove `child` from `parent` without touching its connections.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> ComposeResult<()> {
        let c = self.live_mut(child)?;
        if c.parent != Some(parent) {
            return Err(ComposeError::graph(format!(
                "node {} is not a child of node {}",
                child.0, parent.0
            )));
        }
        c.parent = None;
        self.live_mut(parent)?.children.retain(|n| *n != child);
        Ok(())
    }

    /// Input proxy of a meta node, created on first use.
    pub fn input_proxy(&mut self, meta: NodeId) -> ComposeResult<NodeId> {
        self.proxy(meta, Operation::InputProxy)
    }

    /// Output proxy of a meta node, created on first use.
    pub fn output_proxy(&mut self, meta: NodeId) -> ComposeResult<NodeId> {
        self.proxy(meta, Operation::OutputProxy)
    }

    fn proxy(&mut self, meta: NodeId, op: Operation) -> ComposeResult<NodeId> {
        let data = self.live(meta)?;
        if data.op != Operation::Meta {
            return Err(ComposeError::graph(format!(
                "node {} has no proxies, it is not a meta node",
                meta.0
            )));
        }
        let existing = match op {
            Operation::InputProxy => data.input_proxy,
            _ => data.output_proxy,
        };
        if let Some(p) = existing {
            return Ok(p);
        }

        let pad = match op {
            Operation::InputProxy => Port::Input,
            _ => Port::Output,
        };
        let label = format!("{}:{}", data.label, pad.name());
        let id = self.create_node(op, label);
        self.live_mut(id)?.parent = Some(meta);
        let data = self.live_mut(meta)?;
        match pad {
            Port::Input => data.input_proxy = Some(id),
            _ => data.output_proxy = Some(id),
        }
        Ok(id)
    }

    /// Connect `src`'s output to `dst`'s `port`, replacing whatever fed that port.
    pub fn connect(&mut self, src: NodeId, dst: NodeId, port: Port) -> ComposeResult<()> {
        if port == Port::Output {
            return Err(ComposeError::graph("cannot connect into an output pad"));
        }
        if src == dst {
            return Err(ComposeError::graph(format!(
                "node {} cannot feed itself",
                src.0
            )));
        }
        self.live(src)?;
        let d = self.live_mut(dst)?;
        match d.inputs.iter_mut().find(|(p, _)| *p == port) {
            Some(slot) => slot.1 = src,
            None => d.inputs.push((port, src)),
        }
        Ok(())
    }

    /// Drop the edge feeding `dst`'s `port`. Returns whether an edge existed.
    pub fn disconnect(&mut self, dst: NodeId, port: Port) -> ComposeResult<bool> {
        let d = self.live_mut(dst)?;
        let before = d.inputs.len();
        d.inputs.retain(|(p, _)| *p != port);
        Ok(d.inputs.len() != before)
    }

    /// Node feeding `dst`'s `port`.
    pub fn source_of(&self, dst: NodeId, port: Port) -> Option<NodeId> {
        self.data(dst)?
            .inputs
            .iter()
            .find(|(p, _)| *p == port)
            .map(|(_, s)| *s)
    }

    /// Every `(node, port)` fed by `src`'s output.
    pub fn consumers_of(&self, src: NodeId) -> SmallVec<[(NodeId, Port); 2]> {
        let mut out = SmallVec::new();
        for (i, n) in self.nodes.iter().enumerate() {
            let Some(n) = n else { continue };
            for (port, s) in &n.inputs {
                if *s == src {
                    out.push((NodeId(i as u32), *port));
                }
            }
        }
        out
    }

    /// Follow `Input` pads upstream from `start` until a node has no input source.
    ///
    /// The returned walk starts with `start`. Cycles end the walk.
    pub fn walk_inputs(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = vec![start];
        let mut cur = start;
        while let Some(src) = self.source_of(cur, Port::Input) {
            if out.contains(&src) {
                break;
            }
            out.push(src);
            cur = src;
        }
        out
    }

    /// Set a property. Returns `false` when the stored value was already equal.
    pub fn set_property(
        &mut self,
        id: NodeId,
        key: &'static str,
        value: PropValue,
    ) -> ComposeResult<bool> {
        let props = &mut self.live_mut(id)?.props;
        if props.get(key) == Some(&value) {
            return Ok(false);
        }
        props.insert(key, value);
        Ok(true)
    }

    /// Read a property.
    pub fn property(&self, id: NodeId, key: &str) -> Option<&PropValue> {
        self.data(id)?.props.get(key)
    }

    /// Remove a node together with its children and proxies, dropping every edge that
    /// touches them.
    pub fn remove_node(&mut self, id: NodeId) -> ComposeResult<()> {
        if let Some(parent) = self.live(id)?.parent
            && self.data(parent).is_some_and(|p| p.children.contains(&id))
        {
            self.remove_child(parent, id)?;
        }

        let mut doomed = vec![id];
        let mut i = 0;
        while i < doomed.len() {
            if let Some(n) = self.data(doomed[i]) {
                doomed.extend(n.children.iter().copied());
                doomed.extend(n.input_proxy);
                doomed.extend(n.output_proxy);
            }
            i += 1;
        }

        for n in &doomed {
            self.nodes[n.0 as usize] = None;
        }
        for n in self.nodes.iter_mut().flatten() {
            n.inputs.retain(|(_, s)| !doomed.contains(s));
            if n.input_proxy.is_some_and(|p| doomed.contains(&p)) {
                n.input_proxy = None;
            }
            if n.output_proxy.is_some_and(|p| doomed.contains(&p)) {
                n.output_proxy = None;
            }
        }
        Ok(())
    }

    /// Record that `rect` of `node`'s output changed.
    pub fn invalidate(&mut self, node: NodeId, rect: PixelRect) -> ComposeResult<()> {
        self.live(node)?;
        if self.record_invalidations && !rect.is_empty() {
            self.invalidations.push(Invalidation { node, rect });
        }
        Ok(())
    }

    /// Drain recorded invalidations.
    pub fn take_invalidations(&mut self) -> Vec<Invalidation> {
        std::mem::take(&mut self.invalidations)
    }

    /// Pull `node` out of its composition: every consumer of its output is disconnected and
    /// it is removed from its parent.
    pub fn rip_out(&mut self, node: NodeId) -> ComposeResult<Ripped> {
        for (consumer, port) in self.consumers_of(node) {
            self.disconnect(consumer, port)?;
        }
        if let Some(parent) = self.live(node)?.parent {
            self.remove_child(parent, node)?;
        }
        Ok(Ripped { node, host: None })
    }

    /// Make `parent` the temporary home of a ripped-out subgraph.
    pub fn host(&mut self, ripped: &mut Ripped, parent: NodeId) -> ComposeResult<()> {
        if let Some(old) = ripped.host.take() {
            self.remove_child(old, ripped.node)?;
        }
        self.add_child(parent, ripped.node)?;
        ripped.host = Some(parent);
        Ok(())
    }

    /// Return a ripped-out subgraph to `parent`, feeding `consumer` again.
    ///
    /// Both steps happen under one exclusive borrow, so no observer sees the node half moved.
    pub fn splice_back(
        &mut self,
        ripped: Ripped,
        parent: Option<NodeId>,
        consumer: Option<(NodeId, Port)>,
    ) -> ComposeResult<NodeId> {
        let Ripped { node, host } = ripped;
        for (c, port) in self.consumers_of(node) {
            self.disconnect(c, port)?;
        }
        if let Some(host) = host
            && self.contains(host)
        {
            self.remove_child(host, node)?;
        }
        if let Some(parent) = parent {
            self.add_child(parent, node)?;
        }
        if let Some((dst, port)) = consumer {
            self.connect(node, dst, port)?;
        }
        Ok(node)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/node.rs"]
mod tests;
