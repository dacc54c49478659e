use xxhash_rust::xxh3::Xxh3;

use crate::graph::node::{NodeGraph, NodeId, Port};

const XXH3_SEED: u64 = 0x5f3c_91d2_a7e4_0b68;

/// Label-addressed view of a subgraph.
///
/// Snapshots compare by labels rather than [`NodeId`]s, so a graph maintained incrementally can
/// be checked edge-for-edge against one rebuilt from scratch in another arena.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct GraphSnapshot {
    /// Nodes of the subtree, sorted by label.
    pub nodes: Vec<SnapshotNode>,
    /// Edges whose consumer lies in the subtree, sorted.
    pub edges: Vec<SnapshotEdge>,
}

/// One node of a [`GraphSnapshot`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct SnapshotNode {
    /// Node label.
    pub label: String,
    /// Operation name.
    pub op: String,
    /// Label of the containing meta node.
    pub parent: Option<String>,
}

/// One edge of a [`GraphSnapshot`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct SnapshotEdge {
    /// Consumer label.
    pub dst: String,
    /// Consumer pad.
    pub port: Port,
    /// Producer label.
    pub src: String,
}

/// Stable 128-bit digest of a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GraphFingerprint {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

impl NodeGraph {
    /// Snapshot the subtree rooted at `root` (children, proxies, and their input edges).
    pub fn snapshot(&self, root: NodeId) -> GraphSnapshot {
        let mut members = vec![root];
        let mut i = 0;
        while i < members.len() {
            if let Some(n) = self.data(members[i]) {
                members.extend(n.input_proxy);
                members.extend(n.output_proxy);
                members.extend(n.children.iter().copied());
            }
            i += 1;
        }

        let label_of = |id: NodeId| {
            self.label(id)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("<dead {}>", id.0))
        };

        let mut nodes = Vec::with_capacity(members.len());
        let mut edges = Vec::new();
        for &id in &members {
            let Some(n) = self.data(id) else { continue };
            nodes.push(SnapshotNode {
                label: n.label.clone(),
                op: n.op.name().to_owned(),
                parent: n.parent.map(label_of),
            });
            for &(port, src) in &n.inputs {
                edges.push(SnapshotEdge {
                    dst: n.label.clone(),
                    port,
                    src: label_of(src),
                });
            }
        }
        nodes.sort();
        edges.sort();
        GraphSnapshot { nodes, edges }
    }
}

impl GraphSnapshot {
    /// Return `true` when the snapshot holds the edge `src -> dst.port`.
    pub fn has_edge(&self, src: &str, dst: &str, port: Port) -> bool {
        self.edges
            .iter()
            .any(|e| e.src == src && e.dst == dst && e.port == port)
    }

    /// Stable digest over nodes and edges.
    pub fn fingerprint(&self) -> GraphFingerprint {
        let mut h = Xxh3::with_seed(XXH3_SEED);
        h.update(&(self.nodes.len() as u64).to_le_bytes());
        for n in &self.nodes {
            write_str(&mut h, &n.label);
            write_str(&mut h, &n.op);
            match &n.parent {
                Some(p) => {
                    h.update(&[1]);
                    write_str(&mut h, p);
                }
                None => h.update(&[0]),
            }
        }
        h.update(&(self.edges.len() as u64).to_le_bytes());
        for e in &self.edges {
            write_str(&mut h, &e.dst);
            h.update(&[e.port as u8]);
            write_str(&mut h, &e.src);
        }
        let v = h.digest128();
        GraphFingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

fn write_str(h: &mut Xxh3, s: &str) {
    h.update(&(s.len() as u64).to_le_bytes());
    h.update(s.as_bytes());
}

#[cfg(test)]
#[path = "../../tests/unit/graph/snapshot.rs"]
mod tests;
