use std::collections::HashMap;

mod builder;
mod node;
mod roots;

pub use builder::{build_graph, HeapGraphBuilder};
pub use node::{Node, NodeKind, ObjectId, RefLabel, Reference};
pub use roots::{RootKind, RootKinds};

/// Dense position of a node in the node table.
pub(crate) type NodeIndex = u32;

/// The materialized reference graph of one snapshot.
///
/// Immutable once returned by the builder. Roots are kept in the order they
/// were first registered in the record stream.
#[derive(Debug)]
pub struct HeapGraph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) index: HashMap<ObjectId, NodeIndex>,
    pub(crate) roots: Vec<NodeIndex>,
    pub(crate) dangling_roots: Vec<(ObjectId, RootKind)>,
    pub(crate) referrers: Vec<Vec<NodeIndex>>,
}

impl HeapGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Node> {
        self.lookup(id).map(|i| self.node(i))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Roots in registration order.
    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.roots.iter().map(|i| self.node(*i))
    }

    pub fn dangling_roots(&self) -> &[(ObjectId, RootKind)] {
        &self.dangling_roots
    }

    pub(crate) fn lookup(&self, id: ObjectId) -> Option<NodeIndex> {
        self.index.get(&id).copied()
    }

    pub(crate) fn node(&self, i: NodeIndex) -> &Node {
        &self.nodes[i as usize]
    }

    pub(crate) fn id_of(&self, i: NodeIndex) -> ObjectId {
        self.nodes[i as usize].id
    }

    pub(crate) fn referrers_of(&self, i: NodeIndex) -> &[NodeIndex] {
        &self.referrers[i as usize]
    }

    pub(crate) fn sort_by_id(&self, indices: &mut [NodeIndex]) {
        indices.sort_unstable_by_key(|i| self.id_of(*i));
    }
}
