use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::Deref;

use once_cell::sync::OnceCell;

use crate::dominators::{compute_dominators, Dominator, DominatorTree};
use crate::graph::{build_graph, HeapGraph, Node, NodeIndex, ObjectId, RefLabel, RootKind};
use crate::path::PathFinder;
use crate::retained::{compute_retained_sizes, RetainedSizes};
use crate::{CancelToken, LoadError, Progress, QueryError, Record};

/// Immediate dominator of a reachable object.
#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug)]
pub enum Idom {
    /// No single object retains it; it is kept alive by the roots themselves.
    SuperRoot,
    Node(ObjectId),
}

/// How an object is kept alive.
#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug)]
pub enum Reachability {
    /// Reachable from a root through strong references only.
    Strong,
    /// Reachable only through at least one soft, weak, phantom or finalizer
    /// reference. Retains nothing and is retained by nothing.
    Weak,
    Unreachable,
}

/// One step of a path from a GC root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathStep {
    pub id: ObjectId,
    /// The reference in the previous step's object that leads here. `None` on
    /// the root step.
    pub field: Option<RefLabel>,
    /// Whether this object is on the target's dominator chain.
    pub is_dominator: bool,
}

/// A fully analysed heap snapshot.
///
/// Built once by [`HeapSnapshot::load`]; every query afterwards is read-only
/// and the snapshot is `Send + Sync`. The breadth-first path table is built
/// lazily by the first path query.
#[derive(Debug)]
pub struct HeapSnapshot {
    graph: HeapGraph,
    dominators: DominatorTree,
    retained: RetainedSizes,
    paths: OnceCell<PathFinder>,
}

/// A node of a snapshot together with its computed retention data.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    snapshot: &'a HeapSnapshot,
    index: NodeIndex,
}

impl<'a> Deref for NodeRef<'a> {
    type Target = Node;

    fn deref(&self) -> &Node {
        self.snapshot.graph.node(self.index)
    }
}

impl<'a> NodeRef<'a> {
    pub fn node(&self) -> &'a Node {
        self.snapshot.graph.node(self.index)
    }

    /// Strongly reachable, i.e. part of the dominator tree.
    pub fn is_reachable(&self) -> bool {
        self.snapshot.dominators.is_reachable(self.index)
    }

    pub fn reachability(&self) -> Reachability {
        if self.is_reachable() {
            Reachability::Strong
        } else if self.snapshot.paths().is_reachable(self.index) {
            Reachability::Weak
        } else {
            Reachability::Unreachable
        }
    }

    /// `None` for unreachable objects.
    pub fn immediate_dominator(&self) -> Option<Idom> {
        self.snapshot.dominators.idom(self.index).map(|d| match d {
            Dominator::SuperRoot => Idom::SuperRoot,
            Dominator::Node(i) => Idom::Node(self.snapshot.graph.id_of(i)),
        })
    }

    /// Zero for unreachable objects.
    pub fn retained_size(&self) -> u64 {
        self.snapshot.retained.get(self.index)
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("shallow_size", &self.shallow_size())
            .field("retained_size", &self.retained_size())
            .finish()
    }
}

impl HeapSnapshot {
    /// Runs graph build, dominator computation and retained-size summation
    /// in sequence. Nothing is returned unless all three complete.
    pub fn load<I>(
        records: I,
        progress: &mut dyn Progress,
        cancel: &CancelToken,
    ) -> Result<HeapSnapshot, LoadError>
    where
        I: IntoIterator<Item = Record>,
    {
        let graph = build_graph(records, progress, cancel)?;
        Self::from_graph(graph, progress, cancel)
    }

    pub fn from_graph(
        graph: HeapGraph,
        progress: &mut dyn Progress,
        cancel: &CancelToken,
    ) -> Result<HeapSnapshot, LoadError> {
        let dominators = compute_dominators(&graph, progress, cancel)?;
        let retained = compute_retained_sizes(&graph, &dominators, progress);
        Ok(HeapSnapshot {
            graph,
            dominators,
            retained,
            paths: OnceCell::new(),
        })
    }

    pub fn graph(&self) -> &HeapGraph {
        &self.graph
    }

    fn index_of(&self, id: ObjectId) -> Result<NodeIndex, QueryError> {
        self.graph.lookup(id).ok_or(QueryError::UnknownId(id))
    }

    fn reachable_index_of(&self, id: ObjectId) -> Result<NodeIndex, QueryError> {
        let i = self.index_of(id)?;
        if self.dominators.is_reachable(i) {
            Ok(i)
        } else {
            Err(QueryError::NotReachable(id))
        }
    }

    fn node_ref(&self, index: NodeIndex) -> NodeRef<'_> {
        NodeRef {
            snapshot: self,
            index,
        }
    }

    fn node_refs(&self, indices: &[NodeIndex]) -> Vec<NodeRef<'_>> {
        indices.iter().map(|i| self.node_ref(*i)).collect()
    }

    pub fn lookup(&self, id: ObjectId) -> Result<NodeRef<'_>, QueryError> {
        Ok(self.node_ref(self.index_of(id)?))
    }

    pub fn retained_size(&self, id: ObjectId) -> Result<u64, QueryError> {
        let i = self.reachable_index_of(id)?;
        Ok(self.retained.get(i))
    }

    /// `Ok(None)` means the object is retained by the roots collectively.
    pub fn dominator(&self, id: ObjectId) -> Result<Option<NodeRef<'_>>, QueryError> {
        let i = self.reachable_index_of(id)?;
        Ok(match self.dominators.idom(i) {
            Some(Dominator::Node(d)) => Some(self.node_ref(d)),
            Some(Dominator::SuperRoot) | None => None,
        })
    }

    /// Objects immediately dominated by `id`, ascending by id. Empty for
    /// unreachable objects.
    pub fn children(&self, id: ObjectId) -> Result<Vec<NodeRef<'_>>, QueryError> {
        let i = self.index_of(id)?;
        Ok(self.node_refs(self.dominators.children(i)))
    }

    /// Objects immediately dominated by the super-root, ascending by id.
    pub fn rooted(&self) -> Vec<NodeRef<'_>> {
        self.node_refs(self.dominators.rooted())
    }

    /// Dominator chain of `id`, nearest first, excluding the super-root.
    pub fn dominators_of(&self, id: ObjectId) -> Result<Vec<NodeRef<'_>>, QueryError> {
        let mut current = self.reachable_index_of(id)?;
        let mut chain = vec![];
        while let Some(Dominator::Node(d)) = self.dominators.idom(current) {
            chain.push(self.node_ref(d));
            current = d;
        }
        Ok(chain)
    }

    fn paths(&self) -> &PathFinder {
        self.paths.get_or_init(|| PathFinder::new(&self.graph))
    }

    pub fn reachability(&self, id: ObjectId) -> Result<Reachability, QueryError> {
        Ok(self.lookup(id)?.reachability())
    }

    /// Shortest path from a GC root to `id` over the reference graph.
    ///
    /// Strong references are preferred: a weakly reachable object gets a path
    /// through the fewest possible non-strong hops first, then the fewest hops.
    pub fn shortest_path_to_root(&self, id: ObjectId) -> Result<Vec<PathStep>, QueryError> {
        let target = self.index_of(id)?;
        let hops = self
            .paths()
            .path_to(target)
            .ok_or(QueryError::NotReachable(id))?;
        let mut next_dominator = Some(target);
        let mut steps: Vec<PathStep> = Vec::with_capacity(hops.len());
        for (k, (node, via)) in hops.iter().enumerate().rev() {
            let is_dominator = next_dominator == Some(*node);
            if is_dominator {
                next_dominator = match self.dominators.idom(*node) {
                    Some(Dominator::Node(d)) => Some(d),
                    _ => None,
                };
            }
            let field = match (k.checked_sub(1), via) {
                (Some(prev), Some(via)) => Some(
                    self.graph.node(hops[prev].0).references()[*via as usize]
                        .label()
                        .clone(),
                ),
                _ => None,
            };
            steps.push(PathStep {
                id: self.graph.id_of(*node),
                field,
                is_dominator,
            });
        }
        steps.reverse();
        Ok(steps)
    }

    /// Distinct objects holding a reference to `id`, ascending by id.
    pub fn referrers(&self, id: ObjectId) -> Result<Vec<NodeRef<'_>>, QueryError> {
        let i = self.index_of(id)?;
        Ok(self.node_refs(self.graph.referrers_of(i)))
    }

    /// Name of the object's class, or the class's own name for class objects.
    pub fn class_name(&self, id: ObjectId) -> Result<Option<&str>, QueryError> {
        let node = self.graph.node(self.index_of(id)?);
        if node.name().is_some() {
            return Ok(node.name());
        }
        Ok(node
            .class_id()
            .and_then(|c| self.graph.get(c))
            .and_then(Node::name))
    }

    /// Objects declared with class `class_id`, ascending by id.
    pub fn instances_of(&self, class_id: ObjectId) -> Result<Vec<NodeRef<'_>>, QueryError> {
        self.index_of(class_id)?;
        let mut instances: Vec<NodeIndex> = (0..self.graph.len() as NodeIndex)
            .filter(|i| self.graph.node(*i).class_id() == Some(class_id))
            .collect();
        self.graph.sort_by_id(&mut instances);
        Ok(self.node_refs(&instances))
    }

    /// The `n` reachable objects with the largest retained size.
    pub fn top_retainers(&self, n: usize) -> Vec<NodeRef<'_>> {
        let mut reachable: Vec<NodeIndex> = (0..self.graph.len() as NodeIndex)
            .filter(|i| self.dominators.is_reachable(*i))
            .collect();
        reachable.sort_unstable_by_key(|i| (Reverse(self.retained.get(*i)), self.graph.id_of(*i)));
        reachable.truncate(n);
        self.node_refs(&reachable)
    }

    /// Number of reachable objects at each dominator-tree depth. Objects
    /// dominated by the super-root are at depth 1.
    pub fn dominator_depths(&self) -> BTreeMap<u64, u64> {
        let mut histogram: BTreeMap<u64, u64> = BTreeMap::new();
        let mut stack: Vec<(NodeIndex, u64)> =
            self.dominators.rooted().iter().map(|r| (*r, 1)).collect();
        while let Some((v, depth)) = stack.pop() {
            *histogram.entry(depth).or_default() += 1;
            stack.extend(self.dominators.children(v).iter().map(|c| (*c, depth + 1)));
        }
        histogram
    }

    /// All objects, ascending by id.
    pub fn nodes(&self) -> Vec<NodeRef<'_>> {
        let mut all: Vec<NodeIndex> = (0..self.graph.len() as NodeIndex).collect();
        self.graph.sort_by_id(&mut all);
        self.node_refs(&all)
    }

    /// Roots in registration order.
    pub fn roots(&self) -> Vec<NodeRef<'_>> {
        self.node_refs(&self.graph.roots)
    }

    pub fn dangling_roots(&self) -> &[(ObjectId, RootKind)] {
        self.graph.dangling_roots()
    }

    /// Retained size of the super-root: every reachable byte.
    pub fn total_retained(&self) -> u64 {
        self.retained.total()
    }

    pub fn node_count(&self) -> usize {
        self.graph.len()
    }

    pub fn reachable_count(&self) -> usize {
        self.dominators.reachable()
    }

    /// Fixed-point passes the dominator computation needed.
    pub fn dominator_passes(&self) -> usize {
        self.dominators.passes()
    }
}

/// Outcome of a snapshot load.
///
/// Queries against a slot whose load failed, including a cancelled one,
/// answer [`QueryError::BuildIncomplete`].
#[derive(Debug)]
pub struct SnapshotSlot(Result<HeapSnapshot, LoadError>);

impl SnapshotSlot {
    pub fn load<I>(records: I, progress: &mut dyn Progress, cancel: &CancelToken) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        SnapshotSlot(HeapSnapshot::load(records, progress, cancel))
    }

    pub fn snapshot(&self) -> Result<&HeapSnapshot, QueryError> {
        self.0.as_ref().map_err(|_| QueryError::BuildIncomplete)
    }

    pub fn load_error(&self) -> Option<&LoadError> {
        self.0.as_ref().err()
    }

    pub fn into_result(self) -> Result<HeapSnapshot, LoadError> {
        self.0
    }

    pub fn lookup(&self, id: ObjectId) -> Result<NodeRef<'_>, QueryError> {
        self.snapshot()?.lookup(id)
    }

    pub fn retained_size(&self, id: ObjectId) -> Result<u64, QueryError> {
        self.snapshot()?.retained_size(id)
    }

    pub fn dominator(&self, id: ObjectId) -> Result<Option<NodeRef<'_>>, QueryError> {
        self.snapshot()?.dominator(id)
    }

    pub fn children(&self, id: ObjectId) -> Result<Vec<NodeRef<'_>>, QueryError> {
        self.snapshot()?.children(id)
    }

    pub fn shortest_path_to_root(&self, id: ObjectId) -> Result<Vec<PathStep>, QueryError> {
        self.snapshot()?.shortest_path_to_root(id)
    }
}

impl From<Result<HeapSnapshot, LoadError>> for SnapshotSlot {
    fn from(result: Result<HeapSnapshot, LoadError>) -> Self {
        SnapshotSlot(result)
    }
}
