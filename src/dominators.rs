//! Immediate dominators of the heap graph.
//!
//! Every real root hangs off a synthetic super-root, which gives the
//! computation a single entry point. Dominators are computed with the
//! iterative fixed point of Cooper, Harvey and Kennedy ("A Simple, Fast
//! Dominance Algorithm"): nodes are numbered in reverse postorder, and each
//! pass intersects the current dominator estimates of a node's predecessors
//! until no estimate changes. Both the numbering and the intersection are
//! iterative so that long reference chains cannot exhaust the stack.

use fixedbitset::FixedBitSet;
use smallvec::SmallVec;

use crate::graph::{HeapGraph, NodeIndex};
use crate::{CancelToken, InvariantViolation, LoadError, Progress};

/// Immediate dominator of a reachable node.
#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug)]
pub(crate) enum Dominator {
    SuperRoot,
    Node(NodeIndex),
}

pub(crate) type Dominated = SmallVec<[NodeIndex; 2]>;

#[derive(Debug)]
pub(crate) struct DominatorTree {
    /// `None` for nodes that cannot be reached from the super-root.
    idom: Vec<Option<Dominator>>,
    /// Dominator-tree children of every node, ascending by object id.
    children: Vec<Dominated>,
    /// Children of the super-root, ascending by object id.
    rooted: Vec<NodeIndex>,
    passes: usize,
}

impl DominatorTree {
    pub(crate) fn idom(&self, i: NodeIndex) -> Option<Dominator> {
        self.idom[i as usize]
    }

    pub(crate) fn is_reachable(&self, i: NodeIndex) -> bool {
        self.idom[i as usize].is_some()
    }

    pub(crate) fn children(&self, i: NodeIndex) -> &[NodeIndex] {
        &self.children[i as usize]
    }

    pub(crate) fn rooted(&self) -> &[NodeIndex] {
        &self.rooted
    }

    pub(crate) fn reachable(&self) -> usize {
        self.idom.iter().filter(|d| d.is_some()).count()
    }

    pub(crate) fn passes(&self) -> usize {
        self.passes
    }
}

const UNDEFINED: u32 = u32::MAX;
/// Reverse-postorder number of the super-root.
const ENTRY: u32 = 0;
/// Node ids reported when the fixed point fails to settle.
const MAX_UNSETTLED_REPORTED: usize = 16;

struct Frame {
    vertex: u32,
    next: usize,
}

/// The `at`-th outgoing edge of `vertex`, where vertex `graph.len()` is the
/// super-root. Returns `None` past the last edge, `Some(None)` for an edge
/// that is null, dangling or not strong.
fn successor_at(graph: &HeapGraph, vertex: u32, at: usize) -> Option<Option<NodeIndex>> {
    if vertex as usize == graph.len() {
        graph.roots.get(at).map(|r| Some(*r))
    } else {
        graph.nodes[vertex as usize]
            .references
            .get(at)
            .map(|r| r.retains())
    }
}

/// Depth-first traversal from the super-root, returning the vertices in
/// reverse postorder. The super-root (vertex `graph.len()`) comes first.
fn reverse_postorder(graph: &HeapGraph, cancel: &CancelToken) -> Result<Vec<u32>, LoadError> {
    let super_root = graph.len() as u32;
    let mut visited = FixedBitSet::with_capacity(graph.len() + 1);
    let mut postorder: Vec<u32> = Vec::with_capacity(graph.len() + 1);
    let mut stack = vec![Frame {
        vertex: super_root,
        next: 0,
    }];
    visited.insert(super_root as usize);
    while let Some(frame) = stack.last_mut() {
        let vertex = frame.vertex;
        match successor_at(graph, vertex, frame.next) {
            Some(edge) => {
                frame.next += 1;
                if let Some(child) = edge {
                    if !visited.put(child as usize) {
                        cancel.check()?;
                        stack.push(Frame {
                            vertex: child,
                            next: 0,
                        });
                    }
                }
            }
            None => {
                stack.pop();
                postorder.push(vertex);
            }
        }
    }
    postorder.reverse();
    Ok(postorder)
}

/// Walks both fingers up their dominator chains until they meet. Smaller
/// reverse-postorder numbers are closer to the super-root.
fn intersect(doms: &[u32], mut a: u32, mut b: u32) -> u32 {
    while a != b {
        while a > b {
            a = doms[a as usize];
        }
        while b > a {
            b = doms[b as usize];
        }
    }
    a
}

pub(crate) fn compute_dominators(
    graph: &HeapGraph,
    progress: &mut dyn Progress,
    cancel: &CancelToken,
) -> Result<DominatorTree, LoadError> {
    compute_dominators_bounded(graph, progress, cancel, None)
}

/// Like [`compute_dominators`], but gives up after `max_passes` passes
/// instead of the reachable count + 3.
pub(crate) fn compute_dominators_bounded(
    graph: &HeapGraph,
    progress: &mut dyn Progress,
    cancel: &CancelToken,
    max_passes: Option<usize>,
) -> Result<DominatorTree, LoadError> {
    let rpo = reverse_postorder(graph, cancel)?;
    let count = rpo.len();
    let mut number = vec![UNDEFINED; graph.len() + 1];
    for (r, v) in rpo.iter().enumerate() {
        number[*v as usize] = r as u32;
    }

    // Predecessors of every reachable vertex, in reverse-postorder numbers.
    let mut preds: Vec<Vec<u32>> = vec![vec![]; count];
    for (r, v) in rpo.iter().enumerate() {
        let r = r as u32;
        let mut link = |s: NodeIndex| {
            let target = number[s as usize];
            // Self loops never change a dominator.
            if target != UNDEFINED && target != r {
                preds[target as usize].push(r);
            }
        };
        if r == ENTRY {
            graph.roots.iter().for_each(|s| link(*s));
        } else {
            graph.nodes[*v as usize].successors().for_each(link);
        }
    }
    for p in preds.iter_mut() {
        p.sort_unstable();
        p.dedup();
    }

    let mut doms = vec![UNDEFINED; count];
    doms[ENTRY as usize] = ENTRY;
    let bound = max_passes.unwrap_or(count + 3);
    let mut passes = 0;
    progress.start("Computing dominators", graph.len() as u64);
    loop {
        passes += 1;
        let mut unsettled: Vec<u32> = vec![];
        for r in 1..count {
            cancel.check()?;
            let mut new_idom = UNDEFINED;
            for p in &preds[r] {
                if doms[*p as usize] == UNDEFINED {
                    continue;
                }
                new_idom = if new_idom == UNDEFINED {
                    *p
                } else {
                    intersect(&doms, *p, new_idom)
                };
            }
            progress.advance(1);
            if new_idom != UNDEFINED && doms[r] != new_idom {
                doms[r] = new_idom;
                unsettled.push(r as u32);
            }
        }
        if unsettled.is_empty() {
            break;
        }
        if passes >= bound {
            return Err(violation(graph, &rpo, passes, &unsettled));
        }
    }
    // The parent in the depth-first tree always precedes a node in reverse
    // postorder, so one pass is enough to define every dominator.
    let undefined: Vec<u32> = (1..count as u32)
        .filter(|r| doms[*r as usize] == UNDEFINED)
        .collect();
    if !undefined.is_empty() {
        return Err(violation(graph, &rpo, passes, &undefined));
    }

    let mut idom = vec![None; graph.len()];
    let mut children: Vec<Dominated> = vec![SmallVec::new(); graph.len()];
    let mut rooted = vec![];
    for r in 1..count {
        let v = rpo[r];
        let d = doms[r];
        if d == ENTRY {
            idom[v as usize] = Some(Dominator::SuperRoot);
            rooted.push(v);
        } else {
            let parent = rpo[d as usize];
            idom[v as usize] = Some(Dominator::Node(parent));
            children[parent as usize].push(v);
        }
    }
    for c in children.iter_mut() {
        graph.sort_by_id(c);
    }
    graph.sort_by_id(&mut rooted);
    progress.done();
    Ok(DominatorTree {
        idom,
        children,
        rooted,
        passes,
    })
}

fn violation(graph: &HeapGraph, rpo: &[u32], passes: usize, unsettled: &[u32]) -> LoadError {
    LoadError::InternalInvariantViolation(InvariantViolation {
        passes,
        unsettled: unsettled
            .iter()
            .take(MAX_UNSETTLED_REPORTED)
            .map(|r| graph.id_of(rpo[*r as usize]))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_graph, NullProgress, ObjectId, ObjectRecord, Record, RootKind};

    /// Small graph DSL: `node(src, &[dsts])`, with node 1 as the only root.
    struct TestGraph {
        records: Vec<Record>,
    }

    impl TestGraph {
        fn new() -> Self {
            TestGraph {
                records: vec![Record::root(1, RootKind::Thread)],
            }
        }

        fn node(mut self, src: u64, dsts: &[u64]) -> Self {
            let mut object = ObjectRecord::new(src, 8);
            for (i, d) in dsts.iter().enumerate() {
                object = object.field(&format!("f{}", i), *d);
            }
            self.records.push(Record::Instance(object));
            self
        }

        fn root(mut self, id: u64) -> Self {
            self.records.push(Record::root(id, RootKind::JniGlobal));
            self
        }

        fn compute(self) -> (HeapGraph, DominatorTree) {
            let cancel = CancelToken::new();
            let graph = build_graph(self.records, &mut NullProgress, &cancel).unwrap();
            let tree = compute_dominators(&graph, &mut NullProgress, &cancel).unwrap();
            (graph, tree)
        }
    }

    fn dom(graph: &HeapGraph, tree: &DominatorTree, id: u64) -> Option<u64> {
        let i = graph.lookup(ObjectId(id)).unwrap();
        match tree.idom(i) {
            Some(Dominator::SuperRoot) => Some(0),
            Some(Dominator::Node(d)) => Some(graph.id_of(d).0),
            None => None,
        }
    }

    #[test]
    fn parent_with_child() {
        let (g, t) = TestGraph::new().node(1, &[2]).node(2, &[]).compute();
        assert_eq!(dom(&g, &t, 1), Some(0));
        assert_eq!(dom(&g, &t, 2), Some(1));
    }

    #[test]
    fn reachable_two_ways() {
        //       /-> 3 ->\
        // --> 1          4
        //       \-> 2 ->/
        let (g, t) = TestGraph::new()
            .node(1, &[2, 3])
            .node(2, &[4])
            .node(3, &[4])
            .node(4, &[])
            .compute();
        assert_eq!(dom(&g, &t, 2), Some(1));
        assert_eq!(dom(&g, &t, 3), Some(1));
        assert_eq!(dom(&g, &t, 4), Some(1));
    }

    #[test]
    fn child_self_loop() {
        let (g, t) = TestGraph::new().node(1, &[2]).node(2, &[2]).compute();
        assert_eq!(dom(&g, &t, 2), Some(1));
    }

    #[test]
    fn single_entry_loop() {
        // --> 1 --> 2 --> 3 --> 4 -\
        //           \<-------------/
        let (g, t) = TestGraph::new()
            .node(1, &[2])
            .node(2, &[3])
            .node(3, &[4])
            .node(4, &[2])
            .compute();
        assert_eq!(dom(&g, &t, 2), Some(1));
        assert_eq!(dom(&g, &t, 3), Some(2));
        assert_eq!(dom(&g, &t, 4), Some(3));
    }

    #[test]
    fn multi_entry_loop() {
        // 1 -> {left 2, right 3}; 2 -> c 6; 3 -> a 4; 4 -> b 5; 5 -> 6; 6 -> 4
        let (g, t) = TestGraph::new()
            .node(1, &[2, 3])
            .node(2, &[6])
            .node(3, &[4])
            .node(4, &[5])
            .node(5, &[6])
            .node(6, &[4])
            .compute();
        assert_eq!(dom(&g, &t, 3), Some(1));
        assert_eq!(dom(&g, &t, 2), Some(1));
        assert_eq!(dom(&g, &t, 4), Some(1));
        assert_eq!(dom(&g, &t, 6), Some(1));
        assert_eq!(dom(&g, &t, 5), Some(4));
    }

    #[test]
    fn hidden_revisit() {
        // p=1 -> {right 3, left 2}; 3 -> a 4; 2 -> {4, c 6}; 4 -> b 5; 5 -> 6
        let (g, t) = TestGraph::new()
            .node(1, &[3, 2])
            .node(3, &[4])
            .node(2, &[4, 6])
            .node(4, &[5])
            .node(5, &[6])
            .node(6, &[])
            .compute();
        assert_eq!(dom(&g, &t, 2), Some(1));
        assert_eq!(dom(&g, &t, 3), Some(1));
        assert_eq!(dom(&g, &t, 4), Some(1));
        assert_eq!(dom(&g, &t, 6), Some(1));
        assert_eq!(dom(&g, &t, 5), Some(4));
    }

    #[test]
    fn twice_revisit() {
        // a=1 -> {f 6, b 2}; b -> {f, d 5, x 3}; x -> c 4; c -> d; f -> c
        let (g, t) = TestGraph::new()
            .node(1, &[6, 2])
            .node(2, &[6, 5, 3])
            .node(3, &[4])
            .node(4, &[5])
            .node(5, &[])
            .node(6, &[4])
            .compute();
        assert_eq!(dom(&g, &t, 2), Some(1));
        assert_eq!(dom(&g, &t, 3), Some(2));
        assert_eq!(dom(&g, &t, 4), Some(1));
        assert_eq!(dom(&g, &t, 5), Some(1));
        assert_eq!(dom(&g, &t, 6), Some(1));
    }

    #[test]
    fn independent_roots_share_super_root() {
        let (g, t) = TestGraph::new()
            .root(2)
            .node(1, &[3])
            .node(2, &[3])
            .node(3, &[])
            .compute();
        assert_eq!(dom(&g, &t, 3), Some(0));
        let rooted: Vec<u64> = t.rooted().iter().map(|i| g.id_of(*i).0).collect();
        assert_eq!(rooted, vec![1, 2, 3]);
    }

    #[test]
    fn garbage_cycles_are_unreachable() {
        let (g, t) = TestGraph::new()
            .node(1, &[])
            .node(2, &[3])
            .node(3, &[2])
            .compute();
        assert_eq!(dom(&g, &t, 2), None);
        assert_eq!(dom(&g, &t, 3), None);
        assert_eq!(t.reachable(), 1);
    }

    #[test]
    fn deep_chains_do_not_overflow_the_stack() {
        let mut graph = TestGraph::new();
        let depth = 200_000;
        for i in 1..depth {
            graph = graph.node(i, &[i + 1]);
        }
        let (g, t) = graph.node(depth, &[]).compute();
        assert_eq!(dom(&g, &t, depth), Some(depth - 1));
        assert_eq!(t.reachable(), depth as usize);
    }

    #[test]
    fn cancellation_is_polled_per_node() {
        let cancel = CancelToken::new();
        let graph = build_graph(
            TestGraph::new().node(1, &[2]).node(2, &[]).records,
            &mut NullProgress,
            &cancel,
        )
        .unwrap();
        cancel.cancel();
        let err = compute_dominators(&graph, &mut NullProgress, &cancel).unwrap_err();
        assert_eq!(err, LoadError::Cancelled);
    }

    fn unsettled_after_one_pass(graph: TestGraph) -> (HeapGraph, InvariantViolation) {
        let cancel = CancelToken::new();
        let g = build_graph(graph.records, &mut NullProgress, &cancel).unwrap();
        let err = compute_dominators_bounded(&g, &mut NullProgress, &cancel, Some(1)).unwrap_err();
        match err {
            LoadError::InternalInvariantViolation(v) => (g, v),
            other => panic!("expected an invariant violation, got {:?}", other),
        }
    }

    #[test]
    fn exhausted_pass_bound_names_unsettled_objects() {
        let (g, v) = unsettled_after_one_pass(
            TestGraph::new()
                .node(1, &[2, 3])
                .node(2, &[6])
                .node(3, &[4])
                .node(4, &[5])
                .node(5, &[6])
                .node(6, &[4]),
        );
        assert_eq!(v.passes, 1);
        assert!(!v.unsettled.is_empty());
        for id in &v.unsettled {
            assert!(g.lookup(*id).is_some(), "{} is not in the graph", id);
        }
    }

    #[test]
    fn unsettled_report_is_capped() {
        let mut graph = TestGraph::new();
        for i in 1..40 {
            graph = graph.node(i, &[i + 1]);
        }
        let (_, v) = unsettled_after_one_pass(graph.node(40, &[]));
        assert_eq!(v.unsettled.len(), MAX_UNSETTLED_REPORTED);
    }

    #[test]
    fn default_bound_settles_the_multi_entry_loop() {
        let cancel = CancelToken::new();
        let records = TestGraph::new()
            .node(1, &[2, 3])
            .node(2, &[6])
            .node(3, &[4])
            .node(4, &[5])
            .node(5, &[6])
            .node(6, &[4])
            .records;
        let g = build_graph(records, &mut NullProgress, &cancel).unwrap();
        let t = compute_dominators_bounded(&g, &mut NullProgress, &cancel, None).unwrap();
        assert!(t.passes() <= t.reachable() + 3);
    }
}
