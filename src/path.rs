use std::collections::VecDeque;

use crate::graph::{HeapGraph, NodeIndex};

/// How the breadth-first search first reached a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Parent {
    SuperRoot,
    /// Reached from `from` through its `via`-th reference.
    Node { from: NodeIndex, via: u32 },
}

/// Breadth-first parent table over the raw reference graph.
///
/// The search first follows strong references only. Non-strong references
/// met on the way are queued and followed afterwards, together with
/// everything reachable from them, so a weakly reachable node is always
/// reached after every strongly reachable one.
///
/// Roots are seeded in registration order and every expanded node enqueues
/// its successors by ascending object id; among several references to the
/// same target the first one wins. The first discovery of a node therefore
/// fixes a single deterministic shortest path to it.
#[derive(Debug)]
pub(crate) struct PathFinder {
    parents: Vec<Option<Parent>>,
}

/// One hop of a path: the node, and the index of the reference in the previous
/// node that points at it (`None` for the root itself).
pub(crate) type Hop = (NodeIndex, Option<u32>);

/// Resolved references of `o` as `(target, reference index, strong)`, by
/// ascending target id.
fn sorted_edges(graph: &HeapGraph, o: NodeIndex, edges: &mut Vec<(NodeIndex, u32, bool)>) {
    edges.clear();
    for (via, r) in graph.node(o).references().iter().enumerate() {
        if let Some(child) = r.resolved() {
            edges.push((child, via as u32, r.is_strong()));
        }
    }
    edges.sort_by_key(|(child, via, _)| (graph.id_of(*child), *via));
}

impl PathFinder {
    pub(crate) fn new(graph: &HeapGraph) -> Self {
        let mut parents: Vec<Option<Parent>> = vec![None; graph.len()];
        let mut strong: VecDeque<NodeIndex> = VecDeque::new();
        // (from, reference index, target)
        let mut weak: VecDeque<(NodeIndex, u32, NodeIndex)> = VecDeque::new();
        for root in &graph.roots {
            if parents[*root as usize].is_none() {
                parents[*root as usize] = Some(Parent::SuperRoot);
                strong.push_back(*root);
            }
        }
        let mut edges = vec![];
        while let Some(o) = strong.pop_front() {
            sorted_edges(graph, o, &mut edges);
            for (child, via, is_strong) in &edges {
                if !is_strong {
                    weak.push_back((o, *via, *child));
                } else if parents[*child as usize].is_none() {
                    parents[*child as usize] = Some(Parent::Node {
                        from: o,
                        via: *via,
                    });
                    strong.push_back(*child);
                }
            }
        }
        while let Some((from, via, o)) = weak.pop_front() {
            if parents[o as usize].is_some() {
                continue;
            }
            parents[o as usize] = Some(Parent::Node { from, via });
            sorted_edges(graph, o, &mut edges);
            weak.extend(edges.iter().map(|(child, via, _)| (o, *via, *child)));
        }
        PathFinder { parents }
    }

    /// Reachable through any reference, strong or not.
    pub(crate) fn is_reachable(&self, target: NodeIndex) -> bool {
        self.parents[target as usize].is_some()
    }

    /// Hops from a root down to `target`, or `None` when unreachable.
    pub(crate) fn path_to(&self, target: NodeIndex) -> Option<Vec<Hop>> {
        let mut hops = vec![];
        let mut current = target;
        loop {
            match self.parents[current as usize]? {
                Parent::SuperRoot => {
                    hops.push((current, None));
                    break;
                }
                Parent::Node { from, via } => {
                    hops.push((current, Some(via)));
                    current = from;
                }
            }
        }
        hops.reverse();
        Some(hops)
    }
}
