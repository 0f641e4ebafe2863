use crate::dominators::DominatorTree;
use crate::graph::{HeapGraph, NodeIndex};
use crate::Progress;

#[derive(Debug)]
pub(crate) struct RetainedSizes {
    sizes: Vec<u64>,
    /// Retained size of the super-root, i.e. every reachable byte.
    total: u64,
}

impl RetainedSizes {
    /// Zero for unreachable nodes.
    pub(crate) fn get(&self, i: NodeIndex) -> u64 {
        self.sizes[i as usize]
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }
}

/// Sums shallow sizes up the dominator tree, children strictly before their
/// parent. Each node is counted exactly once, under its immediate dominator.
pub(crate) fn compute_retained_sizes(
    graph: &HeapGraph,
    tree: &DominatorTree,
    progress: &mut dyn Progress,
) -> RetainedSizes {
    let mut sizes = vec![0u64; graph.len()];
    progress.start("Computing retained sizes", tree.reachable() as u64);
    // Explicit stack: a node is pushed once to expand its children and once
    // more to sum them after they are all done.
    let mut stack: Vec<(NodeIndex, bool)> = tree.rooted().iter().rev().map(|r| (*r, false)).collect();
    while let Some((v, expanded)) = stack.pop() {
        if expanded {
            let dominated: u64 = tree.children(v).iter().map(|c| sizes[*c as usize]).sum();
            sizes[v as usize] = graph.node(v).shallow_size() + dominated;
            progress.advance(1);
        } else {
            stack.push((v, true));
            stack.extend(tree.children(v).iter().rev().map(|c| (*c, false)));
        }
    }
    let total = tree.rooted().iter().map(|r| sizes[*r as usize]).sum();
    progress.done();
    RetainedSizes { sizes, total }
}
