use crate::{HeapGraph, HeapSnapshot, Idom, ObjectId};
use anyhow::{ensure, Result};
use std::collections::HashSet;

/// Plain mark-stack trace from the roots over strong references, optionally
/// pretending `removed` does not exist.
fn reachable_from_roots(graph: &HeapGraph, removed: Option<ObjectId>) -> HashSet<ObjectId> {
    let mut reachable_objects: HashSet<ObjectId> = HashSet::new();
    let mut mark_stack: Vec<ObjectId> = graph.roots().map(|r| r.id()).collect();
    while let Some(o) = mark_stack.pop() {
        if Some(o) == removed || reachable_objects.contains(&o) {
            continue;
        }
        let Some(obj) = graph.get(o) else {
            continue;
        };
        reachable_objects.insert(o);
        for r in obj.references().iter().filter(|r| r.is_strong()) {
            if let Some(target) = r.target() {
                mark_stack.push(target);
            }
        }
    }
    reachable_objects
}

/// Cross-checks a snapshot's dominator tree and retained sizes against an
/// independent trace of the reference graph. Returns the reachable count.
pub fn sanity_trace(snapshot: &HeapSnapshot) -> Result<usize> {
    let reachable = reachable_from_roots(snapshot.graph(), None);
    ensure!(
        reachable.len() == snapshot.reachable_count(),
        "trace found {} reachable objects, dominator tree has {}",
        reachable.len(),
        snapshot.reachable_count()
    );
    let mut shallow_total = 0;
    for node in snapshot.nodes() {
        let id = node.id();
        if !reachable.contains(&id) {
            ensure!(!node.is_reachable(), "{} should be unreachable", id);
            ensure!(node.retained_size() == 0, "unreachable {} retains bytes", id);
            ensure!(node.immediate_dominator().is_none(), "unreachable {} has a dominator", id);
            continue;
        }
        shallow_total += node.shallow_size();
        ensure!(
            node.retained_size() >= node.shallow_size(),
            "{} retains less than its own size",
            id
        );
        let dominated: u64 = snapshot.children(id)?.iter().map(|c| c.retained_size()).sum();
        ensure!(
            node.retained_size() == node.shallow_size() + dominated,
            "retained size of {} is not its shallow size plus its dominated children",
            id
        );
        let chain = snapshot.dominators_of(id)?;
        ensure!(
            chain.len() < snapshot.node_count(),
            "dominator chain of {} does not terminate",
            id
        );
        if let Some(Idom::Node(d)) = node.immediate_dominator() {
            ensure!(reachable.contains(&d), "{} is dominated by unreachable {}", id, d);
        }
    }
    ensure!(
        snapshot.total_retained() == shallow_total,
        "super-root retains {} bytes, reachable objects total {}",
        snapshot.total_retained(),
        shallow_total
    );
    Ok(reachable.len())
}

/// Removes `id` from the graph and checks that exactly the objects it
/// dominates become unreachable.
pub fn verify_dominance(snapshot: &HeapSnapshot, id: ObjectId) -> Result<()> {
    let before = reachable_from_roots(snapshot.graph(), None);
    if !before.contains(&id) {
        return Ok(());
    }
    let after = reachable_from_roots(snapshot.graph(), Some(id));
    let mut lost: Vec<ObjectId> = before
        .iter()
        .filter(|o| **o != id && !after.contains(o))
        .copied()
        .collect();
    lost.sort_unstable();
    let mut dominated = vec![];
    let mut stack: Vec<ObjectId> = snapshot.children(id)?.iter().map(|c| c.id()).collect();
    while let Some(o) = stack.pop() {
        dominated.push(o);
        stack.extend(snapshot.children(o)?.iter().map(|c| c.id()));
    }
    dominated.sort_unstable();
    ensure!(
        lost == dominated,
        "removing {} disconnects {:?} but it dominates {:?}",
        id,
        lost,
        dominated
    );
    Ok(())
}
