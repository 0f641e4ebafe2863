use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::{CancelToken, HeapSnapshot, ObjectId, Progress, Record, SnapshotSlot};

/// Retained size of one object present in both snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetainedDelta {
    pub id: ObjectId,
    pub baseline: u64,
    pub current: u64,
}

impl RetainedDelta {
    pub fn delta(&self) -> i128 {
        self.current as i128 - self.baseline as i128
    }
}

/// Object-by-object comparison of two snapshots, matched on object id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Comparison {
    /// Present in both, largest absolute change first, ties by id. An object
    /// that is unreachable on one side counts as retaining zero there.
    pub deltas: Vec<RetainedDelta>,
    /// Present in the baseline only, ascending by id.
    pub only_in_baseline: Vec<ObjectId>,
    /// Present in the current snapshot only, ascending by id.
    pub only_in_current: Vec<ObjectId>,
    pub total_baseline: u64,
    pub total_current: u64,
}

fn retained_sizes(snapshot: &HeapSnapshot) -> BTreeMap<ObjectId, u64> {
    snapshot
        .nodes()
        .into_iter()
        .map(|n| (n.id(), n.retained_size()))
        .collect()
}

pub fn compare(baseline: &HeapSnapshot, current: &HeapSnapshot) -> Comparison {
    let before = retained_sizes(baseline);
    let after = retained_sizes(current);
    let mut comparison = Comparison {
        total_baseline: baseline.total_retained(),
        total_current: current.total_retained(),
        ..Default::default()
    };
    for (id, size) in &before {
        match after.get(id) {
            Some(now) => comparison.deltas.push(RetainedDelta {
                id: *id,
                baseline: *size,
                current: *now,
            }),
            None => comparison.only_in_baseline.push(*id),
        }
    }
    comparison.only_in_current = after
        .keys()
        .filter(|id| !before.contains_key(id))
        .copied()
        .collect();
    comparison
        .deltas
        .sort_by_key(|d| (Reverse(d.delta().unsigned_abs()), d.id));
    comparison
}

/// Loads two record sets concurrently, each with its own progress sink and
/// cancellation token.
///
/// A failed or cancelled side does not affect the other; the returned slots
/// carry each outcome separately.
pub fn load_pair(
    baseline: Vec<Record>,
    current: Vec<Record>,
    progress_baseline: &mut (dyn Progress + Send),
    progress_current: &mut (dyn Progress + Send),
    cancel_baseline: &CancelToken,
    cancel_current: &CancelToken,
) -> (SnapshotSlot, SnapshotSlot) {
    std::thread::scope(|s| {
        let handle =
            s.spawn(move || SnapshotSlot::load(current, progress_current, cancel_current));
        let a = SnapshotSlot::load(baseline, progress_baseline, cancel_baseline);
        match handle.join() {
            Ok(b) => (a, b),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    })
}
