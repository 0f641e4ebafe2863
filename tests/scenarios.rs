use std::collections::{HashMap, VecDeque};

use heapdom::*;
use rstest::{fixture, rstest};

fn load(records: Vec<Record>) -> HeapSnapshot {
    HeapSnapshot::load(records, &mut NullProgress, &CancelToken::new()).unwrap()
}

fn id(raw: u64) -> ObjectId {
    ObjectId(raw)
}

fn dominator_id(s: &HeapSnapshot, raw: u64) -> Option<ObjectId> {
    s.dominator(id(raw)).unwrap().map(|n| n.id())
}

/// R(1) -> A(10) -> {B(20), C(5)}, B -> C
#[fixture]
fn shared_child() -> HeapSnapshot {
    load(vec![
        Record::root(1, RootKind::Thread),
        Record::Instance(ObjectRecord::new(1, 0).field("a", 10)),
        Record::Instance(ObjectRecord::new(10, 10).field("b", 20).field("c", 30)),
        Record::Instance(ObjectRecord::new(20, 20).field("c", 30)),
        Record::Instance(ObjectRecord::new(30, 5)),
    ])
}

#[rstest]
fn shared_child_is_retained_by_its_dominator(shared_child: HeapSnapshot) {
    let s = shared_child;
    assert_eq!(dominator_id(&s, 20), Some(id(10)));
    assert_eq!(dominator_id(&s, 30), Some(id(10)));
    assert_eq!(s.retained_size(id(30)), Ok(5));
    assert_eq!(s.retained_size(id(20)), Ok(20));
    assert_eq!(s.retained_size(id(10)), Ok(35));
    let children: Vec<ObjectId> = s.children(id(10)).unwrap().iter().map(|n| n.id()).collect();
    assert_eq!(children, vec![id(20), id(30)]);
    assert!(s.children(id(20)).unwrap().is_empty());
}

#[rstest]
fn repeated_path_queries_agree(shared_child: HeapSnapshot) {
    let first = shared_child.shortest_path_to_root(id(30)).unwrap();
    let second = shared_child.shortest_path_to_root(id(30)).unwrap();
    assert_eq!(first, second);
    let ids: Vec<ObjectId> = first.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![id(1), id(10), id(30)]);
    assert_eq!(first[2].field, Some(RefLabel::Field("c".into())));
}

#[test]
fn independent_roots_leave_a_shared_object_to_the_super_root() {
    let s = load(vec![
        Record::root(1, RootKind::JniGlobal),
        Record::root(2, RootKind::JniGlobal),
        Record::Instance(ObjectRecord::new(1, 8).field("a", 3)),
        Record::Instance(ObjectRecord::new(2, 8).field("a", 3)),
        Record::Instance(ObjectRecord::new(3, 8)),
    ]);
    assert_eq!(s.dominator(id(3)).unwrap().map(|n| n.id()), None);
    assert_eq!(
        s.lookup(id(3)).unwrap().immediate_dominator(),
        Some(Idom::SuperRoot)
    );
    let rooted: Vec<ObjectId> = s.rooted().iter().map(|n| n.id()).collect();
    assert_eq!(rooted, vec![id(1), id(2), id(3)]);
    assert_eq!(s.total_retained(), 24);
}

#[test]
fn query_errors_are_typed() {
    let s = load(vec![
        Record::root(1, RootKind::Thread),
        Record::Instance(ObjectRecord::new(1, 8)),
        Record::Instance(ObjectRecord::new(2, 8).field("dead", 1)),
    ]);
    assert_eq!(s.lookup(id(99)).err(), Some(QueryError::UnknownId(id(99))));
    assert_eq!(s.retained_size(id(2)), Err(QueryError::NotReachable(id(2))));
    assert_eq!(s.dominator(id(2)).err(), Some(QueryError::NotReachable(id(2))));
    assert_eq!(
        s.shortest_path_to_root(id(2)),
        Err(QueryError::NotReachable(id(2)))
    );
    assert!(s.children(id(2)).unwrap().is_empty());
}

/// Cancels its token once `after` units of work have been reported.
struct CancelAfter {
    token: CancelToken,
    after: u64,
    seen: u64,
}

impl Progress for CancelAfter {
    fn start(&mut self, _description: &str, _duration: u64) {}
    fn advance(&mut self, n: u64) {
        self.seen += n;
        if self.seen >= self.after {
            self.token.cancel();
        }
    }
    fn update(&mut self, _current: u64) {}
    fn done(&mut self) {}
}

fn chain(len: u64) -> Vec<Record> {
    let mut records = vec![Record::root(1, RootKind::Thread)];
    for i in 1..len {
        records.push(Record::Instance(ObjectRecord::new(i, 8).field("next", i + 1)));
    }
    records.push(Record::Instance(ObjectRecord::new(len, 8)));
    records
}

#[rstest]
#[case::while_reading(5)]
#[case::while_resolving(60)]
#[case::while_dominating(120)]
fn cancelling_mid_build_leaves_nothing_to_query(#[case] after: u64) {
    let token = CancelToken::new();
    let mut progress = CancelAfter {
        token: token.clone(),
        after,
        seen: 0,
    };
    let slot = SnapshotSlot::load(chain(50), &mut progress, &token);
    assert_eq!(slot.load_error(), Some(&LoadError::Cancelled));
    assert_eq!(slot.lookup(id(1)).err(), Some(QueryError::BuildIncomplete));
    assert_eq!(slot.retained_size(id(1)), Err(QueryError::BuildIncomplete));
    assert_eq!(slot.dominator(id(2)).err(), Some(QueryError::BuildIncomplete));
    assert_eq!(slot.children(id(1)).err(), Some(QueryError::BuildIncomplete));
    assert_eq!(
        slot.shortest_path_to_root(id(3)),
        Err(QueryError::BuildIncomplete)
    );
}

#[derive(Default)]
struct Recorder {
    phases: Vec<(String, u64, u64)>,
    open: bool,
}

impl Progress for Recorder {
    fn start(&mut self, description: &str, duration: u64) {
        assert!(!self.open, "phase {} started inside another", description);
        self.open = true;
        self.phases.push((description.to_string(), duration, 0));
    }
    fn advance(&mut self, n: u64) {
        if let Some(p) = self.phases.last_mut() {
            p.2 += n;
        }
    }
    fn update(&mut self, current: u64) {
        if let Some(p) = self.phases.last_mut() {
            p.2 = current;
        }
    }
    fn done(&mut self) {
        assert!(self.open);
        self.open = false;
    }
}

#[test]
fn phases_are_reported_in_order_and_may_overshoot() {
    // 4 <-> 5 is a loop entered from both 2 and 3
    let records = vec![
        Record::root(1, RootKind::Thread),
        Record::Instance(ObjectRecord::new(1, 8).field("a", 2).field("b", 3)),
        Record::Instance(ObjectRecord::new(2, 8).field("x", 4)),
        Record::Instance(ObjectRecord::new(3, 8).field("x", 5)),
        Record::Instance(ObjectRecord::new(4, 8).field("x", 5)),
        Record::Instance(ObjectRecord::new(5, 8).field("x", 4)),
    ];
    let mut recorder = Recorder::default();
    let s = HeapSnapshot::load(records, &mut recorder, &CancelToken::new()).unwrap();
    let names: Vec<&str> = recorder.phases.iter().map(|p| p.0.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Reading records",
            "Resolving references",
            "Computing dominators",
            "Computing retained sizes"
        ]
    );
    assert!(!recorder.open);
    let (_, duration, advanced) = &recorder.phases[2];
    assert!(s.dominator_passes() >= 2);
    assert!(advanced > duration);
    assert_eq!(dominator_id(&s, 4), Some(id(1)));
    assert_eq!(dominator_id(&s, 5), Some(id(1)));
}

#[test]
fn paired_loads_report_progress_separately() {
    let mut baseline = Recorder::default();
    let mut current = Recorder::default();
    let cancelled = CancelToken::new();
    cancelled.cancel();
    let (a, b) = load_pair(
        chain(10),
        chain(30),
        &mut baseline,
        &mut current,
        &CancelToken::new(),
        &cancelled,
    );
    assert_eq!(a.retained_size(id(1)), Ok(80));
    assert_eq!(b.load_error(), Some(&LoadError::Cancelled));
    let names: Vec<&str> = baseline.phases.iter().map(|p| p.0.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Reading records",
            "Resolving references",
            "Computing dominators",
            "Computing retained sizes"
        ]
    );
    assert_eq!(baseline.phases[0].1, 11);
    assert!(!baseline.open);
    assert!(current.phases.len() <= 1);
}

/// Linear congruential generator for reproducible graphs.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

fn generated(seed: u64, objects: u64) -> Vec<Record> {
    let mut rng = Lcg(seed);
    let mut records = vec![];
    for o in 1..=objects {
        let mut record = ObjectRecord::new(o, 8 + rng.next(64));
        for f in 0..rng.next(4) {
            let target = match rng.next(10) {
                0 => 0,
                1 => objects + 1 + rng.next(5),
                _ => 1 + rng.next(objects),
            };
            record = record.field(&format!("f{}", f), target);
        }
        records.push(Record::Instance(record));
    }
    for _ in 0..3 {
        records.push(Record::root(1 + rng.next(objects), RootKind::JniGlobal));
    }
    records
}

fn bfs_distances(s: &HeapSnapshot) -> HashMap<ObjectId, usize> {
    let mut distances = HashMap::new();
    let mut queue = VecDeque::new();
    for root in s.roots() {
        if distances.insert(root.id(), 1).is_none() {
            queue.push_back(root.id());
        }
    }
    while let Some(o) = queue.pop_front() {
        let d = distances[&o];
        for r in s.graph().get(o).unwrap().references() {
            if let Some(t) = r.target().filter(|t| s.graph().get(*t).is_some()) {
                if !distances.contains_key(&t) {
                    distances.insert(t, d + 1);
                    queue.push_back(t);
                }
            }
        }
    }
    distances
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(42)]
fn generated_heaps_satisfy_retention_properties(#[case] seed: u64) {
    let s = load(generated(seed, 120));
    let reachable = sanity_trace(&s).unwrap();
    assert_eq!(reachable, s.reachable_count());
    for node in s.nodes() {
        verify_dominance(&s, node.id()).unwrap();
    }
    let distances = bfs_distances(&s);
    for node in s.nodes() {
        match distances.get(&node.id()) {
            Some(d) => {
                let path = s.shortest_path_to_root(node.id()).unwrap();
                assert_eq!(path.len(), *d);
                assert!(path.last().unwrap().is_dominator);
            }
            None => assert!(s.shortest_path_to_root(node.id()).is_err()),
        }
    }
}

#[test]
fn snapshots_answer_queries_from_many_threads() {
    let s = load(generated(3, 200));
    let expected: Vec<Option<u64>> = s
        .nodes()
        .iter()
        .map(|n| s.retained_size(n.id()).ok())
        .collect();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let seen: Vec<Option<u64>> = s
                    .nodes()
                    .iter()
                    .map(|n| s.retained_size(n.id()).ok())
                    .collect();
                assert_eq!(seen, expected);
            });
        }
    });
}

#[test]
fn record_streams_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chain.binpb.zst");
    RecordStream::from_records(&chain(10)).to_binpb_zst(&path).unwrap();
    let records = RecordStream::from_binpb_zst(&path)
        .unwrap()
        .into_records()
        .unwrap();
    let s = load(records);
    assert_eq!(s.retained_size(id(1)), Ok(80));
    assert_eq!(s.dominator_depths().len(), 10);
}
