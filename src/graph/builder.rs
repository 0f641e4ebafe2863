use std::collections::HashMap;

use super::{HeapGraph, Node, NodeIndex, NodeKind, ObjectId, RefLabel, Reference, RootKind};
use crate::{
    CancelToken, LoadError, MalformedReason, MalformedRecordError, ObjectRecord, Progress, Record,
    RecordRef,
};

/// Incrementally ingests records, then resolves every reference once all
/// nodes exist.
///
/// References are only resolved in [`HeapGraphBuilder::finish`], so records
/// may refer forward to objects defined later in the stream. A target that
/// never shows up stays a dangling edge.
#[derive(Default)]
pub struct HeapGraphBuilder {
    nodes: Vec<Node>,
    index: HashMap<ObjectId, NodeIndex>,
    pending_roots: Vec<(ObjectId, RootKind)>,
    position: usize,
}

impl HeapGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        HeapGraphBuilder {
            nodes: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            pending_roots: vec![],
            position: 0,
        }
    }

    pub fn push(&mut self, record: Record) -> Result<(), MalformedRecordError> {
        let position = self.position;
        self.position += 1;
        let (kind, object, name) = match record {
            Record::Root { id, kind } => {
                self.pending_roots.push((id, kind));
                return Ok(());
            }
            Record::Class { name, object } => (NodeKind::Class, object, Some(name)),
            Record::Instance(object) => (NodeKind::Instance, object, None),
            Record::ObjectArray(object) => (NodeKind::ObjectArray, object, None),
            Record::PrimitiveArray(object) => (NodeKind::PrimitiveArray, object, None),
        };
        let ObjectRecord {
            id,
            class_id,
            shallow_size,
            references,
        } = object;
        let malformed = |reason| MalformedRecordError {
            position,
            id,
            reason,
        };
        if self.index.contains_key(&id) {
            return Err(malformed(MalformedReason::DuplicateId));
        }
        let references = check_layout(kind, references).map_err(malformed)?;
        let index = self.nodes.len() as NodeIndex;
        self.index.insert(id, index);
        self.nodes.push(Node {
            id,
            kind,
            class_id,
            name,
            shallow_size,
            references,
            root_kinds: Default::default(),
        });
        Ok(())
    }

    /// Resolves references and registers roots. Polls `cancel` once per node.
    pub fn finish(
        self,
        progress: &mut dyn Progress,
        cancel: &CancelToken,
    ) -> Result<HeapGraph, LoadError> {
        let HeapGraphBuilder {
            mut nodes,
            index,
            pending_roots,
            ..
        } = self;
        progress.start("Resolving references", nodes.len() as u64);
        let mut referrers: Vec<Vec<NodeIndex>> = vec![vec![]; nodes.len()];
        for (i, node) in nodes.iter_mut().enumerate() {
            cancel.check()?;
            for r in node.references.iter_mut() {
                r.resolved = r.target.and_then(|t| index.get(&t).copied());
                if let Some(t) = r.resolved {
                    referrers[t as usize].push(i as NodeIndex);
                }
            }
            progress.advance(1);
        }
        for list in referrers.iter_mut() {
            list.sort_unstable_by_key(|i| nodes[*i as usize].id);
            list.dedup();
        }

        let mut roots = vec![];
        let mut dangling_roots = vec![];
        for (id, kind) in pending_roots {
            match index.get(&id) {
                Some(&i) => {
                    let node = &mut nodes[i as usize];
                    if node.root_kinds.is_empty() {
                        roots.push(i);
                    }
                    node.root_kinds.insert(kind);
                }
                None => dangling_roots.push((id, kind)),
            }
        }
        progress.done();
        Ok(HeapGraph {
            nodes,
            index,
            roots,
            dangling_roots,
            referrers,
        })
    }
}

fn check_layout(
    kind: NodeKind,
    references: Vec<RecordRef>,
) -> Result<Vec<Reference>, MalformedReason> {
    let count = references.len();
    let mut checked = Vec::with_capacity(count);
    for (position, r) in references.into_iter().enumerate() {
        let label = match (kind, r.label) {
            (NodeKind::PrimitiveArray, _) => {
                return Err(MalformedReason::ReferencesOnPrimitiveArray(count))
            }
            (NodeKind::ObjectArray, RefLabel::Index(i)) => {
                if i as usize != position {
                    return Err(MalformedReason::IndexOutOfOrder {
                        expected: position as u32,
                        found: i,
                    });
                }
                RefLabel::Index(i)
            }
            (NodeKind::ObjectArray, RefLabel::Field(name) | RefLabel::Static(name)) => {
                return Err(MalformedReason::FieldOnArray(name))
            }
            // Fields of a class object are its statics.
            (NodeKind::Class, RefLabel::Field(name) | RefLabel::Static(name)) => {
                RefLabel::Static(name)
            }
            (NodeKind::Instance, RefLabel::Field(name)) => RefLabel::Field(name),
            (NodeKind::Instance, RefLabel::Static(name)) => {
                return Err(MalformedReason::StaticOnInstance(name))
            }
            (NodeKind::Class | NodeKind::Instance, RefLabel::Index(i)) => {
                return Err(MalformedReason::IndexOnNonArray(i))
            }
        };
        checked.push(Reference {
            label,
            target: r.target,
            strong: r.strong,
            resolved: None,
        });
    }
    Ok(checked)
}

/// Builds the reference graph of one snapshot from an ordered record stream.
///
/// Polls `cancel` before every record and every node resolution.
pub fn build_graph<I>(
    records: I,
    progress: &mut dyn Progress,
    cancel: &CancelToken,
) -> Result<HeapGraph, LoadError>
where
    I: IntoIterator<Item = Record>,
{
    let records = records.into_iter();
    let expected = records.size_hint().0;
    let mut builder = HeapGraphBuilder::with_capacity(expected);
    progress.start("Reading records", expected as u64);
    for record in records {
        cancel.check()?;
        builder.push(record)?;
        progress.advance(1);
    }
    progress.done();
    builder.finish(progress, cancel)
}
