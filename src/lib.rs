#[macro_use]
extern crate log;

mod analysis;
mod cancel;
pub mod cli;
mod compare;
mod dominators;
mod error;
mod export;
mod graph;
mod heapdump;
mod path;
mod progress;
mod record;
mod retained;
mod sanity;
mod snapshot;

pub use crate::analysis::{dominator_depth, dominator_depth_frame, print_summary};
pub use crate::cancel::CancelToken;
pub use crate::compare::{compare, load_pair, Comparison, RetainedDelta};
pub use crate::error::{
    InvariantViolation, LoadError, MalformedReason, MalformedRecordError, QueryError,
};
pub use crate::export::{dominator_frame, write_csv, write_parquet};
pub use crate::graph::{
    build_graph, HeapGraph, HeapGraphBuilder, Node, NodeKind, ObjectId, RefLabel, Reference,
    RootKind, RootKinds,
};
pub use crate::heapdump::{RecordMessage, RecordStream, RecordType, ReferenceMessage};
pub use crate::progress::{LogProgress, NullProgress, Progress};
pub use crate::record::{ObjectRecord, Record, RecordRef};
pub use crate::sanity::{sanity_trace, verify_dominance};
pub use crate::snapshot::{HeapSnapshot, Idom, NodeRef, PathStep, Reachability, SnapshotSlot};
