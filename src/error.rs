use thiserror::Error;

use crate::graph::ObjectId;

/// Why a record was rejected during ingestion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    #[error("id already defined by an earlier record")]
    DuplicateId,
    #[error("object array element labelled with field `{0}`")]
    FieldOnArray(String),
    #[error("indexed reference [{0}] on a non-array object")]
    IndexOnNonArray(u32),
    #[error("static field `{0}` on an instance")]
    StaticOnInstance(String),
    #[error("array element out of order: expected [{expected}], found [{found}]")]
    IndexOutOfOrder { expected: u32, found: u32 },
    #[error("primitive array carries {0} references")]
    ReferencesOnPrimitiveArray(usize),
    #[error("reference has neither a field name nor an index")]
    UnlabelledReference,
    #[error("reference has both a field name and an index")]
    AmbiguousReference,
    #[error("class record without a name")]
    MissingClassName,
    #[error("unknown record type {0}")]
    UnknownRecordType(i32),
    #[error("unknown root kind {0}")]
    UnknownRootKind(u32),
}

/// A record whose declared kind disagrees with its layout. Fatal to the load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed record #{position} (id {id}): {reason}")]
pub struct MalformedRecordError {
    pub position: usize,
    pub id: ObjectId,
    pub reason: MalformedReason,
}

/// The dominator fixed point failed to settle within its pass bound.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dominators did not converge after {passes} passes; unsettled: {unsettled:?}")]
pub struct InvariantViolation {
    pub passes: usize,
    pub unsettled: Vec<ObjectId>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    Malformed(#[from] MalformedRecordError),
    #[error("snapshot load cancelled")]
    Cancelled,
    #[error("internal invariant violation: {0}")]
    InternalInvariantViolation(#[from] InvariantViolation),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("no object with id {0}")]
    UnknownId(ObjectId),
    /// The object exists but nothing outside the heap keeps it alive.
    #[error("object {0} is not reachable from any GC root")]
    NotReachable(ObjectId),
    #[error("snapshot was never completely built")]
    BuildIncomplete,
}
