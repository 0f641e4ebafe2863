use crate::graph::{ObjectId, RefLabel, RootKind};

/// A reference as it appears in the record stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordRef {
    pub label: RefLabel,
    pub target: Option<ObjectId>,
    /// `false` for the referent of a soft, weak, phantom or finalizer
    /// reference object.
    pub strong: bool,
}

/// Payload shared by every record that defines an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub class_id: Option<ObjectId>,
    pub shallow_size: u64,
    pub references: Vec<RecordRef>,
}

impl ObjectRecord {
    pub fn new(id: u64, shallow_size: u64) -> Self {
        ObjectRecord {
            id: ObjectId(id),
            class_id: None,
            shallow_size,
            references: vec![],
        }
    }

    pub fn with_class(mut self, class_id: u64) -> Self {
        self.class_id = Some(ObjectId(class_id));
        self
    }

    /// Appends an instance field. A target of 0 is a null reference.
    pub fn field(self, name: &str, target: u64) -> Self {
        self.push(RefLabel::Field(name.to_string()), target, true)
    }

    /// Appends an instance field that does not keep its target alive, such as
    /// `java.lang.ref.WeakReference.referent`.
    pub fn weak_field(self, name: &str, target: u64) -> Self {
        self.push(RefLabel::Field(name.to_string()), target, false)
    }

    /// Appends a static field. A target of 0 is a null reference.
    pub fn static_field(self, name: &str, target: u64) -> Self {
        self.push(RefLabel::Static(name.to_string()), target, true)
    }

    /// Appends the next array element. A target of 0 is a null reference.
    pub fn element(self, target: u64) -> Self {
        let index = self.references.len() as u32;
        self.push(RefLabel::Index(index), target, true)
    }

    fn push(mut self, label: RefLabel, target: u64, strong: bool) -> Self {
        let target = if target == 0 {
            None
        } else {
            Some(ObjectId(target))
        };
        self.references.push(RecordRef {
            label,
            target,
            strong,
        });
        self
    }
}

/// One entry of an ingested heap dump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    Root { id: ObjectId, kind: RootKind },
    Class { name: String, object: ObjectRecord },
    Instance(ObjectRecord),
    ObjectArray(ObjectRecord),
    PrimitiveArray(ObjectRecord),
}

impl Record {
    pub fn root(id: u64, kind: RootKind) -> Self {
        Record::Root {
            id: ObjectId(id),
            kind,
        }
    }

    pub fn class(name: &str, object: ObjectRecord) -> Self {
        Record::Class {
            name: name.to_string(),
            object,
        }
    }
}
