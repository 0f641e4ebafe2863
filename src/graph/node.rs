use std::fmt;

use super::{NodeIndex, RootKinds};

/// Identity of an object as recorded in the heap dump.
#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(raw: u64) -> Self {
        ObjectId(raw)
    }
}

#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug)]
pub enum NodeKind {
    Class,
    Instance,
    ObjectArray,
    PrimitiveArray,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Class => "class",
            NodeKind::Instance => "instance",
            NodeKind::ObjectArray => "object-array",
            NodeKind::PrimitiveArray => "primitive-array",
        };
        f.write_str(s)
    }
}

/// Where a reference lives inside its owner.
#[derive(Hash, PartialEq, Eq, Clone, Debug)]
pub enum RefLabel {
    Field(String),
    Static(String),
    Index(u32),
}

impl fmt::Display for RefLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefLabel::Field(name) => f.write_str(name),
            RefLabel::Static(name) => write!(f, ".{}", name),
            RefLabel::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// An outgoing reference. `target` is `None` for a null slot; a target that
/// never appeared in the record stream stays unresolved (dangling).
///
/// Non-strong references (the referent of a soft, weak, phantom or finalizer
/// reference object) do not retain their target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub(crate) label: RefLabel,
    pub(crate) target: Option<ObjectId>,
    pub(crate) strong: bool,
    pub(crate) resolved: Option<NodeIndex>,
}

impl Reference {
    pub fn label(&self) -> &RefLabel {
        &self.label
    }

    pub fn target(&self) -> Option<ObjectId> {
        self.target
    }

    pub fn is_null(&self) -> bool {
        self.target.is_none()
    }

    pub fn is_dangling(&self) -> bool {
        self.target.is_some() && self.resolved.is_none()
    }

    pub fn is_strong(&self) -> bool {
        self.strong
    }

    pub(crate) fn resolved(&self) -> Option<NodeIndex> {
        self.resolved
    }

    /// The resolved target, if this reference keeps it alive.
    pub(crate) fn retains(&self) -> Option<NodeIndex> {
        self.resolved.filter(|_| self.strong)
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) id: ObjectId,
    pub(crate) kind: NodeKind,
    pub(crate) class_id: Option<ObjectId>,
    pub(crate) name: Option<String>,
    pub(crate) shallow_size: u64,
    pub(crate) references: Vec<Reference>,
    pub(crate) root_kinds: RootKinds,
}

impl Node {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn class_id(&self) -> Option<ObjectId> {
        self.class_id
    }

    /// Class name, only present on class objects.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn shallow_size(&self) -> u64 {
        self.shallow_size
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn root_kinds(&self) -> RootKinds {
        self.root_kinds
    }

    pub fn is_root(&self) -> bool {
        !self.root_kinds.is_empty()
    }

    /// Targets of the strong references.
    pub(crate) fn successors(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.references.iter().filter_map(Reference::retains)
    }
}
