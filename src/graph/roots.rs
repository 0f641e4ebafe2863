use std::fmt;

/// Why an object is kept alive from outside the heap.
#[repr(u8)]
#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug, PartialOrd, Ord)]
pub enum RootKind {
    JniGlobal = 0,
    JniLocal = 1,
    JavaFrame = 2,
    NativeStack = 3,
    StickyClass = 4,
    ThreadBlock = 5,
    Monitor = 6,
    Thread = 7,
    InternedString = 8,
    Finalizing = 9,
    Debugger = 10,
    VmInternal = 11,
    JniMonitor = 12,
    Unknown = 13,
}

impl RootKind {
    pub const ALL: [RootKind; 14] = [
        RootKind::JniGlobal,
        RootKind::JniLocal,
        RootKind::JavaFrame,
        RootKind::NativeStack,
        RootKind::StickyClass,
        RootKind::ThreadBlock,
        RootKind::Monitor,
        RootKind::Thread,
        RootKind::InternedString,
        RootKind::Finalizing,
        RootKind::Debugger,
        RootKind::VmInternal,
        RootKind::JniMonitor,
        RootKind::Unknown,
    ];

    pub fn from_code(code: u32) -> Option<RootKind> {
        Self::ALL.get(code as usize).copied()
    }

    pub const fn code(self) -> u32 {
        self as u32
    }

    const fn mask(self) -> u16 {
        1 << (self as u8)
    }

    pub const fn name(self) -> &'static str {
        match self {
            RootKind::JniGlobal => "JNI_GLOBAL",
            RootKind::JniLocal => "JNI_LOCAL",
            RootKind::JavaFrame => "JAVA_FRAME",
            RootKind::NativeStack => "NATIVE_STACK",
            RootKind::StickyClass => "STICKY_CLASS",
            RootKind::ThreadBlock => "THREAD_BLOCK",
            RootKind::Monitor => "MONITOR",
            RootKind::Thread => "THREAD",
            RootKind::InternedString => "INTERNED_STRING",
            RootKind::Finalizing => "FINALIZING",
            RootKind::Debugger => "DEBUGGER",
            RootKind::VmInternal => "VM_INTERNAL",
            RootKind::JniMonitor => "JNI_MONITOR",
            RootKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of root kinds attached to a single node, stored as a bit vector.
#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct RootKinds(u16);

impl RootKinds {
    /// Returns true if `kind` was not already present.
    pub fn insert(&mut self, kind: RootKind) -> bool {
        let was_set = self.contains(kind);
        self.0 |= kind.mask();
        !was_set
    }

    pub fn contains(&self, kind: RootKind) -> bool {
        self.0 & kind.mask() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Kinds in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = RootKind> + '_ {
        RootKind::ALL.iter().copied().filter(|k| self.contains(*k))
    }
}

impl fmt::Display for RootKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, kind) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}", kind)?;
        }
        Ok(())
    }
}
