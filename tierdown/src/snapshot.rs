use crate::Addr;

/// One scheduled lazy deoptimization: the frame it applies to and the code
/// address the frame must resume at once it is deoptimized.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PendingDeopt {
    pub fp: Addr,
    pub pc: Addr,
}

/// An immutable published version of the pending-deopt table.
///
/// A snapshot is fully built before it is published and never touched
/// afterwards, so a reader that captured a reference to it can scan it
/// without caring what the mutator does next.
#[derive(Debug)]
pub struct Snapshot {
    entries: Box<[PendingDeopt]>,
}

impl Snapshot {
    #[must_use]
    pub fn empty() -> Self {
        Self { entries: Box::new([]) }
    }

    /// Builds a snapshot from the given entries, insertion order preserved.
    /// Frame pointers must be pairwise distinct within one snapshot.
    #[must_use]
    pub fn from_entries(entries: Box<[PendingDeopt]>) -> Self {
        debug_assert!(
            entries
                .iter()
                .enumerate()
                .all(|(i, a)| entries[i + 1..].iter().all(|b| a.fp != b.fp)),
            "duplicate frame pointer in pending deopt snapshot"
        );
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[PendingDeopt] {
        &self.entries
    }

    /// First entry registered for `fp`, if any. Linear scan; the table is
    /// bounded by in-flight deopt requests, not stack depth.
    #[must_use]
    pub fn find(&self, fp: Addr) -> Option<&PendingDeopt> {
        self.entries.iter().find(|entry| entry.fp == fp)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
