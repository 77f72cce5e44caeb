use std::{
    fmt,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering::{Acquire, Release},
        },
    },
};

use crossbeam::epoch::{self, Atomic, Owned};

use crate::{Addr, DeoptTracer, NullTracer, PendingDeopt, Snapshot, TraceEvent};

/// Why entries below a boundary are being cleared. Affects tracing only.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClearReason {
    /// The stack is unwinding past the frames on a throw.
    Throw,
    /// The deoptimization was actually performed.
    Deopt,
}

/// An unrecoverable scheduling-invariant violation. The registry reports it
/// instead of aborting; the embedding VM decides how to escalate, which
/// keeps the table testable.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PendingDeoptError {
    /// A frame was registered twice without being cleared in between.
    DuplicateFrame { fp: Addr },
    /// A must-exist lookup was made for a frame with no pending entry.
    MissingEntry { fp: Addr },
}

impl fmt::Display for PendingDeoptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateFrame { fp } => {
                write!(f, "duplicate pending deopt entry for fp={fp}")
            }
            Self::MissingEntry { fp } => {
                write!(f, "missing pending deopt entry for fp={fp}")
            }
        }
    }
}

impl std::error::Error for PendingDeoptError {}

#[derive(Default)]
pub struct PendingDeoptsCreateInfo {
    pub tracer: Option<Arc<dyn DeoptTracer>>,
}

/// The lazy-deopt scheduling table of one VM thread.
///
/// One thread (the owner) registers and retires entries; the exception
/// unwinder and a sampling profiler read concurrently at arbitrary
/// interruption points. Reads capture the published snapshot pointer once
/// and only scan the immutable data behind it. Mutation builds a fresh
/// snapshot, swaps the pointer, and retires the old snapshot through the
/// epoch collector so it is never freed under a reader mid-scan.
pub struct PendingDeopts {
    current: Atomic<Snapshot>,
    pub(crate) tracer: Arc<dyn DeoptTracer>,
    mutating: AtomicBool,
}

impl PendingDeopts {
    #[must_use]
    pub fn new(info: PendingDeoptsCreateInfo) -> Self {
        Self {
            current: Atomic::new(Snapshot::empty()),
            tracer: info.tracer.unwrap_or_else(|| Arc::new(NullTracer)),
            mutating: AtomicBool::new(false),
        }
    }

    /// Schedules frame `fp` to resume at `pc` once it is deoptimized.
    ///
    /// A frame may have at most one pending entry; re-registering one is a
    /// scheduling bug and comes back as `DuplicateFrame`.
    pub fn add_pending_deopt(&self, fp: Addr, pc: Addr) -> Result<(), PendingDeoptError> {
        let _m = self.begin_mutation();
        let guard = epoch::pin();
        let current = self.current.load(Acquire, &guard);
        // SAFETY: the registry never publishes null and the guard keeps the
        // snapshot alive for the duration of this scan.
        let current = unsafe { current.deref() };

        if current.find(fp).is_some() {
            return Err(PendingDeoptError::DuplicateFrame { fp });
        }

        let mut entries = Vec::with_capacity(current.len() + 1);
        entries.extend_from_slice(current.entries());
        entries.push(PendingDeopt { fp, pc });
        self.publish(entries, &guard);
        Ok(())
    }

    /// The pending entry for `fp`, or `None`. This is the async-reader-safe
    /// path: one pointer capture, no lock, no allocation, no blocking.
    #[must_use]
    pub fn find_pending_deopt_record(&self, fp: Addr) -> Option<PendingDeopt> {
        let guard = epoch::pin();
        // SAFETY: non-null by construction, pinned for the scan.
        let snapshot = unsafe { self.current.load(Acquire, &guard).deref() };
        snapshot.find(fp).copied()
    }

    /// The resume pc for `fp`. Callers only ask for frames they know are
    /// pending; a miss is a corrupted scheduling invariant.
    pub fn find_pending_deopt(&self, fp: Addr) -> Result<Addr, PendingDeoptError> {
        self.find_pending_deopt_record(fp)
            .map(|record| record.pc)
            .ok_or(PendingDeoptError::MissingEntry { fp })
    }

    /// Drops every entry whose frame pointer is strictly below `fp`. Frames
    /// below an unwind boundary no longer exist and must not be matched
    /// later.
    pub fn clear_pending_deopts_below(&self, fp: Addr, reason: ClearReason) {
        let _m = self.begin_mutation();
        let guard = epoch::pin();
        // SAFETY: non-null by construction, pinned for the scan.
        let current = unsafe { self.current.load(Acquire, &guard).deref() };

        let mut retained = Vec::with_capacity(current.len());
        for entry in current.entries() {
            if entry.fp >= fp {
                retained.push(*entry);
            } else {
                self.tracer.trace(match reason {
                    ClearReason::Throw => TraceEvent::SkippedDueToThrow {
                        fp: entry.fp,
                        pc: entry.pc,
                    },
                    ClearReason::Deopt => TraceEvent::PerformedDueToDeopt {
                        fp: entry.fp,
                        pc: entry.pc,
                    },
                });
            }
        }

        if retained.len() == current.len() {
            return;
        }
        self.publish(retained, &guard);
    }

    /// Like `clear_pending_deopts_below`, but also drops an entry sitting
    /// exactly at `fp`. Adjacent frame pointers differ by at least one
    /// word, so the boundary is nudged one word up.
    pub fn clear_pending_deopts_at_or_below(&self, fp: Addr, reason: ClearReason) {
        self.clear_pending_deopts_below(fp.word_above(), reason);
    }

    /// Number of entries in the currently published snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        // SAFETY: non-null by construction, pinned for the read.
        unsafe { self.current.load(Acquire, &guard).deref() }.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, entries: Vec<PendingDeopt>, guard: &epoch::Guard) {
        let next = Owned::new(Snapshot::from_entries(entries.into_boxed_slice()));
        let old = self.current.swap(next, Release, guard);
        // SAFETY: `old` was just unlinked and the registry is the only
        // publisher; the epoch collector frees it after every reader pinned
        // at swap time has unpinned.
        unsafe { guard.defer_destroy(old) };
    }

    fn begin_mutation(&self) -> MutationGuard<'_> {
        if cfg!(debug_assertions) {
            assert!(
                !self.mutating.swap(true, Acquire),
                "pending deopt table mutated from two contexts at once"
            );
        }
        MutationGuard { flag: &self.mutating }
    }
}

impl Drop for PendingDeopts {
    fn drop(&mut self) {
        // Registry teardown happens at thread teardown, after any reader of
        // this thread's table is gone.
        let snapshot = std::mem::replace(&mut self.current, Atomic::null());
        // SAFETY: sole owner of the final snapshot, no readers remain.
        unsafe {
            drop(snapshot.into_owned());
        }
    }
}

struct MutationGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Release);
    }
}
