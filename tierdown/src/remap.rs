use crate::{Addr, PendingDeopts, TraceEvent};

/// Fixed stub entry points, resolved once at VM startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StubEntries {
    /// VM-internal forwarding stub for asynchronous exceptions. It never
    /// resumes execution in the frame it runs in.
    pub async_exception_handler: Addr,
    /// Trampoline that deoptimizes a frame lazily while a throw is in
    /// flight, then continues exception propagation.
    pub deoptimize_lazy_from_throw: Addr,
}

/// Optimization flags of the code a frame is executing. Supplied by the
/// embedding VM so this crate carries no code-object representation; only
/// consulted by debug assertions.
pub trait FrameCodeFlags {
    fn is_optimized(&self, fp: Addr) -> bool;
    fn is_force_optimized(&self, fp: Addr) -> bool;
}

/// Outcome of remapping one candidate handler frame during exception
/// dispatch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RemappedPc {
    /// Where dispatch should continue: the original pc, or the lazy-deopt
    /// trampoline.
    pub pc: Addr,
    /// The caller should drop any pending entry for this frame; it will
    /// never be returned into in a way that needs redirecting.
    pub clear_pending: bool,
}

impl PendingDeopts {
    /// Decides whether exception dispatch at (`pc`, `fp`) must be steered
    /// into the lazy-deopt trampoline instead of the handler.
    ///
    /// A frame scheduled for lazy deopt must not resume at its optimized
    /// pc while being torn down by a throw; the deopt machinery rebuilds
    /// unoptimized state first. The async exception handler stub is exempt:
    /// it does not belong to function code and leaves the frame either way.
    pub fn remap_exception_pc_for_deopt(
        &self,
        pc: Addr,
        fp: Addr,
        stubs: &StubEntries,
        code: &dyn FrameCodeFlags,
    ) -> RemappedPc {
        if pc == stubs.async_exception_handler {
            return RemappedPc { pc, clear_pending: true };
        }

        if self.find_pending_deopt_record(fp).is_some() {
            // Force-optimized code is exempt from lazy deopt and must never
            // have a pending entry.
            debug_assert!(
                code.is_optimized(fp) && !code.is_force_optimized(fp),
                "pending deopt for a frame whose code is not lazily deoptimizable"
            );
            self.tracer.trace(TraceEvent::RedirectedFromThrow { fp });
            return RemappedPc {
                pc: stubs.deoptimize_lazy_from_throw,
                clear_pending: false,
            };
        }

        RemappedPc { pc, clear_pending: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PendingDeoptsCreateInfo, RecordingTracer};
    use std::sync::Arc;

    const STUBS: StubEntries = StubEntries {
        async_exception_handler: Addr(0xa000),
        deoptimize_lazy_from_throw: Addr(0xb000),
    };

    struct OptimizedEverywhere;

    impl FrameCodeFlags for OptimizedEverywhere {
        fn is_optimized(&self, _fp: Addr) -> bool {
            true
        }
        fn is_force_optimized(&self, _fp: Addr) -> bool {
            false
        }
    }

    fn registry() -> PendingDeopts {
        PendingDeopts::new(PendingDeoptsCreateInfo::default())
    }

    #[test]
    fn async_handler_short_circuits_regardless_of_registry() {
        let table = registry();
        table.add_pending_deopt(Addr(0x10), Addr(0x100)).unwrap();

        let result = table.remap_exception_pc_for_deopt(
            STUBS.async_exception_handler,
            Addr(0x10),
            &STUBS,
            &OptimizedEverywhere,
        );

        assert_eq!(
            result,
            RemappedPc {
                pc: STUBS.async_exception_handler,
                clear_pending: true,
            }
        );
    }

    #[test]
    fn pending_frame_is_redirected_to_the_throw_deopt_stub() {
        let table = registry();
        table.add_pending_deopt(Addr(0x10), Addr(0x100)).unwrap();

        let result = table.remap_exception_pc_for_deopt(
            Addr(0x5555),
            Addr(0x10),
            &STUBS,
            &OptimizedEverywhere,
        );

        assert_eq!(
            result,
            RemappedPc {
                pc: STUBS.deoptimize_lazy_from_throw,
                clear_pending: false,
            }
        );
    }

    #[test]
    fn non_pending_frame_passes_through_unchanged() {
        let table = registry();

        let result = table.remap_exception_pc_for_deopt(
            Addr(0x5555),
            Addr(0x10),
            &STUBS,
            &OptimizedEverywhere,
        );

        assert_eq!(result, RemappedPc { pc: Addr(0x5555), clear_pending: false });
    }

    #[test]
    fn redirect_is_traced() {
        let tracer = Arc::new(RecordingTracer::new());
        let table = PendingDeopts::new(PendingDeoptsCreateInfo {
            tracer: Some(tracer.clone()),
        });
        table.add_pending_deopt(Addr(0x10), Addr(0x100)).unwrap();

        table.remap_exception_pc_for_deopt(
            Addr(0x5555),
            Addr(0x10),
            &STUBS,
            &OptimizedEverywhere,
        );
        table.remap_exception_pc_for_deopt(
            Addr(0x5555),
            Addr(0x20),
            &STUBS,
            &OptimizedEverywhere,
        );

        assert_eq!(
            tracer.events(),
            vec![crate::TraceEvent::RedirectedFromThrow { fp: Addr(0x10) }]
        );
    }

    #[test]
    #[should_panic(expected = "not lazily deoptimizable")]
    #[cfg(debug_assertions)]
    fn force_optimized_code_with_pending_entry_is_a_bug() {
        struct ForceOptimized;
        impl FrameCodeFlags for ForceOptimized {
            fn is_optimized(&self, _fp: Addr) -> bool {
                true
            }
            fn is_force_optimized(&self, _fp: Addr) -> bool {
                true
            }
        }

        let table = registry();
        table.add_pending_deopt(Addr(0x10), Addr(0x100)).unwrap();
        table.remap_exception_pc_for_deopt(Addr(0x5555), Addr(0x10), &STUBS, &ForceOptimized);
    }
}
