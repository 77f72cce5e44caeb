use parking_lot::Mutex;

use crate::Addr;

/// A diagnostic event emitted by the registry. Tracing never affects which
/// entries are kept or dropped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An entry was dropped because the stack unwound past it on a throw.
    SkippedDueToThrow { fp: Addr, pc: Addr },
    /// An entry was dropped because its deoptimization was performed.
    PerformedDueToDeopt { fp: Addr, pc: Addr },
    /// An exception dispatch was redirected into the lazy-deopt stub.
    RedirectedFromThrow { fp: Addr },
}

/// Where the registry sends its diagnostics. Passed in at construction so
/// the registry carries no ambient tracing state of its own.
pub trait DeoptTracer: Send + Sync {
    fn trace(&self, event: TraceEvent);
}

/// Discards every event. The default when no tracer is configured.
#[derive(Debug, Default)]
pub struct NullTracer;

impl DeoptTracer for NullTracer {
    fn trace(&self, _event: TraceEvent) {}
}

/// Forwards events to the `log` facade at trace level.
#[derive(Debug, Default)]
pub struct LogTracer;

impl DeoptTracer for LogTracer {
    fn trace(&self, event: TraceEvent) {
        match event {
            TraceEvent::SkippedDueToThrow { fp, pc } => {
                log::trace!("lazy deopt skipped due to throw fp={fp} pc={pc}");
            }
            TraceEvent::PerformedDueToDeopt { fp, pc } => {
                log::trace!("lazy deopt fp={fp} pc={pc}");
            }
            TraceEvent::RedirectedFromThrow { fp } => {
                log::trace!("throwing to frame scheduled for lazy deopt fp={fp}");
            }
        }
    }
}

/// Collects events in memory, handy for tests and the demo summary.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl DeoptTracer for RecordingTracer {
    fn trace(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_tracer_keeps_events_in_order() {
        let tracer = RecordingTracer::new();
        tracer.trace(TraceEvent::RedirectedFromThrow { fp: Addr(0x10) });
        tracer.trace(TraceEvent::PerformedDueToDeopt { fp: Addr(0x20), pc: Addr(0x200) });

        assert_eq!(
            tracer.events(),
            vec![
                TraceEvent::RedirectedFromThrow { fp: Addr(0x10) },
                TraceEvent::PerformedDueToDeopt { fp: Addr(0x20), pc: Addr(0x200) },
            ]
        );

        tracer.clear();
        assert!(tracer.events().is_empty());
    }
}
