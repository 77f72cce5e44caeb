mod addr;
mod registry;
mod remap;
mod sampler;
mod snapshot;
mod trace;

pub use addr::{Addr, WORD_SIZE};
pub use registry::{ClearReason, PendingDeoptError, PendingDeopts, PendingDeoptsCreateInfo};
pub use remap::{FrameCodeFlags, RemappedPc, StubEntries};
pub use sampler::{Sampler, SamplerCreateInfo, SamplerStats};
pub use snapshot::{PendingDeopt, Snapshot};
pub use trace::{DeoptTracer, LogTracer, NullTracer, RecordingTracer, TraceEvent};
