use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering::SeqCst},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{Addr, PendingDeopts};

#[derive(Debug, Clone, Default)]
pub struct SamplerStats {
    /// Completed sampling passes over the probe set.
    pub samples: u64,
    /// Probe lookups that found a pending entry.
    pub hits: u64,
    /// Resume pc of the most recently observed entry.
    pub last_pc: Option<Addr>,
}

#[derive(Debug, Clone)]
pub struct SamplerCreateInfo {
    /// Frame pointers the sampler probes on every pass.
    pub probes: Vec<Addr>,
    /// Pause between passes. Zero means spin.
    pub interval: Duration,
}

/// Stand-in for a sampling profiler: a native thread that interrupts at
/// points of its own choosing and scans another thread's pending-deopt
/// table. It only ever uses the registry's capture-once read path.
pub struct Sampler {
    stop: Arc<AtomicBool>,
    stats: Arc<Mutex<SamplerStats>>,
    handle: Option<JoinHandle<()>>,
}

impl Sampler {
    pub fn start(registry: Arc<PendingDeopts>, info: SamplerCreateInfo) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(SamplerStats::default()));

        let stop2 = stop.clone();
        let stats2 = stats.clone();
        let handle = thread::Builder::new()
            .name("deopt-sampler".to_string())
            .spawn(move || {
                while !stop2.load(SeqCst) {
                    let mut pass_hits = 0u64;
                    let mut last_pc = None;
                    for &fp in &info.probes {
                        if let Some(record) = registry.find_pending_deopt_record(fp) {
                            pass_hits += 1;
                            last_pc = Some(record.pc);
                        }
                    }

                    {
                        let mut stats = stats2.lock();
                        stats.samples += 1;
                        stats.hits += pass_hits;
                        if last_pc.is_some() {
                            stats.last_pc = last_pc;
                        }
                    }

                    if !info.interval.is_zero() {
                        thread::sleep(info.interval);
                    }
                }
            })
            .expect("spawn sampler");

        Self {
            stop,
            stats,
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn stats(&self) -> SamplerStats {
        self.stats.lock().clone()
    }

    /// Stops the sampling thread and returns its final stats.
    pub fn stop(mut self) -> SamplerStats {
        self.stop.store(true, SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.stats.lock().clone()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop.store(true, SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
