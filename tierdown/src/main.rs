use std::{sync::Arc, time::Duration};

use clap::Parser;
use tierdown::{
    Addr, ClearReason, DeoptTracer, FrameCodeFlags, LogTracer, PendingDeopts,
    PendingDeoptsCreateInfo, Sampler, SamplerCreateInfo, StubEntries,
};

/// Exercises the pending-deopt table against a live sampling reader:
/// a mutator registers and retires entries while a sampler thread scans
/// the published snapshots.
#[derive(Parser)]
struct Args {
    /// Simultaneously pending frames per round.
    #[arg(long, default_value_t = 4)]
    frames: usize,
    /// Register/clear rounds to run.
    #[arg(long, default_value_t = 10_000)]
    rounds: u64,
    /// Emit per-entry trace diagnostics (needs RUST_LOG=trace).
    #[arg(long)]
    trace: bool,
}

// The demo has no real code objects; every synthetic frame claims to run
// optimized, non-force-optimized code.
struct DemoCode;

impl FrameCodeFlags for DemoCode {
    fn is_optimized(&self, _fp: Addr) -> bool {
        true
    }
    fn is_force_optimized(&self, _fp: Addr) -> bool {
        false
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let stubs = StubEntries {
        async_exception_handler: Addr(0xfee0_0000),
        deoptimize_lazy_from_throw: Addr(0xfee0_1000),
    };

    let registry = Arc::new(PendingDeopts::new(PendingDeoptsCreateInfo {
        tracer: args.trace.then(|| Arc::new(LogTracer) as Arc<dyn DeoptTracer>),
    }));

    let probes: Vec<Addr> = (1..=args.frames).map(|i| Addr(0x1000 * i)).collect();
    let sampler = Sampler::start(
        registry.clone(),
        SamplerCreateInfo {
            probes: probes.clone(),
            interval: Duration::ZERO,
        },
    );

    let mut redirects = 0u64;
    for round in 0..args.rounds {
        for &fp in &probes {
            registry
                .add_pending_deopt(fp, Addr(fp.0 + 0x40))
                .unwrap_or_else(|err| panic!("round {round}: {err}"));
        }

        // A throw lands on the middle frame; dispatch must steer it into
        // the lazy-deopt trampoline rather than its optimized pc.
        let victim = probes[probes.len() / 2];
        let remapped =
            registry.remap_exception_pc_for_deopt(Addr(0x4242), victim, &stubs, &DemoCode);
        if remapped.pc == stubs.deoptimize_lazy_from_throw {
            redirects += 1;
        }

        registry.clear_pending_deopts_at_or_below(*probes.last().unwrap(), ClearReason::Deopt);
        assert!(registry.is_empty());
    }

    let stats = sampler.stop();
    println!(
        "rounds={} redirects={} sampler: passes={} hits={} last_pc={:?}",
        args.rounds, redirects, stats.samples, stats.hits, stats.last_pc,
    );
}
