//! Pipeline orchestration: which passes run, in what order, and the
//! explicit options record that replaces the thread-local UFCS context
//! the source used (§9).

pub mod auto_blocking;
pub mod await_hoist;
pub mod async_lowering;
pub mod block_lowering;
pub mod closure;
pub mod marker_strip;
pub mod slice_check;
pub mod ufcs;

use bitflags::bitflags;

use crate::pass_ctx::PassCtx;

bitflags! {
    /// Which of passes E..L are enabled for a run (§3 `PipelineConfig`).
    /// Mirrors the `aux2` bitfield idiom used for stub-AST payloads so the
    /// two bitflag surfaces in the crate read the same way.
    pub struct PassSet: u32 {
        const UFCS          = 0b0000_0001;
        const CLOSURE       = 0b0000_0010;
        const SLICE_CHECK   = 0b0000_0100;
        const AUTO_BLOCKING = 0b0000_1000;
        const AWAIT_HOIST   = 0b0001_0000;
        const ASYNC_LOWER   = 0b0010_0000;
        const BLOCK_LOWER   = 0b0100_0000;
        const MARKER_STRIP  = 0b1000_0000;
    }
}

impl Default for PassSet {
    fn default() -> Self {
        PassSet::all()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub enabled_passes: PassSet,
    pub verbose: bool,
    pub keep_going: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            enabled_passes: PassSet::default(),
            verbose: false,
            keep_going: false,
        }
    }
}

/// Explicit UFCS rewrite options, threaded per call rather than held as
/// thread-local/global state (§9).
#[derive(Debug, Clone, Copy, Default)]
pub struct UfcsOptions {
    pub inside_await: bool,
    pub receiver_is_pointer: bool,
}

/// Run every enabled pass over `ctx.source` in pipeline order (§2 data
/// flow), short-circuiting as soon as a pass records a fatal diagnostic.
/// Closure extraction runs twice: once up front over the user's source, and
/// once more as a line-directed pre-scan after Auto-Blocking, since that
/// pass synthesizes its own `() => { ... }` literal for the blocking-task
/// closure and nothing downstream of it recognizes arrow syntax (§2).
pub fn run_pipeline(ctx: &mut PassCtx, config: &PipelineConfig) -> anyhow::Result<()> {
    let passes: &[(PassSet, fn(&mut PassCtx) -> anyhow::Result<()>)] = &[
        (PassSet::UFCS, ufcs::run),
        (PassSet::CLOSURE, closure::run),
        (PassSet::SLICE_CHECK, slice_check::run),
        (PassSet::AUTO_BLOCKING, auto_blocking::run),
        (PassSet::CLOSURE, closure::run),
        (PassSet::AWAIT_HOIST, await_hoist::run),
        (PassSet::ASYNC_LOWER, async_lowering::run),
        (PassSet::BLOCK_LOWER, block_lowering::run),
        (PassSet::MARKER_STRIP, marker_strip::run),
    ];

    for (flag, pass) in passes {
        if !config.enabled_passes.contains(*flag) {
            continue;
        }
        log::trace!("running pass {:?}", flag);
        pass(ctx)?;
        if ctx.has_fatal_diagnostics() && !config.keep_going {
            log::debug!("aborting pipeline after fatal diagnostic");
            break;
        }
    }
    Ok(())
}
