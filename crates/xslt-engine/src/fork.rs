//! `xsl:fork`'s branch executor: each branch is captured independently (its
//! own buffered event log) and then replayed into the real output sink in
//! declaration order, so branches never interleave regardless of how they're
//! actually run underneath.
//!
//! The seam is an [`Executor`] trait rather than a single free function so a
//! host embedding this engine can swap in a concurrent strategy. The only
//! one shipped as default, [`SyncExecutor`], runs branches one after another;
//! [`RayonExecutor`] (behind the `rayon` feature) exists as a faithful stand-in
//! for the same seam but does not itself run branches across threads — see
//! its doc comment for why.

use crate::context::TransformContext;
use crate::error::EngineError;
use crate::instruction::{execute_body, Instruction};
use crate::output::OutputEvent;
use crate::rtf::RtfSink;
use crate::signals::Signal;

/// Runs a set of `xsl:fork` branches and returns each branch's captured event
/// log, in the same order the branches were declared.
pub trait Executor {
    fn run_branches<'a, 'doc>(
        &self,
        branches: &[Vec<Instruction<'doc>>],
        ctx: &TransformContext<'a, 'doc>,
    ) -> Result<Vec<Vec<OutputEvent>>, EngineError>;
}

fn run_one_branch<'a, 'doc>(
    branch: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
) -> Result<Vec<OutputEvent>, EngineError> {
    let mut sink = RtfSink::new();
    let signal = execute_body(branch, ctx, &mut sink)?;
    if !signal.is_normal() {
        return Err(EngineError::SignalEscaped(
            "xsl:break/xsl:next-iteration used outside of xsl:iterate",
        ));
    }
    Ok(sink.into_fragment("").events().to_vec())
}

/// Runs each branch to completion, one at a time, before moving to the next.
/// The default and only executor this crate wires up by itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncExecutor;

impl Executor for SyncExecutor {
    fn run_branches<'a, 'doc>(
        &self,
        branches: &[Vec<Instruction<'doc>>],
        ctx: &TransformContext<'a, 'doc>,
    ) -> Result<Vec<Vec<OutputEvent>>, EngineError> {
        branches.iter().map(|branch| run_one_branch(branch, ctx)).collect()
    }
}

/// A placeholder second [`Executor`] for the `rayon` feature. `TransformContext`
/// shares state through `Rc` (variable scopes, tunnel parameters, captured
/// values) by design, the same structural-sharing trick that makes forking a
/// context for a loop iteration cheap — but `Rc` is neither `Send` nor `Sync`,
/// so branches genuinely cannot be handed to `rayon`'s thread pool without
/// first rebuilding the context on an `Arc`-shared footing. That's a bigger
/// change than this executor seam should force on the rest of the crate, so
/// `RayonExecutor` runs branches sequentially exactly like `SyncExecutor` and
/// exists only so a caller who has opted into the `rayon` feature can swap
/// executors without a type change later, once an `Arc`-based context lands.
#[cfg(feature = "rayon")]
#[derive(Debug, Default, Clone, Copy)]
pub struct RayonExecutor;

#[cfg(feature = "rayon")]
impl Executor for RayonExecutor {
    fn run_branches<'a, 'doc>(
        &self,
        branches: &[Vec<Instruction<'doc>>],
        ctx: &TransformContext<'a, 'doc>,
    ) -> Result<Vec<Vec<OutputEvent>>, EngineError> {
        log::debug!(
            target: "xslt_engine::fork",
            "rayon feature enabled ({} threads available) but xsl:fork still runs sequentially: \
             branch contexts are Rc-shared, not Send",
            rayon::current_num_threads()
        );
        SyncExecutor.run_branches(branches, ctx)
    }
}

/// Run `xsl:fork`'s branches with the default executor and replay their
/// captured events into `out` in order.
pub fn execute_fork<'a, 'doc>(
    branches: &[Vec<Instruction<'doc>>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn crate::output::OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let captured = SyncExecutor.run_branches(branches, ctx)?;
    for events in captured {
        crate::rtf::ResultTreeFragment::new(events, "").replay_into(out)?;
    }
    Ok(Signal::Normal)
}
