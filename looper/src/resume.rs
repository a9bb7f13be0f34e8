//! Orchestration for resuming a stored loop.
//!
//! A resume reopens an existing state record: overridable fields are
//! applied, the transient checkpoint pause flag is cleared, and iteration
//! numbering plus the stored session identifier carry over unchanged.

use anyhow::Result;
use tracing::info;

use crate::controller::{ContinuePrompt, LoopOutcome, run_controller};
use crate::core::types::PromiseMode;
use crate::interrupt::Interrupt;
use crate::io::agent::AgentInvoker;
use crate::io::loop_store::{LoopState, load_loop_state};
use crate::io::paths::LooperPaths;

/// Fields a resume may override; everything else on the record is kept.
#[derive(Debug, Clone, Default)]
pub struct ResumeOverrides {
    pub max_iterations: Option<u32>,
    pub completion_promise: Option<String>,
    pub promise_mode: Option<PromiseMode>,
    pub same_prompt_each_iteration: Option<bool>,
}

/// Apply resume-time overrides to a stored record.
pub fn apply_overrides(state: &mut LoopState, overrides: &ResumeOverrides) {
    if let Some(max_iterations) = overrides.max_iterations {
        state.max_iterations = max_iterations;
    }
    if let Some(promise) = overrides.completion_promise.as_ref() {
        state.completion_promise = promise.clone();
    }
    if let Some(mode) = overrides.promise_mode {
        state.promise_mode = mode;
    }
    if let Some(same) = overrides.same_prompt_each_iteration {
        state.same_prompt_each_iteration = same;
    }
    if let Some(checkpoint) = state.checkpoint.as_mut() {
        checkpoint.paused = false;
    }
}

/// Reopen the stored record for `loop_id` and drive it.
pub fn resume_loop<A: AgentInvoker, P: ContinuePrompt>(
    paths: &LooperPaths,
    loop_id: &str,
    overrides: &ResumeOverrides,
    capture_events: bool,
    invoker: &A,
    confirm: &mut P,
    interrupt: &Interrupt,
) -> Result<LoopOutcome> {
    let mut state = load_loop_state(&paths.loop_path(loop_id))?;
    apply_overrides(&mut state, overrides);
    info!(
        loop_id = %loop_id,
        iteration = state.iteration,
        max_iterations = state.max_iterations,
        "resuming loop"
    );

    run_controller(paths, &mut state, capture_events, invoker, confirm, interrupt)
}
