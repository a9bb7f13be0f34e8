//! Orchestration for starting a new loop.
//!
//! A "loop" is one long-lived, resumable task identified by a stable
//! `loop_id`. Starting a loop creates the state record (iteration 0, status
//! `running`), persists it, and hands it to the controller.

use anyhow::Result;
use tracing::info;

use crate::controller::{ContinuePrompt, LoopOutcome, run_controller};
use crate::core::types::{CheckpointConfig, PromiseMode};
use crate::interrupt::Interrupt;
use crate::io::agent::AgentInvoker;
use crate::io::loop_store::{LoopState, generate_loop_id, write_loop_state, write_summary};
use crate::io::paths::LooperPaths;

/// Options for `looper start`.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Original task text, immutable for the life of the loop.
    pub prompt: String,
    pub completion_promise: String,
    pub promise_mode: PromiseMode,
    pub same_prompt_each_iteration: bool,
    pub max_iterations: u32,
    pub checkpoint: Option<CheckpointConfig>,
    /// Capture the raw event stream per iteration.
    pub capture_events: bool,
}

/// Create a fresh loop record and drive it until a terminal or paused
/// status.
pub fn start_loop<A: AgentInvoker, P: ContinuePrompt>(
    paths: &LooperPaths,
    options: StartOptions,
    invoker: &A,
    confirm: &mut P,
    interrupt: &Interrupt,
) -> Result<LoopOutcome> {
    let loop_id = generate_loop_id(&paths.loops_dir)?;
    let mut state = LoopState::new(
        loop_id.clone(),
        options.prompt,
        options.completion_promise,
        options.promise_mode,
        options.same_prompt_each_iteration,
        options.max_iterations,
        options.checkpoint,
    );
    write_loop_state(&paths.loop_path(&loop_id), &mut state)?;
    write_summary(paths)?;
    info!(loop_id = %loop_id, max_iterations = state.max_iterations, "loop started");

    run_controller(
        paths,
        &mut state,
        options.capture_events,
        invoker,
        confirm,
        interrupt,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LoopStatus;
    use crate::io::loop_store::load_loop_state;
    use crate::test_support::{ScriptedConfirm, ScriptedInvoker, ScriptedTurn, TestWorkspace};

    fn options() -> StartOptions {
        StartOptions {
            prompt: "Do the thing".to_string(),
            completion_promise: "DONE".to_string(),
            promise_mode: PromiseMode::Tag,
            same_prompt_each_iteration: false,
            max_iterations: 3,
            checkpoint: None,
            capture_events: false,
        }
    }

    #[test]
    fn start_persists_a_record_and_runs_to_completion() {
        let ws = TestWorkspace::new();
        let invoker = ScriptedInvoker::new(vec![ScriptedTurn::message(
            "s1",
            "<promise>DONE</promise>",
        )]);
        let mut confirm = ScriptedConfirm::default();

        let outcome = start_loop(
            &ws.paths,
            options(),
            &invoker,
            &mut confirm,
            &Interrupt::new(),
        )
        .expect("start");

        assert_eq!(outcome.status, LoopStatus::Completed);
        assert_eq!(outcome.started_at_iteration, 0);
        assert_eq!(outcome.iterations_run, 1);

        let state = load_loop_state(&ws.paths.loop_path(&outcome.loop_id)).expect("load");
        assert_eq!(state.status, LoopStatus::Completed);
        assert_eq!(state.iteration, 1);
        assert_eq!(state.session, "s1");
        assert!(ws.paths.summary_path.is_file());
    }
}
