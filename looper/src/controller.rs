//! The loop controller: drives the iteration state machine.
//!
//! One controller run owns one loop record. Iterations run strictly
//! sequentially; at most one agent child process is active at any time, and
//! iteration N+1 never starts before iteration N's state has been durably
//! persisted. Interrupt and checkpoint handling are the only places the
//! sequence can stop early.

use std::fs;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::detect::promise_detected;
use crate::core::types::{CheckpointMode, IterationRecord, LastResult, LoopStatus};
use crate::interrupt::Interrupt;
use crate::io::agent::{AgentInvoker, TurnRequest};
use crate::io::checkpoint::sentinel_present;
use crate::io::loop_store::{LoopState, now_rfc3339, write_loop_state, write_summary};
use crate::io::paths::{LooperPaths, display_relative};
use crate::io::prompt::{PromptContext, render_followup, render_kickoff};

/// Interactive go-ahead for checkpoint pauses.
///
/// This is the only suspension point besides waiting on the child process;
/// it blocks until a human answers and has no timeout.
pub trait ContinuePrompt {
    fn confirm_continue(&mut self, loop_id: &str, iteration: u32) -> Result<bool>;
}

/// Terminal implementation reading one line from stdin.
///
/// A non-interactive stdin (or EOF) declines, leaving the loop paused.
pub struct TerminalPrompt;

impl ContinuePrompt for TerminalPrompt {
    fn confirm_continue(&mut self, loop_id: &str, iteration: u32) -> Result<bool> {
        if !std::io::stdin().is_terminal() {
            return Ok(false);
        }
        let mut stdout = std::io::stdout();
        write!(
            stdout,
            "checkpoint reached for loop {loop_id} after iteration {iteration}; continue? [y/N] "
        )
        .context("write confirmation prompt")?;
        stdout.flush().context("flush confirmation prompt")?;

        let mut answer = String::new();
        let bytes = std::io::stdin()
            .read_line(&mut answer)
            .context("read confirmation answer")?;
        if bytes == 0 {
            return Ok(false);
        }
        let answer = answer.trim().to_ascii_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

/// Summary of one controller run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub loop_id: String,
    pub started_at_iteration: u32,
    pub iterations_run: u32,
    pub status: LoopStatus,
}

/// Drive `state` until a terminal or paused status is reached.
///
/// The record is persisted (atomic rewrite plus summary refresh) after every
/// transition, so an external process can inspect or resume it at any time.
#[instrument(skip_all, fields(loop_id = %state.loop_id))]
pub fn run_controller<A: AgentInvoker, P: ContinuePrompt>(
    paths: &LooperPaths,
    state: &mut LoopState,
    capture_events: bool,
    invoker: &A,
    confirm: &mut P,
    interrupt: &Interrupt,
) -> Result<LoopOutcome> {
    let started_at_iteration = state.iteration;
    let mut iterations_run = 0u32;

    state.status = LoopStatus::Running;
    persist(paths, state)?;

    loop {
        if interrupt.is_requested() {
            info!("interrupt pending, no new iteration starts");
            return transition(
                paths,
                state,
                LoopStatus::PausedUserInterrupt,
                started_at_iteration,
                iterations_run,
            );
        }
        if state.iteration >= state.max_iterations {
            return transition(
                paths,
                state,
                LoopStatus::StoppedMaxIterations,
                started_at_iteration,
                iterations_run,
            );
        }

        let iteration = state.iteration + 1;
        let last_message_path = paths.last_message_path(&state.loop_id, iteration);
        let events_path = capture_events.then(|| paths.events_path(&state.loop_id, iteration));

        let prompt_ctx = PromptContext {
            loop_id: &state.loop_id,
            iteration,
            max_iterations: state.max_iterations,
            task: &state.prompt,
            promise: &state.completion_promise,
            mode: state.promise_mode,
            checkpoint: state.checkpoint.as_ref(),
        };
        let prompt_text = if state.session.is_empty() || state.same_prompt_each_iteration {
            render_kickoff(&prompt_ctx)?
        } else {
            render_followup(&prompt_ctx)?
        };

        info!(iteration, max_iterations = state.max_iterations, "starting iteration");
        let request = TurnRequest {
            workdir: paths.root.clone(),
            prompt: Some(prompt_text),
            session: (!state.session.is_empty()).then(|| state.session.clone()),
            last_message_path: last_message_path.clone(),
            events_path: events_path.clone(),
        };

        let outcome = match invoker.run_turn(&request, interrupt) {
            Ok(outcome) => outcome,
            Err(err) => {
                // Spawn failure: the child never produced a close event.
                // Terminal, not retried.
                warn!(err = %err, "agent could not be started");
                return transition(
                    paths,
                    state,
                    LoopStatus::ErrorSpawn,
                    started_at_iteration,
                    iterations_run,
                );
            }
        };

        if outcome.interrupted || interrupt.is_requested() {
            // The close was forced by cancellation; it wins over whatever the
            // iteration would otherwise have decided. Record the attempt so
            // artifacts stay accounted for, then pause.
            record_iteration(
                paths,
                state,
                iteration,
                &outcome.session,
                outcome.exit_code,
                &last_message_path,
                events_path.as_deref(),
            )?;
            iterations_run += 1;
            return transition(
                paths,
                state,
                LoopStatus::PausedUserInterrupt,
                started_at_iteration,
                iterations_run,
            );
        }

        if outcome.session.is_empty() {
            // Continuing without a stable session reference would silently
            // lose conversation continuity. Terminal, not retried.
            warn!("no session identifier could be resolved from agent output");
            return transition(
                paths,
                state,
                LoopStatus::ErrorNoSession,
                started_at_iteration,
                iterations_run,
            );
        }

        let detected = record_iteration(
            paths,
            state,
            iteration,
            &outcome.session,
            outcome.exit_code,
            &last_message_path,
            events_path.as_deref(),
        )?;
        iterations_run += 1;

        // Completion is evaluated strictly before the checkpoint scan: a
        // message satisfying both completes the loop.
        if detected {
            info!(iteration, "completion promise detected");
            return transition(
                paths,
                state,
                LoopStatus::Completed,
                started_at_iteration,
                iterations_run,
            );
        }

        if let Some(checkpoint) = state.checkpoint.clone() {
            let file = resolve_checkpoint_path(&paths.root, &checkpoint.file);
            if sentinel_present(&file, &checkpoint.token)? {
                info!(file = %file.display(), "checkpoint sentinel found");
                set_checkpoint_paused(state, true);
                state.status = LoopStatus::PausedHardStop;
                persist(paths, state)?;

                match checkpoint.mode {
                    CheckpointMode::Exit => {
                        return Ok(LoopOutcome {
                            loop_id: state.loop_id.clone(),
                            started_at_iteration,
                            iterations_run,
                            status: LoopStatus::PausedHardStop,
                        });
                    }
                    CheckpointMode::Pause => {
                        if confirm.confirm_continue(&state.loop_id, state.iteration)? {
                            set_checkpoint_paused(state, false);
                            state.status = LoopStatus::Running;
                            persist(paths, state)?;
                            continue;
                        }
                        return Ok(LoopOutcome {
                            loop_id: state.loop_id.clone(),
                            started_at_iteration,
                            iterations_run,
                            status: LoopStatus::PausedHardStop,
                        });
                    }
                }
            }
        }
    }
}

/// Apply the per-iteration bookkeeping (steps 5-7 of the iteration
/// algorithm): session, iteration counter, exit code, completion detection,
/// history append, persist, summary refresh. Returns the detection flag.
fn record_iteration(
    paths: &LooperPaths,
    state: &mut LoopState,
    iteration: u32,
    session: &str,
    exit_code: Option<i32>,
    last_message_path: &Path,
    events_path: Option<&Path>,
) -> Result<bool> {
    if !session.is_empty() {
        state.session = session.to_string();
    }
    state.iteration = iteration;
    state.status = LoopStatus::Running;

    // Absent final-message artifact is empty text, never an error.
    let message = fs::read_to_string(last_message_path).ok().unwrap_or_default();
    let detected = promise_detected(&message, state.promise_mode, &state.completion_promise);

    state.last_result = Some(LastResult {
        exit_code,
        promise_detected: detected,
    });
    state.history.push(IterationRecord {
        iteration,
        finished_at: now_rfc3339(),
        exit_code,
        promise_detected: detected,
        last_message_path: display_relative(&paths.root, last_message_path),
        events_path: events_path.map(|p| display_relative(&paths.root, p)),
    });
    persist(paths, state)?;
    Ok(detected)
}

fn transition(
    paths: &LooperPaths,
    state: &mut LoopState,
    status: LoopStatus,
    started_at_iteration: u32,
    iterations_run: u32,
) -> Result<LoopOutcome> {
    state.status = status;
    persist(paths, state)?;
    Ok(LoopOutcome {
        loop_id: state.loop_id.clone(),
        started_at_iteration,
        iterations_run,
        status,
    })
}

fn persist(paths: &LooperPaths, state: &mut LoopState) -> Result<()> {
    write_loop_state(&paths.loop_path(&state.loop_id), state)?;
    write_summary(paths)
}

fn set_checkpoint_paused(state: &mut LoopState, paused: bool) {
    if let Some(checkpoint) = state.checkpoint.as_mut() {
        checkpoint.paused = paused;
    }
}

fn resolve_checkpoint_path(root: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
