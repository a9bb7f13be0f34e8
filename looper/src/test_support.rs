//! Test-only scripted doubles and workspace helpers.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::controller::ContinuePrompt;
use crate::core::session::resolve_session_id;
use crate::core::types::{CheckpointConfig, PromiseMode};
use crate::interrupt::Interrupt;
use crate::io::agent::{AgentInvoker, TurnOutcome, TurnRequest};
use crate::io::loop_store::LoopState;
use crate::io::paths::LooperPaths;

/// One predetermined agent turn.
#[derive(Debug, Clone)]
pub struct ScriptedTurn {
    pub exit_code: Option<i32>,
    /// Combined output the session id is resolved from.
    pub output: String,
    /// Final message written to the turn's last-message path; `None` leaves
    /// the artifact absent.
    pub last_message: Option<String>,
    /// Fail as a spawn failure instead of producing a close event.
    pub fail_spawn: bool,
    /// Mark the close as forced by cancellation.
    pub interrupted: bool,
}

impl ScriptedTurn {
    /// A successful turn reporting `session` via a structured event and
    /// writing `message` as the final-message artifact.
    pub fn message(session: &str, message: &str) -> Self {
        Self {
            exit_code: Some(0),
            output: format!("{{\"type\":\"session\",\"id\":\"{session}\"}}\n"),
            last_message: Some(message.to_string()),
            fail_spawn: false,
            interrupted: false,
        }
    }

    /// A successful turn whose output carries no resolvable session id.
    pub fn no_session(message: &str) -> Self {
        Self {
            exit_code: Some(0),
            output: "plain log output without identifiers\n".to_string(),
            last_message: Some(message.to_string()),
            fail_spawn: false,
            interrupted: false,
        }
    }

    pub fn spawn_failure() -> Self {
        Self {
            exit_code: None,
            output: String::new(),
            last_message: None,
            fail_spawn: true,
            interrupted: false,
        }
    }
}

/// Agent double replaying predetermined turns and recording every request.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    turns: RefCell<VecDeque<ScriptedTurn>>,
    requests: RefCell<Vec<TurnRequest>>,
}

impl ScriptedInvoker {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: RefCell::new(turns.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.borrow().clone()
    }
}

impl AgentInvoker for ScriptedInvoker {
    fn run_turn(&self, request: &TurnRequest, _interrupt: &Interrupt) -> Result<TurnOutcome> {
        self.requests.borrow_mut().push(request.clone());
        let turn = self
            .turns
            .borrow_mut()
            .pop_front()
            .expect("scripted invoker ran out of turns");

        if turn.fail_spawn {
            return Err(anyhow!("spawn agent process: scripted failure"));
        }

        if let Some(message) = turn.last_message.as_deref() {
            if let Some(parent) = request.last_message_path.parent() {
                fs::create_dir_all(parent).expect("create iteration dir");
            }
            fs::write(&request.last_message_path, message).expect("write last message");
        }
        if let Some(events_path) = request.events_path.as_deref() {
            if let Some(parent) = events_path.parent() {
                fs::create_dir_all(parent).expect("create events dir");
            }
            fs::write(events_path, &turn.output).expect("write events");
        }

        let session =
            resolve_session_id(&turn.output, request.session.as_deref()).unwrap_or_default();
        Ok(TurnOutcome {
            exit_code: turn.exit_code,
            session,
            stdout: turn.output,
            stderr: String::new(),
            interrupted: turn.interrupted,
        })
    }
}

/// Checkpoint confirmation double replaying predetermined answers.
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: VecDeque<bool>,
    pub asked: u32,
}

impl ScriptedConfirm {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: answers.into(),
            asked: 0,
        }
    }
}

impl ContinuePrompt for ScriptedConfirm {
    fn confirm_continue(&mut self, _loop_id: &str, _iteration: u32) -> Result<bool> {
        self.asked += 1;
        Ok(self.answers.pop_front().unwrap_or(false))
    }
}

/// Temp workspace with `.looper/` layout for controller tests.
pub struct TestWorkspace {
    _temp: TempDir,
    pub paths: LooperPaths,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("tempdir");
        let paths = LooperPaths::new(temp.path());
        fs::create_dir_all(&paths.loops_dir).expect("create loops dir");
        fs::create_dir_all(&paths.iterations_dir).expect("create iterations dir");
        Self { _temp: temp, paths }
    }

    /// A fresh loop record with deterministic defaults.
    pub fn loop_state(&self, loop_id: &str, max_iterations: u32) -> LoopState {
        LoopState::new(
            loop_id.to_string(),
            "Test task".to_string(),
            "DONE".to_string(),
            PromiseMode::Tag,
            false,
            max_iterations,
            None,
        )
    }

    /// Same as [`Self::loop_state`] with a checkpoint configured.
    pub fn loop_state_with_checkpoint(
        &self,
        loop_id: &str,
        max_iterations: u32,
        checkpoint: CheckpointConfig,
    ) -> LoopState {
        let mut state = self.loop_state(loop_id, max_iterations);
        state.checkpoint = Some(checkpoint);
        state
    }

    /// Write the checkpoint file relative to the workspace root.
    pub fn write_checkpoint_file(&self, name: &str, contents: &str) {
        fs::write(self.paths.root.join(name), contents).expect("write checkpoint file");
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
