//! Shared deterministic types for the loop state machine.
//!
//! These types define stable contracts between core components and the
//! persisted loop record. They must not depend on external state or I/O.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a loop.
///
/// `Completed`, `StoppedMaxIterations`, `Canceled`, `ErrorSpawn` and
/// `ErrorNoSession` are terminal for a running controller: no further agent
/// invocations happen for the record unless an external resume reopens it.
/// The `Paused*` states are terminal for the current run only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Running,
    Completed,
    StoppedMaxIterations,
    PausedHardStop,
    PausedUserInterrupt,
    Canceled,
    ErrorSpawn,
    ErrorNoSession,
}

impl LoopStatus {
    /// True when a new controller run must not invoke the agent again
    /// without an explicit resume.
    pub fn is_terminal(self) -> bool {
        !matches!(self, LoopStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoopStatus::Running => "running",
            LoopStatus::Completed => "completed",
            LoopStatus::StoppedMaxIterations => "stopped_max_iterations",
            LoopStatus::PausedHardStop => "paused_hard_stop",
            LoopStatus::PausedUserInterrupt => "paused_user_interrupt",
            LoopStatus::Canceled => "canceled",
            LoopStatus::ErrorSpawn => "error_spawn",
            LoopStatus::ErrorNoSession => "error_no_session",
        }
    }
}

/// How the completion promise token is matched against the final message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PromiseMode {
    /// Literal `<promise>{token}</promise>` substring.
    Tag,
    /// Plain substring match of the token.
    Plain,
    /// The token is compiled as a regular expression.
    Regex,
}

/// What the controller does when the checkpoint sentinel is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointMode {
    /// Stop the current run and wait for an interactive go-ahead on the spot.
    Pause,
    /// Stop the current run immediately; a later `resume` reopens the loop.
    Exit,
}

/// Checkpoint ("hard stop") configuration stored on the loop record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Externally maintained plain-text file scanned for the sentinel.
    pub file: String,
    /// Literal sentinel substring.
    pub token: String,
    pub mode: CheckpointMode,
    /// Transient flag: the loop is currently paused for this checkpoint.
    #[serde(default)]
    pub paused: bool,
}

/// One completed iteration, appended to the loop history. Never mutated
/// retroactively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration number (1-indexed).
    pub iteration: u32,
    /// RFC 3339 completion timestamp.
    pub finished_at: String,
    /// Child exit code; `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    /// Whether the completion promise was detected in the final message.
    pub promise_detected: bool,
    /// Path of the captured final-message artifact.
    pub last_message_path: String,
    /// Path of the raw event-log artifact, when event capture was enabled.
    pub events_path: Option<String>,
}

/// Quick view of the most recent iteration without scanning history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastResult {
    pub exit_code: Option<i32>,
    pub promise_detected: bool,
}
