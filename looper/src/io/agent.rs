//! Agent invocation: one child process per agent turn.
//!
//! The [`AgentInvoker`] trait decouples the loop controller from the actual
//! agent backend (a `codex`-style CLI). Tests use scripted invokers that
//! return predetermined outcomes without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::session::resolve_session_id;
use crate::interrupt::Interrupt;

use super::config::{AgentConfig, LooperConfig};
use super::process::{StreamParams, run_streaming};

/// Parameters for one agent turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Workspace the agent works in (passed as `--cd`).
    pub workdir: PathBuf,
    /// Prompt text; `None` continues a session with no new instruction.
    pub prompt: Option<String>,
    /// Existing session id. `None` means a fresh, full-context turn;
    /// `Some` means a resume turn continuing that conversation.
    pub session: Option<String>,
    /// Where the agent must write its final message.
    pub last_message_path: PathBuf,
    /// When set, the success stream is captured verbatim to this path.
    pub events_path: Option<PathBuf>,
}

/// Outcome of one agent turn that reached a close event.
///
/// A nonzero (or absent) exit code is a normal outcome here; only a child
/// that could not start or errored before closing propagates as an error.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Child exit code; `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    /// Best-effort session id: structured events, then free-text UUID, then
    /// the id that was passed in. Empty when all strategies failed.
    pub session: String,
    pub stdout: String,
    pub stderr: String,
    /// True when the close was forced by a cancellation request.
    pub interrupted: bool,
}

/// Abstraction over agent execution backends.
pub trait AgentInvoker {
    fn run_turn(&self, request: &TurnRequest, interrupt: &Interrupt) -> Result<TurnOutcome>;
}

/// Agent invocation options resolved from config and CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOptions {
    /// Agent executable, invoked as `<command> exec ...`.
    pub command: String,
    pub model: Option<String>,
    pub profile: Option<String>,
    pub sandbox: Option<String>,
    pub ask_for_approval: Option<String>,
    pub full_auto: bool,
    pub skip_git_repo_check: bool,
    /// Extra flags appended verbatim.
    pub extra_args: Vec<String>,
}

impl AgentOptions {
    pub fn from_config(agent: &AgentConfig) -> Self {
        Self {
            command: agent.command.clone(),
            model: agent.model.clone(),
            profile: agent.profile.clone(),
            sandbox: agent.sandbox.clone(),
            ask_for_approval: agent.ask_for_approval.clone(),
            full_auto: agent.full_auto,
            skip_git_repo_check: agent.skip_git_repo_check,
            extra_args: Vec::new(),
        }
    }
}

/// Invoker that spawns the configured agent CLI.
pub struct CliAgentInvoker {
    options: AgentOptions,
    output_limit_bytes: usize,
    poll_interval: Duration,
}

impl CliAgentInvoker {
    pub fn new(options: AgentOptions, config: &LooperConfig) -> Self {
        Self {
            options,
            output_limit_bytes: config.output_limit_bytes,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

impl AgentInvoker for CliAgentInvoker {
    #[instrument(skip_all, fields(resume = request.session.is_some()))]
    fn run_turn(&self, request: &TurnRequest, interrupt: &Interrupt) -> Result<TurnOutcome> {
        if let Some(parent) = request.last_message_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create iteration dir {}", parent.display()))?;
        }

        let args = build_exec_args(request, &self.options);
        info!(command = %self.options.command, workdir = %request.workdir.display(), "starting agent turn");
        let mut cmd = Command::new(&self.options.command);
        cmd.args(&args);

        let output = run_streaming(
            cmd,
            &StreamParams {
                output_limit_bytes: self.output_limit_bytes,
                poll_interval: self.poll_interval,
                events_path: request.events_path.clone(),
            },
            interrupt,
        )?;

        let combined = output.combined_text();
        let session = resolve_session_id(&combined, request.session.as_deref()).unwrap_or_default();
        debug!(exit_code = ?output.status.code(), session = %session, "agent turn finished");

        Ok(TurnOutcome {
            exit_code: output.status.code(),
            session,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            interrupted: output.interrupted,
        })
    }
}

/// Build the `exec` argument vector for one turn.
///
/// Exactly one of the fresh (`exec <prompt>`) or resume
/// (`exec resume <session-id> [<prompt>]`) framings is used per call.
pub fn build_exec_args(request: &TurnRequest, options: &AgentOptions) -> Vec<String> {
    let mut args = vec!["exec".to_string()];

    if let Some(session) = request.session.as_deref().filter(|s| !s.is_empty()) {
        args.push("resume".to_string());
        args.push(session.to_string());
    }
    if let Some(prompt) = request.prompt.as_deref() {
        args.push(prompt.to_string());
    }

    args.push("--output-last-message".to_string());
    args.push(request.last_message_path.display().to_string());
    args.push("--json".to_string());
    args.push("--cd".to_string());
    args.push(request.workdir.display().to_string());

    if let Some(model) = options.model.as_deref() {
        args.push("--model".to_string());
        args.push(model.to_string());
    }
    if let Some(profile) = options.profile.as_deref() {
        args.push("--profile".to_string());
        args.push(profile.to_string());
    }
    if let Some(sandbox) = options.sandbox.as_deref() {
        args.push("--sandbox".to_string());
        args.push(sandbox.to_string());
    }
    if let Some(policy) = options.ask_for_approval.as_deref() {
        args.push("--ask-for-approval".to_string());
        args.push(policy.to_string());
    }
    if options.full_auto {
        args.push("--full-auto".to_string());
    }
    if options.skip_git_repo_check {
        args.push("--skip-git-repo-check".to_string());
    }
    args.extend(options.extra_args.iter().cloned());

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(session: Option<&str>, prompt: Option<&str>) -> TurnRequest {
        TurnRequest {
            workdir: PathBuf::from("/ws"),
            prompt: prompt.map(str::to_string),
            session: session.map(str::to_string),
            last_message_path: PathBuf::from("/ws/.looper/iterations/l/1/last_message.txt"),
            events_path: None,
        }
    }

    fn options() -> AgentOptions {
        AgentOptions::from_config(&AgentConfig::default())
    }

    #[test]
    fn fresh_turn_carries_the_prompt_without_resume() {
        let args = build_exec_args(&request(None, Some("do the task")), &options());
        assert_eq!(args[0], "exec");
        assert_eq!(args[1], "do the task");
        assert!(!args.contains(&"resume".to_string()));
        assert!(args.contains(&"--output-last-message".to_string()));
        assert!(args.contains(&"--json".to_string()));
    }

    #[test]
    fn resume_turn_reuses_the_session_id() {
        let args = build_exec_args(&request(Some("sess-1"), Some("continue")), &options());
        assert_eq!(&args[..4], ["exec", "resume", "sess-1", "continue"]);
    }

    #[test]
    fn empty_session_is_treated_as_fresh() {
        let args = build_exec_args(&request(Some(""), Some("task")), &options());
        assert_eq!(&args[..2], ["exec", "task"]);
    }

    #[test]
    fn option_flags_pass_through() {
        let mut opts = options();
        opts.model = Some("gpt-5-codex".to_string());
        opts.sandbox = Some("workspace-write".to_string());
        opts.ask_for_approval = Some("never".to_string());
        opts.full_auto = true;
        opts.skip_git_repo_check = true;
        opts.extra_args = vec!["--color".to_string(), "never".to_string()];

        let args = build_exec_args(&request(None, Some("task")), &opts);
        let joined = args.join(" ");
        assert!(joined.contains("--model gpt-5-codex"));
        assert!(joined.contains("--sandbox workspace-write"));
        assert!(joined.contains("--ask-for-approval never"));
        assert!(joined.contains("--full-auto"));
        assert!(joined.contains("--skip-git-repo-check"));
        assert!(joined.ends_with("--color never"));
    }

    #[test]
    fn cd_points_at_the_workdir() {
        let args = build_exec_args(&request(None, Some("task")), &options());
        let cd = args.iter().position(|a| a == "--cd").expect("--cd present");
        assert_eq!(args[cd + 1], "/ws");
    }
}
