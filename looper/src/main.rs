//! Resumable promise-driven agent loop controller.
//!
//! Drives a `codex`-style CLI agent through repeated turns of one logical
//! session until the task's completion promise appears in the agent's final
//! message, an iteration cap is hit, or a checkpoint/interrupt pauses the
//! loop. Loop state lives under `.looper/` and every loop is resumable.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};

use looper::controller::{LoopOutcome, TerminalPrompt};
use looper::core::types::{CheckpointConfig, CheckpointMode, LoopStatus, PromiseMode};
use looper::exit_codes;
use looper::interrupt::{Interrupt, install_ctrlc};
use looper::io::agent::{AgentOptions, CliAgentInvoker};
use looper::io::config::{LooperConfig, load_config};
use looper::io::init::{DEFAULT_CHECKPOINT_TOKEN, InitOptions, init_workspace};
use looper::io::loop_store::{list_loop_states, load_loop_state, write_loop_state, write_summary};
use looper::io::paths::LooperPaths;
use looper::resume::{ResumeOverrides, resume_loop};
use looper::start::{StartOptions, start_loop};

#[derive(Parser)]
#[command(
    name = "looper",
    version,
    about = "Resumable promise-driven agent loop controller"
)]
struct Cli {
    /// Workspace root the loop operates in.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.looper/` scaffolding and the installable text files.
    Init {
        /// Overwrite existing looper-owned files.
        #[arg(short, long)]
        force: bool,
        /// Sentinel token baked into the installable files.
        #[arg(long, default_value = DEFAULT_CHECKPOINT_TOKEN)]
        checkpoint_token: String,
    },
    /// Start a new loop around the given task prompt.
    Start {
        /// Task text sent to the agent on the first (and, with
        /// --same-prompt, every) iteration.
        prompt: String,

        /// Safety cap on iterations (defaults from config).
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Completion promise token.
        #[arg(long, default_value = "DONE")]
        promise: String,

        /// How the promise token is matched against the final message.
        #[arg(long, value_enum, default_value_t = PromiseMode::Tag)]
        promise_mode: PromiseMode,

        /// Resend the full prompt every iteration instead of a short
        /// continuation.
        #[arg(long)]
        same_prompt: bool,

        /// Checkpoint file scanned for the sentinel after each iteration.
        #[arg(long, requires = "checkpoint_token")]
        checkpoint_file: Option<String>,

        /// Sentinel substring looked up in the checkpoint file.
        #[arg(long, requires = "checkpoint_file")]
        checkpoint_token: Option<String>,

        /// What to do when the sentinel is found.
        #[arg(long, value_enum, default_value_t = CheckpointMode::Exit)]
        on_checkpoint: CheckpointMode,

        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Resume a stored loop, optionally overriding its knobs.
    Resume {
        loop_id: String,

        #[arg(long)]
        max_iterations: Option<u32>,

        #[arg(long)]
        promise: Option<String>,

        #[arg(long, value_enum)]
        promise_mode: Option<PromiseMode>,

        /// Override whether the full prompt is resent every iteration.
        #[arg(long)]
        same_prompt: Option<bool>,

        #[command(flatten)]
        agent: AgentArgs,
    },
    /// List all readable loop records.
    List,
    /// Print one loop record as JSON.
    Status { loop_id: String },
    /// Mark a loop canceled.
    Cancel { loop_id: String },
}

/// Per-run agent invocation options; unset flags fall back to config.
#[derive(Debug, Args)]
struct AgentArgs {
    /// Capture the raw event stream per iteration.
    #[arg(long)]
    events: bool,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    profile: Option<String>,

    #[arg(long)]
    sandbox: Option<String>,

    #[arg(long)]
    ask_for_approval: Option<String>,

    #[arg(long)]
    full_auto: bool,

    #[arg(long)]
    skip_git_repo_check: bool,

    /// Extra flag passed to the agent verbatim (repeatable).
    #[arg(long = "agent-arg")]
    agent_args: Vec<String>,
}

impl AgentArgs {
    fn into_options(self, config: &LooperConfig) -> AgentOptions {
        let mut options = AgentOptions::from_config(&config.agent);
        if self.model.is_some() {
            options.model = self.model;
        }
        if self.profile.is_some() {
            options.profile = self.profile;
        }
        if self.sandbox.is_some() {
            options.sandbox = self.sandbox;
        }
        if self.ask_for_approval.is_some() {
            options.ask_for_approval = self.ask_for_approval;
        }
        options.full_auto |= self.full_auto;
        options.skip_git_repo_check |= self.skip_git_repo_check;
        options.extra_args = self.agent_args;
        options
    }
}

fn main() {
    looper::logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let paths = LooperPaths::new(&cli.root);
    match cli.command {
        Command::Init {
            force,
            checkpoint_token,
        } => cmd_init(&paths, force, checkpoint_token),
        Command::Start {
            prompt,
            max_iterations,
            promise,
            promise_mode,
            same_prompt,
            checkpoint_file,
            checkpoint_token,
            on_checkpoint,
            agent,
        } => {
            let checkpoint = match (checkpoint_file, checkpoint_token) {
                (Some(file), Some(token)) => Some(CheckpointConfig {
                    file,
                    token,
                    mode: on_checkpoint,
                    paused: false,
                }),
                (None, None) => None,
                // clap's `requires` enforces the pairing; guard anyway.
                _ => bail!("--checkpoint-file and --checkpoint-token must be given together"),
            };
            cmd_start(
                &paths,
                prompt,
                max_iterations,
                promise,
                promise_mode,
                same_prompt,
                checkpoint,
                agent,
            )
        }
        Command::Resume {
            loop_id,
            max_iterations,
            promise,
            promise_mode,
            same_prompt,
            agent,
        } => cmd_resume(
            &paths,
            &loop_id,
            ResumeOverrides {
                max_iterations,
                completion_promise: promise,
                promise_mode,
                same_prompt_each_iteration: same_prompt,
            },
            agent,
        ),
        Command::List => cmd_list(&paths),
        Command::Status { loop_id } => cmd_status(&paths, &loop_id),
        Command::Cancel { loop_id } => cmd_cancel(&paths, &loop_id),
    }
}

fn cmd_init(paths: &LooperPaths, force: bool, checkpoint_token: String) -> Result<i32> {
    let created = init_workspace(
        &paths.root,
        &InitOptions {
            force,
            checkpoint_token,
        },
    )?;
    println!("initialized {}", created.looper_dir.display());
    Ok(exit_codes::OK)
}

#[allow(clippy::too_many_arguments)]
fn cmd_start(
    paths: &LooperPaths,
    prompt: String,
    max_iterations: Option<u32>,
    promise: String,
    promise_mode: PromiseMode,
    same_prompt: bool,
    checkpoint: Option<CheckpointConfig>,
    agent: AgentArgs,
) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    let capture_events = agent.events;
    let invoker = CliAgentInvoker::new(agent.into_options(&config), &config);

    let interrupt = Interrupt::new();
    install_ctrlc(&interrupt)?;

    let outcome = start_loop(
        paths,
        StartOptions {
            prompt,
            completion_promise: promise,
            promise_mode,
            same_prompt_each_iteration: same_prompt,
            max_iterations: max_iterations.unwrap_or(config.max_iterations_default),
            checkpoint,
            capture_events,
        },
        &invoker,
        &mut TerminalPrompt,
        &interrupt,
    )?;
    Ok(report_outcome(&outcome))
}

fn cmd_resume(
    paths: &LooperPaths,
    loop_id: &str,
    overrides: ResumeOverrides,
    agent: AgentArgs,
) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    let capture_events = agent.events;
    let invoker = CliAgentInvoker::new(agent.into_options(&config), &config);

    let interrupt = Interrupt::new();
    install_ctrlc(&interrupt)?;

    let outcome = resume_loop(
        paths,
        loop_id,
        &overrides,
        capture_events,
        &invoker,
        &mut TerminalPrompt,
        &interrupt,
    )?;
    Ok(report_outcome(&outcome))
}

fn cmd_list(paths: &LooperPaths) -> Result<i32> {
    let states = list_loop_states(&paths.loops_dir)?;
    if states.is_empty() {
        println!("no loops");
        return Ok(exit_codes::OK);
    }
    for state in states {
        println!(
            "{}  {}  iteration {}/{}  updated {}",
            state.loop_id,
            state.status.as_str(),
            state.iteration,
            state.max_iterations,
            state.updated_at
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_status(paths: &LooperPaths, loop_id: &str) -> Result<i32> {
    let state = load_loop_state(&paths.loop_path(loop_id))?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(exit_codes::OK)
}

fn cmd_cancel(paths: &LooperPaths, loop_id: &str) -> Result<i32> {
    let mut state = load_loop_state(&paths.loop_path(loop_id))?;
    state.status = LoopStatus::Canceled;
    write_loop_state(&paths.loop_path(loop_id), &mut state)?;
    write_summary(paths)?;
    println!("loop {loop_id} canceled");
    Ok(exit_codes::OK)
}

/// Print the human-readable outcome line and map it to an exit code.
fn report_outcome(outcome: &LoopOutcome) -> i32 {
    let id = &outcome.loop_id;
    match outcome.status {
        LoopStatus::Completed => {
            println!(
                "loop {id} completed after {} iteration(s)",
                outcome.iterations_run
            );
        }
        LoopStatus::StoppedMaxIterations => {
            println!("loop {id} stopped: max iterations reached (resume with `looper resume {id} --max-iterations N`)");
        }
        LoopStatus::PausedHardStop => {
            println!("loop {id} paused: checkpoint hard stop (resume with `looper resume {id}`)");
        }
        LoopStatus::PausedUserInterrupt => {
            eprintln!("loop {id} paused: interrupted");
        }
        LoopStatus::ErrorSpawn => {
            eprintln!("loop {id} failed: agent process could not be started");
        }
        LoopStatus::ErrorNoSession => {
            eprintln!("loop {id} failed: no session identifier in agent output");
        }
        LoopStatus::Running | LoopStatus::Canceled => {
            eprintln!("loop {id} ended in unexpected status {}", outcome.status.as_str());
        }
    }
    exit_codes::for_status(outcome.status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_start_with_defaults() {
        let cli = Cli::parse_from(["looper", "start", "do the task"]);
        match cli.command {
            Command::Start {
                prompt,
                promise,
                promise_mode,
                same_prompt,
                ..
            } => {
                assert_eq!(prompt, "do the task");
                assert_eq!(promise, "DONE");
                assert_eq!(promise_mode, PromiseMode::Tag);
                assert!(!same_prompt);
            }
            _ => panic!("expected start command"),
        }
    }

    #[test]
    fn parse_resume_overrides() {
        let cli = Cli::parse_from([
            "looper",
            "resume",
            "loop-1",
            "--max-iterations",
            "7",
            "--promise-mode",
            "regex",
            "--same-prompt",
            "true",
        ]);
        match cli.command {
            Command::Resume {
                loop_id,
                max_iterations,
                promise_mode,
                same_prompt,
                ..
            } => {
                assert_eq!(loop_id, "loop-1");
                assert_eq!(max_iterations, Some(7));
                assert_eq!(promise_mode, Some(PromiseMode::Regex));
                assert_eq!(same_prompt, Some(true));
            }
            _ => panic!("expected resume command"),
        }
    }

    #[test]
    fn parse_checkpoint_flags() {
        let cli = Cli::parse_from([
            "looper",
            "start",
            "task",
            "--checkpoint-file",
            "CHECKLIST.md",
            "--checkpoint-token",
            "HARD-STOP",
            "--on-checkpoint",
            "pause",
        ]);
        match cli.command {
            Command::Start {
                checkpoint_file,
                checkpoint_token,
                on_checkpoint,
                ..
            } => {
                assert_eq!(checkpoint_file.as_deref(), Some("CHECKLIST.md"));
                assert_eq!(checkpoint_token.as_deref(), Some("HARD-STOP"));
                assert_eq!(on_checkpoint, CheckpointMode::Pause);
            }
            _ => panic!("expected start command"),
        }
    }

    #[test]
    fn checkpoint_file_requires_token() {
        let parsed = Cli::try_parse_from([
            "looper",
            "start",
            "task",
            "--checkpoint-file",
            "CHECKLIST.md",
        ]);
        assert!(parsed.is_err());
    }
}
