//! Prompt rendering for agent turns.
//!
//! Two embedded templates: the kickoff prompt carries the full task text and
//! the promise protocol; the follow-up prompt restates only the loop id,
//! iteration count, and the promise reminder for continuation turns.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::{CheckpointConfig, PromiseMode};

const KICKOFF_TEMPLATE: &str = include_str!("prompts/kickoff.md");
const FOLLOWUP_TEMPLATE: &str = include_str!("prompts/followup.md");

/// Inputs shared by both prompt shapes.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub loop_id: &'a str,
    /// Iteration about to run (1-indexed).
    pub iteration: u32,
    pub max_iterations: u32,
    pub task: &'a str,
    pub promise: &'a str,
    pub mode: PromiseMode,
    pub checkpoint: Option<&'a CheckpointConfig>,
}

#[derive(Debug, Serialize)]
struct CheckpointContext<'a> {
    file: &'a str,
    token: &'a str,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("kickoff", KICKOFF_TEMPLATE)
            .expect("kickoff template should be valid");
        env.add_template("followup", FOLLOWUP_TEMPLATE)
            .expect("followup template should be valid");
        Self { env }
    }

    fn render(&self, name: &str, ctx: &PromptContext<'_>) -> Result<String> {
        let checkpoint = ctx.checkpoint.map(|cp| CheckpointContext {
            file: &cp.file,
            token: &cp.token,
        });
        let template = self.env.get_template(name)?;
        let rendered = template.render(context! {
            loop_id => ctx.loop_id,
            iteration => ctx.iteration,
            max_iterations => ctx.max_iterations,
            task => ctx.task.trim(),
            promise_instruction => promise_instruction(ctx.mode, ctx.promise),
            checkpoint => checkpoint,
        })?;
        Ok(rendered)
    }
}

/// Full-context prompt for a fresh turn (or every turn when the loop resends
/// the same prompt each iteration).
pub fn render_kickoff(ctx: &PromptContext<'_>) -> Result<String> {
    PromptEngine::new().render("kickoff", ctx)
}

/// Short continuation prompt for resume turns.
pub fn render_followup(ctx: &PromptContext<'_>) -> Result<String> {
    PromptEngine::new().render("followup", ctx)
}

fn promise_instruction(mode: PromiseMode, promise: &str) -> String {
    match mode {
        PromiseMode::Tag => format!(
            "When the task is fully complete, include the literal text `<promise>{promise}</promise>` in your final message. Never emit it earlier."
        ),
        PromiseMode::Plain => format!(
            "When the task is fully complete, include the literal text `{promise}` in your final message. Never emit it earlier."
        ),
        PromiseMode::Regex => format!(
            "When the task is fully complete, make your final message match the pattern `{promise}`. Never produce a match earlier."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CheckpointMode;

    fn ctx<'a>(checkpoint: Option<&'a CheckpointConfig>) -> PromptContext<'a> {
        PromptContext {
            loop_id: "loop-1",
            iteration: 3,
            max_iterations: 10,
            task: "Refactor the config loader",
            promise: "DONE",
            mode: PromiseMode::Tag,
            checkpoint,
        }
    }

    #[test]
    fn kickoff_embeds_task_and_promise_protocol() {
        let rendered = render_kickoff(&ctx(None)).expect("render");
        assert!(rendered.contains("Refactor the config loader"));
        assert!(rendered.contains("<promise>DONE</promise>"));
        assert!(rendered.contains("iteration 3 of at most 10"));
        assert!(!rendered.contains("Checkpoint"));
    }

    #[test]
    fn kickoff_mentions_checkpoint_when_configured() {
        let checkpoint = CheckpointConfig {
            file: "CHECKLIST.md".to_string(),
            token: "HARD-STOP".to_string(),
            mode: CheckpointMode::Pause,
            paused: false,
        };
        let rendered = render_kickoff(&ctx(Some(&checkpoint))).expect("render");
        assert!(rendered.contains("CHECKLIST.md"));
        assert!(rendered.contains("HARD-STOP"));
    }

    #[test]
    fn followup_restates_loop_but_not_the_task() {
        let rendered = render_followup(&ctx(None)).expect("render");
        assert!(rendered.contains("loop-1"));
        assert!(rendered.contains("iteration 3"));
        assert!(rendered.contains("<promise>DONE</promise>"));
        assert!(!rendered.contains("Refactor the config loader"));
    }

    #[test]
    fn plain_and_regex_modes_change_the_instruction() {
        let mut c = ctx(None);
        c.mode = PromiseMode::Plain;
        let plain = render_followup(&c).expect("render");
        assert!(plain.contains("literal text `DONE`"));
        assert!(!plain.contains("<promise>"));

        c.mode = PromiseMode::Regex;
        c.promise = r"DONE-\d+";
        let re = render_followup(&c).expect("render");
        assert!(re.contains(r"match the pattern `DONE-\d+`"));
    }
}
