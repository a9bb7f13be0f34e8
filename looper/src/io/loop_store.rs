//! Durable loop-state storage under `.looper/loops/`.
//!
//! One JSON record per loop, safe to read externally at any time between
//! persists. Every update is a single atomic rewrite (temp file + rename);
//! no condition may leave a record partially written.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::types::{
    CheckpointConfig, IterationRecord, LastResult, LoopStatus, PromiseMode,
};

use super::paths::LooperPaths;

/// Persisted state of one loop (`.looper/loops/<loop_id>.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopState {
    /// Stable identifier, immutable after creation.
    pub loop_id: String,
    pub status: LoopStatus,
    /// Count of agent invocations that reached a conclusive outcome.
    pub iteration: u32,
    /// Original task text, immutable.
    pub prompt: String,
    pub completion_promise: String,
    pub promise_mode: PromiseMode,
    #[serde(default)]
    pub same_prompt_each_iteration: bool,
    pub max_iterations: u32,
    /// Agent-assigned session id; empty until the first response. Callers
    /// must tolerate it being absent before the first iteration.
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub checkpoint: Option<CheckpointConfig>,
    /// Append-only per-iteration records; never reordered or truncated.
    #[serde(default)]
    pub history: Vec<IterationRecord>,
    #[serde(default)]
    pub last_result: Option<LastResult>,
    pub created_at: String,
    pub updated_at: String,
}

impl LoopState {
    pub fn new(
        loop_id: String,
        prompt: String,
        completion_promise: String,
        promise_mode: PromiseMode,
        same_prompt_each_iteration: bool,
        max_iterations: u32,
        checkpoint: Option<CheckpointConfig>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            loop_id,
            status: LoopStatus::Running,
            iteration: 0,
            prompt,
            completion_promise,
            promise_mode,
            same_prompt_each_iteration,
            max_iterations,
            session: String::new(),
            checkpoint,
            history: Vec::new(),
            last_result: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// One row of the external summary projection (`.looper/summary.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub loop_id: String,
    pub status: LoopStatus,
    pub iteration: u32,
    pub updated_at: String,
}

impl From<&LoopState> for LoopSummary {
    fn from(state: &LoopState) -> Self {
        Self {
            loop_id: state.loop_id.clone(),
            status: state.status,
            iteration: state.iteration,
            updated_at: state.updated_at.clone(),
        }
    }
}

/// Current wall-clock time in RFC 3339, second precision, UTC.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Load one loop record from disk.
pub fn load_loop_state(path: &Path) -> Result<LoopState> {
    debug!(path = %path.display(), "loading loop state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read loop state {}", path.display()))?;
    let state: LoopState = serde_json::from_str(&contents)
        .with_context(|| format!("parse loop state {}", path.display()))?;
    Ok(state)
}

/// Atomically persist one loop record, stamping `updated_at`.
pub fn write_loop_state(path: &Path, state: &mut LoopState) -> Result<()> {
    state.updated_at = now_rfc3339();
    debug!(
        path = %path.display(),
        loop_id = %state.loop_id,
        status = state.status.as_str(),
        iteration = state.iteration,
        "writing loop state"
    );
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Load every readable loop record under `loops_dir`, sorted by loop id.
///
/// Malformed records are skipped with a diagnostic; they never abort
/// processing of the others.
pub fn list_loop_states(loops_dir: &Path) -> Result<Vec<LoopState>> {
    if !loops_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(loops_dir)
        .with_context(|| format!("read loops directory {}", loops_dir.display()))?;

    let mut states = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", loops_dir.display()))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        match load_loop_state(&path) {
            Ok(state) => states.push(state),
            Err(err) => {
                warn!(path = %path.display(), err = %err, "skipping malformed loop record");
            }
        }
    }
    states.sort_by(|a, b| a.loop_id.cmp(&b.loop_id));
    Ok(states)
}

/// Rebuild the summary projection from all readable loop records.
pub fn write_summary(paths: &LooperPaths) -> Result<()> {
    let states = list_loop_states(&paths.loops_dir)?;
    let summaries: Vec<LoopSummary> = states.iter().map(LoopSummary::from).collect();
    let mut buf = serde_json::to_string_pretty(&summaries)?;
    buf.push('\n');
    write_atomic(&paths.summary_path, &buf)
}

/// Generate a fresh loop id from the current timestamp, probing numeric
/// suffixes until one is unused under `loops_dir`.
pub fn generate_loop_id(loops_dir: &Path) -> Result<String> {
    let base = format!("loop-{}", Utc::now().format("%Y%m%d-%H%M%S"));
    for suffix in 1..=999u32 {
        let id = if suffix == 1 {
            base.clone()
        } else {
            format!("{base}-{suffix}")
        };
        if !loops_dir.join(format!("{id}.json")).exists() {
            return Ok(id);
        }
    }
    Err(anyhow!(
        "unable to generate unique loop id from base '{base}'"
    ))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}
