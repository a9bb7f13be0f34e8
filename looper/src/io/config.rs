//! Tool configuration stored under `.looper/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Looper configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LooperConfig {
    /// Default `max_iterations` for new loops.
    pub max_iterations_default: u32,

    /// Truncate the in-memory capture of agent output beyond this many bytes.
    /// Terminal mirroring and event-log capture are not affected.
    pub output_limit_bytes: usize,

    /// How often the child wait loop checks the interrupt flag.
    pub poll_interval_ms: u64,

    pub agent: AgentConfig,
}

/// Defaults for agent invocations; CLI flags override per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable invoked as `<command> exec ...`.
    pub command: String,
    pub model: Option<String>,
    pub profile: Option<String>,
    pub sandbox: Option<String>,
    pub ask_for_approval: Option<String>,
    pub full_auto: bool,
    pub skip_git_repo_check: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "codex".to_string(),
            model: None,
            profile: None,
            sandbox: None,
            ask_for_approval: None,
            full_auto: false,
            skip_git_repo_check: false,
        }
    }
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            max_iterations_default: 10,
            output_limit_bytes: 2_000_000,
            poll_interval_ms: 200,
            agent: AgentConfig::default(),
        }
    }
}

impl LooperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations_default == 0 {
            return Err(anyhow!("max_iterations_default must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be > 0"));
        }
        if self.agent.command.trim().is_empty() {
            return Err(anyhow!("agent.command must not be empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LooperConfig::default()`.
pub fn load_config(path: &Path) -> Result<LooperConfig> {
    if !path.exists() {
        let cfg = LooperConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LooperConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LooperConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LooperConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = LooperConfig::default();
        cfg.agent.model = Some("gpt-5-codex".to_string());
        cfg.agent.full_auto = true;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn validation_rejects_zero_limits() {
        let cfg = LooperConfig {
            output_limit_bytes: 0,
            ..LooperConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_blank_agent_command() {
        let mut cfg = LooperConfig::default();
        cfg.agent.command = "  ".to_string();
        assert!(cfg.validate().is_err());
    }
}
