//! Initialization of `.looper/` scaffolding.
//!
//! Besides the directory layout and default config, init renders the
//! installable text files (review checklist and loop protocol) from
//! embedded templates so the checkpoint token is baked in.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};

use super::config::{LooperConfig, write_config};
use super::paths::LooperPaths;

const CHECKLIST_TEMPLATE: &str = include_str!("templates/checklist.md");
const PROTOCOL_TEMPLATE: &str = include_str!("templates/protocol.md");
const LOOPER_GITIGNORE: &str = "iterations/\nsummary.json\n";

/// Default sentinel token baked into freshly installed files.
pub const DEFAULT_CHECKPOINT_TOKEN: &str = "HARD-STOP";

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing looper-owned files.
    pub force: bool,
    /// Sentinel token rendered into the installable files.
    pub checkpoint_token: String,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            force: false,
            checkpoint_token: DEFAULT_CHECKPOINT_TOKEN.to_string(),
        }
    }
}

/// Create `.looper/` scaffolding in `root`.
///
/// Fails if `.looper/` already exists unless `options.force` is set.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<LooperPaths> {
    let paths = LooperPaths::new(root);
    if paths.looper_dir.exists() && !options.force {
        return Err(anyhow!(
            "looper init: .looper already exists (use --force to overwrite)"
        ));
    }
    if paths.looper_dir.exists() && !paths.looper_dir.is_dir() {
        return Err(anyhow!("looper init: .looper exists but is not a directory"));
    }

    create_dir(&paths.looper_dir)?;
    create_dir(&paths.loops_dir)?;
    create_dir(&paths.iterations_dir)?;

    write_file(&paths.gitignore_path, LOOPER_GITIGNORE)?;
    write_config(&paths.config_path, &LooperConfig::default())?;
    write_file(
        &paths.checklist_path,
        &render_installable(CHECKLIST_TEMPLATE, &options.checkpoint_token)?,
    )?;
    write_file(
        &paths.protocol_path,
        &render_installable(PROTOCOL_TEMPLATE, &options.checkpoint_token)?,
    )?;

    Ok(paths)
}

fn render_installable(template: &str, token: &str) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("installable", template)
        .context("installable template should be valid")?;
    let rendered = env
        .get_template("installable")?
        .render(context! { token => token })?;
    Ok(rendered)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}
