//! Canonical paths under `.looper/` for a workspace root.

use std::path::{Path, PathBuf};

/// All looper-owned paths for a workspace root.
#[derive(Debug, Clone)]
pub struct LooperPaths {
    pub root: PathBuf,
    pub looper_dir: PathBuf,
    pub loops_dir: PathBuf,
    pub iterations_dir: PathBuf,
    pub config_path: PathBuf,
    pub summary_path: PathBuf,
    pub checklist_path: PathBuf,
    pub protocol_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl LooperPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let looper_dir = root.join(".looper");
        Self {
            root: root.clone(),
            loops_dir: looper_dir.join("loops"),
            iterations_dir: looper_dir.join("iterations"),
            config_path: looper_dir.join("config.toml"),
            summary_path: looper_dir.join("summary.json"),
            checklist_path: looper_dir.join("CHECKLIST.md"),
            protocol_path: looper_dir.join("PROTOCOL.md"),
            gitignore_path: looper_dir.join(".gitignore"),
            looper_dir,
        }
    }

    /// Path of the persisted state record for one loop.
    pub fn loop_path(&self, loop_id: &str) -> PathBuf {
        self.loops_dir.join(format!("{loop_id}.json"))
    }

    /// Artifact directory for one iteration of one loop. Each iteration gets
    /// a distinct numbered directory so history is never overwritten.
    pub fn iteration_dir(&self, loop_id: &str, iteration: u32) -> PathBuf {
        self.iterations_dir
            .join(loop_id)
            .join(iteration.to_string())
    }

    /// Final-message capture path for one iteration.
    pub fn last_message_path(&self, loop_id: &str, iteration: u32) -> PathBuf {
        self.iteration_dir(loop_id, iteration).join("last_message.txt")
    }

    /// Raw event-stream capture path for one iteration.
    pub fn events_path(&self, loop_id: &str, iteration: u32) -> PathBuf {
        self.iteration_dir(loop_id, iteration).join("events.jsonl")
    }
}

/// Display helper: render a path relative to the workspace root when possible.
pub fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_stable() {
        let paths = LooperPaths::new("/ws");
        assert!(paths.config_path.ends_with(".looper/config.toml"));
        assert!(paths.summary_path.ends_with(".looper/summary.json"));
        assert!(paths.loop_path("loop-1").ends_with(".looper/loops/loop-1.json"));
        assert!(
            paths
                .last_message_path("loop-1", 3)
                .ends_with(".looper/iterations/loop-1/3/last_message.txt")
        );
        assert!(
            paths
                .events_path("loop-1", 3)
                .ends_with(".looper/iterations/loop-1/3/events.jsonl")
        );
    }

    #[test]
    fn iterations_get_distinct_dirs() {
        let paths = LooperPaths::new("/ws");
        assert_ne!(
            paths.iteration_dir("loop-1", 1),
            paths.iteration_dir("loop-1", 2)
        );
    }
}
