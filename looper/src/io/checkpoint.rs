//! Checkpoint ("hard stop") sentinel scanning.
//!
//! The checkpoint file is externally maintained plain text; no format is
//! imposed beyond "contains the sentinel substring or not".

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// True when `contents` carries the literal sentinel `token`.
pub fn contains_sentinel(contents: &str, token: &str) -> bool {
    contents.contains(token)
}

/// Scan the checkpoint file for the sentinel token.
///
/// A missing file means no sentinel; any other read failure propagates.
pub fn sentinel_present(path: &Path, token: &str) -> Result<bool> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "checkpoint file absent");
            return Ok(false);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read checkpoint file {}", path.display()));
        }
    };
    Ok(contains_sentinel(&contents, token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_a_literal_substring() {
        assert!(contains_sentinel("- [ ] review auth HARD-STOP here", "HARD-STOP"));
        assert!(!contains_sentinel("- [ ] keep going", "HARD-STOP"));
    }

    #[test]
    fn missing_file_means_no_sentinel() {
        let temp = tempfile::tempdir().expect("tempdir");
        let present =
            sentinel_present(&temp.path().join("CHECKLIST.md"), "HARD-STOP").expect("scan");
        assert!(!present);
    }

    #[test]
    fn finds_sentinel_in_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("CHECKLIST.md");
        std::fs::write(&path, "notes\nHARD-STOP\nmore notes\n").expect("write");
        assert!(sentinel_present(&path, "HARD-STOP").expect("scan"));
    }
}
