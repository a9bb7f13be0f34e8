//! Completion detection over the agent's final message.

use tracing::warn;

use super::types::PromiseMode;

/// Decide whether `message` signals completion for the configured promise.
///
/// An empty message never matches, regardless of mode. In `Regex` mode an
/// invalid pattern is reported as a diagnostic and treated as non-matching;
/// it never propagates past the detector.
pub fn promise_detected(message: &str, mode: PromiseMode, token: &str) -> bool {
    if message.is_empty() {
        return false;
    }
    match mode {
        PromiseMode::Tag => message.contains(&format!("<promise>{token}</promise>")),
        PromiseMode::Plain => message.contains(token),
        PromiseMode::Regex => match regex::Regex::new(token) {
            Ok(re) => re.is_match(message),
            Err(err) => {
                warn!(pattern = %token, err = %err, "invalid completion pattern, treating as no match");
                false
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_never_matches() {
        for mode in [PromiseMode::Tag, PromiseMode::Plain, PromiseMode::Regex] {
            assert!(!promise_detected("", mode, "DONE"));
        }
        // Even a pattern that matches the empty string is rejected up front.
        assert!(!promise_detected("", PromiseMode::Regex, ".*"));
    }

    #[test]
    fn tag_mode_requires_exact_token_inside_tags() {
        assert!(promise_detected(
            "work finished <promise>DONE</promise> bye",
            PromiseMode::Tag,
            "DONE"
        ));
        assert!(!promise_detected(
            "<promise>DONE</promise>",
            PromiseMode::Tag,
            "DONE2"
        ));
        // Bare token without the tag wrapper is not a completion signal.
        assert!(!promise_detected("DONE", PromiseMode::Tag, "DONE"));
    }

    #[test]
    fn plain_mode_is_substring_match() {
        assert!(promise_detected("all DONE here", PromiseMode::Plain, "DONE"));
        assert!(!promise_detected("still working", PromiseMode::Plain, "DONE"));
    }

    #[test]
    fn regex_mode_compiles_and_tests() {
        assert!(promise_detected("DONE-123", PromiseMode::Regex, r"DONE-\d+"));
        assert!(!promise_detected("DONE", PromiseMode::Regex, r"DONE-\d+"));
    }

    #[test]
    fn invalid_pattern_never_raises() {
        assert!(!promise_detected("anything", PromiseMode::Regex, "[invalid"));
    }
}
