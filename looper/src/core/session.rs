//! Session identifier extraction from agent output.
//!
//! The agent reports the session id either in structured (JSON-lines) events
//! or somewhere in free text. Extraction is an ordered list of strategies;
//! the ordering is part of the observable contract: structured events first,
//! then the first UUID-shaped substring, then the previously known id.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("uuid pattern should be valid")
});

/// Resolve the session id for one finished invocation.
///
/// `output` is the combined captured output (success and diagnostic
/// streams); `previous` is the id known before this invocation, used as the
/// final fallback for continuation turns. Returns `None` only when every
/// strategy comes up empty, which the controller treats as fatal.
pub fn resolve_session_id(output: &str, previous: Option<&str>) -> Option<String> {
    from_structured_events(output)
        .or_else(|| from_uuid_text(output))
        .or_else(|| previous.filter(|id| !id.is_empty()).map(str::to_string))
}

/// Scan JSON-lines output for a session id.
///
/// Lines that do not start with `{` or fail to parse are skipped silently;
/// malformed events are never fatal. Recognized shapes: a top-level
/// `session_id`, a nested `session.id`, or a top-level `id` when `type`
/// equals `"session"`.
pub fn from_structured_events(output: &str) -> Option<String> {
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if !line.trim_start().starts_with('{') {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(line.trim_start()) else {
            continue;
        };
        if let Some(id) = session_id_from_event(&event) {
            return Some(id);
        }
    }
    None
}

fn session_id_from_event(event: &Value) -> Option<String> {
    if let Some(id) = event.get("session_id").and_then(Value::as_str) {
        return non_empty(id);
    }
    if let Some(id) = event
        .get("session")
        .and_then(|session| session.get("id"))
        .and_then(Value::as_str)
    {
        return non_empty(id);
    }
    if event.get("type").and_then(Value::as_str) == Some("session")
        && let Some(id) = event.get("id").and_then(Value::as_str)
    {
        return non_empty(id);
    }
    None
}

/// Find the first canonical UUID (8-4-4-4-12 hex groups, case-insensitive)
/// anywhere in the raw text.
pub fn from_uuid_text(output: &str) -> Option<String> {
    UUID_RE.find(output).map(|m| m.as_str().to_string())
}

fn non_empty(id: &str) -> Option<String> {
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_event_wins_over_bare_uuid() {
        let output = concat!(
            "prelude with a uuid 0a1b2c3d-0000-1111-2222-333344445555\n",
            "{\"type\":\"turn\",\"session_id\":\"A\"}\n",
        );
        assert_eq!(resolve_session_id(output, None).as_deref(), Some("A"));
    }

    #[test]
    fn recognizes_nested_session_id() {
        let output = "{\"session\":{\"id\":\"nested-id\"}}";
        assert_eq!(
            from_structured_events(output).as_deref(),
            Some("nested-id")
        );
    }

    #[test]
    fn recognizes_id_on_session_typed_event() {
        let output = "{\"type\":\"session\",\"id\":\"typed-id\"}";
        assert_eq!(from_structured_events(output).as_deref(), Some("typed-id"));
    }

    #[test]
    fn id_field_requires_session_type() {
        let output = "{\"type\":\"turn\",\"id\":\"not-a-session\"}";
        assert_eq!(from_structured_events(output), None);
    }

    #[test]
    fn malformed_json_lines_are_skipped() {
        let output = concat!(
            "{not json at all\n",
            "{\"truncated\":\n",
            "{\"session_id\":\"after-garbage\"}\n",
        );
        assert_eq!(
            from_structured_events(output).as_deref(),
            Some("after-garbage")
        );
    }

    #[test]
    fn uuid_fallback_is_case_insensitive_and_crlf_safe() {
        let output = "log line\r\nsession: 0A1B2C3D-9e8f-4aa0-BB11-223344556677\r\n";
        assert_eq!(
            from_uuid_text(output).as_deref(),
            Some("0A1B2C3D-9e8f-4aa0-BB11-223344556677")
        );
    }

    #[test]
    fn crlf_structured_lines_parse() {
        let output = "{\"session_id\":\"crlf-id\"}\r\n";
        assert_eq!(from_structured_events(output).as_deref(), Some("crlf-id"));
    }

    #[test]
    fn falls_back_to_previous_id() {
        assert_eq!(
            resolve_session_id("no ids here", Some("prior")).as_deref(),
            Some("prior")
        );
        assert_eq!(resolve_session_id("no ids here", Some("")), None);
        assert_eq!(resolve_session_id("no ids here", None), None);
    }
}
