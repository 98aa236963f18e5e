//! Final-answer extraction from agent transcripts.
//!
//! Each spawned agent leaves an append-only JSONL transcript: one JSON record
//! per line, tagged with a type, assistant records carrying a stop reason and
//! an ordered list of typed content segments. The harness only ever reads
//! these files.
//!
//! The canonical answer is found by scanning the transcript backward for the
//! first assistant message whose stop reason is `end_turn` or absent, and
//! joining its text segments. A candidate whose joined text trims to empty
//! does not end the scan; earlier messages are still considered.

use std::path::Path;

use serde_json::Value;

/// Extract the canonical final answer from raw transcript content.
///
/// Returns the empty string when no usable output exists, including when the
/// content is not valid JSONL. Callers treat the empty string as "no usable
/// output", never as an error sentinel.
pub fn final_assistant_text(raw: &str) -> String {
    let mut messages = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => messages.push(value),
            Err(source) => {
                tracing::warn!(%source, "malformed transcript line, discarding transcript");
                return String::new();
            }
        }
    }

    for message in messages.iter().rev() {
        if message.get("type").and_then(Value::as_str) != Some("assistant") {
            continue;
        }
        if let Some(text) = assistant_text(message) {
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// Read a transcript file and extract its final answer.
///
/// Unreadable files fail soft: the error is reported as a diagnostic and the
/// result is the empty string.
pub fn read_final_assistant_text(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(raw) => final_assistant_text(&raw),
        Err(source) => {
            tracing::warn!(path = %path.display(), %source, "failed to read transcript");
            String::new()
        }
    }
}

/// Joined text of an assistant record, if its stop reason qualifies.
///
/// `end_turn` and an absent/null stop reason both qualify; any other value
/// (e.g. `tool_use`, `max_tokens`) disqualifies the message.
fn assistant_text(message: &Value) -> Option<String> {
    let body = message.get("message");
    let stop_reason = body.and_then(|m| m.get("stop_reason"));
    match stop_reason {
        None | Some(Value::Null) => {}
        Some(Value::String(reason)) if reason == "end_turn" => {}
        Some(_) => return None,
    }

    let mut parts: Vec<&str> = Vec::new();
    if let Some(blocks) = body.and_then(|m| m.get("content")).and_then(Value::as_array) {
        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("text") {
                parts.push(block.get("text").and_then(Value::as_str).unwrap_or(""));
            }
        }
    }
    Some(parts.join("\n").trim().to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant_line(stop_reason: Option<&str>, texts: &[&str]) -> String {
        let content: Vec<Value> = texts
            .iter()
            .map(|t| serde_json::json!({"type": "text", "text": t}))
            .collect();
        let mut message = serde_json::json!({"content": content});
        if let Some(reason) = stop_reason {
            message["stop_reason"] = Value::String(reason.into());
        }
        serde_json::json!({"type": "assistant", "message": message}).to_string()
    }

    #[test]
    fn picks_most_recent_qualifying_assistant_message() {
        let raw = [
            assistant_line(Some("end_turn"), &["early answer"]),
            r#"{"type": "user", "message": {"content": []}}"#.to_string(),
            assistant_line(Some("end_turn"), &["final answer"]),
        ]
        .join("\n");
        assert_eq!(final_assistant_text(&raw), "final answer");
    }

    #[test]
    fn non_terminal_stop_reason_is_skipped() {
        let raw = [
            assistant_line(Some("end_turn"), &["real answer"]),
            assistant_line(Some("tool_use"), &["intermediate"]),
        ]
        .join("\n");
        assert_eq!(final_assistant_text(&raw), "real answer");
    }

    #[test]
    fn absent_stop_reason_qualifies() {
        let raw = assistant_line(None, &["answer"]);
        assert_eq!(final_assistant_text(&raw), "answer");
    }

    #[test]
    fn empty_candidate_falls_back_to_earlier_message() {
        let raw = [
            assistant_line(Some("end_turn"), &["earlier non-empty"]),
            assistant_line(Some("end_turn"), &["   "]),
        ]
        .join("\n");
        assert_eq!(final_assistant_text(&raw), "earlier non-empty");
    }

    #[test]
    fn text_segments_join_with_newline_and_trim() {
        let raw = assistant_line(Some("end_turn"), &["  part one", "part two  "]);
        assert_eq!(final_assistant_text(&raw), "part one\npart two");
    }

    #[test]
    fn non_text_segments_are_ignored() {
        let line = serde_json::json!({
            "type": "assistant",
            "message": {
                "stop_reason": "end_turn",
                "content": [
                    {"type": "tool_use", "name": "bash"},
                    {"type": "text", "text": "the answer"}
                ]
            }
        })
        .to_string();
        assert_eq!(final_assistant_text(&line), "the answer");
    }

    #[test]
    fn malformed_jsonl_yields_empty_string() {
        let raw = format!("{}\nnot json at all", assistant_line(Some("end_turn"), &["x"]));
        assert_eq!(final_assistant_text(&raw), "");
    }

    #[test]
    fn no_assistant_messages_yields_empty_string() {
        assert_eq!(
            final_assistant_text(r#"{"type": "user", "message": {}}"#),
            ""
        );
    }

    #[test]
    fn missing_file_yields_empty_string() {
        assert_eq!(read_final_assistant_text("/nonexistent/agent-x.jsonl"), "");
    }
}
