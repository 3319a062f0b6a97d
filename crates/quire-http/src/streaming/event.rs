//! SSE frame parsing and the generation event vocabulary.

use serde_json::Value;

/// Event type used when a frame has no `event:` line.
pub const DEFAULT_EVENT_TYPE: &str = "message";

pub const EVENT_DONE: &str = "done";
pub const EVENT_ERROR: &str = "error";

/// Message used when an `error` event carries no usable `error` field.
pub const GENERIC_STREAM_ERROR: &str = "an error occurred during generation";

const DONE_SENTINEL: &str = "[DONE]";

/// One parsed SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: String,
    pub data: String,
}

impl SseEvent {
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }
}

/// Parse one frame (the text between blank lines).
///
/// `event: ` sets the type, trimmed. `data: ` sets the payload verbatim; if
/// several data lines appear, the last wins. Returns `None` when there is no
/// payload.
pub fn parse_frame(frame: &str) -> Option<SseEvent> {
    let mut event_type = DEFAULT_EVENT_TYPE;
    let mut data = "";

    for line in frame.split('\n') {
        if let Some(value) = line.strip_prefix("event: ") {
            event_type = value.trim();
        } else if let Some(value) = line.strip_prefix("data: ") {
            data = value;
        }
    }

    if data.is_empty() {
        return None;
    }
    Some(SseEvent::new(event_type, data))
}

/// What a [`StreamingSession`](super::StreamingSession) should do with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAction {
    /// Append text to the accumulated content.
    Append(String),
    /// The server finished the generation.
    Complete,
    /// The server reported a failure.
    Fail(String),
    /// Nothing to do.
    Ignore,
}

/// Decide how an event affects the stream.
pub fn interpret(event: &SseEvent) -> StreamAction {
    match event.event_type.as_str() {
        EVENT_DONE => return StreamAction::Complete,
        EVENT_ERROR => {
            let message = serde_json::from_str::<Value>(&event.data)
                .ok()
                .as_ref()
                .and_then(|v| v.get("error"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| GENERIC_STREAM_ERROR.to_string());
            return StreamAction::Fail(message);
        }
        _ => {}
    }

    match serde_json::from_str::<Value>(&event.data) {
        Ok(payload) => {
            if event.event_type != DEFAULT_EVENT_TYPE {
                return StreamAction::Ignore;
            }
            match payload.get("content").and_then(Value::as_str) {
                Some(content) if !content.is_empty() => StreamAction::Append(content.to_string()),
                _ => StreamAction::Ignore,
            }
        }
        Err(_) if event.data.trim().is_empty() || event.data == DONE_SENTINEL => {
            StreamAction::Ignore
        }
        Err(_) => StreamAction::Append(event.data.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_with_type_and_data() {
        let event = parse_frame("event: message \ndata: {\"content\":\"Hel\"}").unwrap();
        assert_eq!(event.event_type, "message");
        assert_eq!(event.data, r#"{"content":"Hel"}"#);
    }

    #[test]
    fn frame_defaults_to_message_and_keeps_data_untrimmed() {
        let event = parse_frame("data:  spaced ").unwrap();
        assert_eq!(event.event_type, DEFAULT_EVENT_TYPE);
        assert_eq!(event.data, " spaced ");
    }

    #[test]
    fn frame_without_data_is_dropped() {
        assert_eq!(parse_frame("event: done"), None);
        assert_eq!(parse_frame("data: "), None);
        assert_eq!(parse_frame(": keep-alive"), None);
    }

    #[test]
    fn last_data_line_wins() {
        let event = parse_frame("data: first\ndata: second").unwrap();
        assert_eq!(event.data, "second");
    }

    #[test]
    fn message_content_is_appended() {
        let event = SseEvent::new("message", r#"{"content":"lo"}"#);
        assert_eq!(interpret(&event), StreamAction::Append("lo".into()));

        let empty = SseEvent::new("message", r#"{"content":""}"#);
        assert_eq!(interpret(&empty), StreamAction::Ignore);
    }

    #[test]
    fn other_json_events_are_ignored() {
        let event = SseEvent::new("usage", r#"{"content":"not shown"}"#);
        assert_eq!(interpret(&event), StreamAction::Ignore);
    }

    #[test]
    fn done_completes() {
        let event = SseEvent::new("done", r#"{"status":"complete"}"#);
        assert_eq!(interpret(&event), StreamAction::Complete);
    }

    #[test]
    fn error_uses_error_field_or_generic_message() {
        let event = SseEvent::new("error", r#"{"error":"quota exceeded"}"#);
        assert_eq!(interpret(&event), StreamAction::Fail("quota exceeded".into()));

        let bare = SseEvent::new("error", "upstream closed");
        assert_eq!(
            interpret(&bare),
            StreamAction::Fail(GENERIC_STREAM_ERROR.into())
        );
    }

    #[test]
    fn raw_text_is_content_except_done_sentinel() {
        assert_eq!(
            interpret(&SseEvent::new("message", "plain words")),
            StreamAction::Append("plain words".into())
        );
        assert_eq!(
            interpret(&SseEvent::new("message", "[DONE]")),
            StreamAction::Ignore
        );
        assert_eq!(interpret(&SseEvent::new("message", "   ")), StreamAction::Ignore);
    }
}
