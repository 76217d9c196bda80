use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client → Server events on the chat socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Ask to be paired with the next waiting participant
    RequestPairing,

    /// Chat text for the current peer
    Message { text: String },

    /// Keystroke activity, relayed to the peer as a typing indicator
    Typing,

    /// Leave the current session (or stop waiting)
    Leave,
}

/// Why an inbound frame could not be turned into a [`ClientEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventParseError {
    /// Not JSON, no `kind`, or a known `kind` with bad fields
    Malformed,
    /// Well-formed, but the `kind` is not one we handle
    Unrecognized(String),
}

impl ClientEvent {
    pub const KINDS: [&'static str; 4] = ["request_pairing", "message", "typing", "leave"];

    pub fn parse(text: &str) -> Result<Self, EventParseError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|_| EventParseError::Malformed)?;

        let kind = match value.get("kind").and_then(|k| k.as_str()) {
            Some(kind) => kind.to_string(),
            None => return Err(EventParseError::Malformed),
        };

        serde_json::from_value(value).map_err(|_| {
            if Self::KINDS.contains(&kind.as_str()) {
                EventParseError::Malformed
            } else {
                EventParseError::Unrecognized(kind)
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Sent to the participant who left
    Left,
    PeerLeft,
    PeerDisconnected,
}

/// Server → Client events on the chat socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerEvent {
    /// No partner yet; the caller is in the readiness queue
    Waiting,

    /// A waiting caller left the queue before being matched
    WaitingCancelled,

    Matched {
        session_id: String,
        peer_label: String,
    },

    Message {
        text: String,
        sender_label: String,
    },

    Typing {
        sender_label: String,
    },

    TypingEnded,

    SessionEnded {
        reason: EndReason,
    },

    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn matched(session_id: impl Into<String>, peer_label: impl Into<String>) -> Self {
        Self::Matched {
            session_id: session_id.into(),
            peer_label: peer_label.into(),
        }
    }

    pub fn message(text: impl Into<String>, sender_label: impl Into<String>) -> Self {
        Self::Message {
            text: text.into(),
            sender_label: sender_label.into(),
        }
    }

    pub fn typing(sender_label: impl Into<String>) -> Self {
        Self::Typing {
            sender_label: sender_label.into(),
        }
    }

    pub fn session_ended(reason: EndReason) -> Self {
        Self::SessionEnded { reason }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// One entry of a session's message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub seq: u64,
    pub sender_label: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineDetails {
    pub active_connections: usize,
    pub logged_in: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineResponse {
    pub online: usize,
    pub details: OnlineDetails,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_kinds() {
        assert_eq!(
            ClientEvent::parse(r#"{"kind":"request_pairing"}"#),
            Ok(ClientEvent::RequestPairing)
        );
        assert_eq!(
            ClientEvent::parse(r#"{"kind":"message","text":"hi"}"#),
            Ok(ClientEvent::Message { text: "hi".into() })
        );
        assert_eq!(ClientEvent::parse(r#"{"kind":"typing"}"#), Ok(ClientEvent::Typing));
        assert_eq!(ClientEvent::parse(r#"{"kind":"leave"}"#), Ok(ClientEvent::Leave));
    }

    #[test]
    fn classifies_bad_frames() {
        assert_eq!(ClientEvent::parse("not json"), Err(EventParseError::Malformed));
        assert_eq!(ClientEvent::parse(r#"{"text":"hi"}"#), Err(EventParseError::Malformed));
        assert_eq!(
            ClientEvent::parse(r#"{"kind":"message"}"#),
            Err(EventParseError::Malformed)
        );
        assert_eq!(
            ClientEvent::parse(r#"{"kind":"dance"}"#),
            Err(EventParseError::Unrecognized("dance".into()))
        );
    }

    #[test]
    fn server_events_use_kind_tag() {
        let value = serde_json::to_value(ServerEvent::message("hi", "A")).unwrap();
        assert_eq!(value, json!({"kind": "message", "text": "hi", "sender_label": "A"}));

        let value = serde_json::to_value(ServerEvent::session_ended(EndReason::PeerDisconnected))
            .unwrap();
        assert_eq!(value, json!({"kind": "session_ended", "reason": "peer_disconnected"}));

        let value = serde_json::to_value(ServerEvent::TypingEnded).unwrap();
        assert_eq!(value, json!({"kind": "typing_ended"}));
    }
}
