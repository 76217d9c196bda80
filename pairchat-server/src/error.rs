//! Error types for the chat server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pairchat_common::EventParseError;
use serde_json::json;
use thiserror::Error;

/// Every error here is recoverable at the connection or request boundary.
/// Transitions that fail are rejected before any state is mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Unknown, expired, or refused identity token
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Malformed or unrecognized inbound event
    #[error("{0}")]
    Protocol(&'static str),

    /// Message, typing, or leave from an identity with no active session
    #[error("not in session")]
    NotInSession,

    /// History lookup for a session that does not exist (or has ended)
    #[error("session not found")]
    NotFound,

    /// History lookup by someone who was not a participant
    #[error("not a participant of this session")]
    Authorization,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl From<EventParseError> for ChatError {
    fn from(err: EventParseError) -> Self {
        match err {
            EventParseError::Malformed => ChatError::Protocol("malformed event"),
            EventParseError::Unrecognized(_) => ChatError::Protocol("unrecognized event"),
        }
    }
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ChatError::Protocol(_) => StatusCode::BAD_REQUEST,
            ChatError::NotInSession => StatusCode::CONFLICT,
            ChatError::NotFound => StatusCode::NOT_FOUND,
            ChatError::Authorization => StatusCode::FORBIDDEN,
            ChatError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_map_to_protocol_messages() {
        assert_eq!(
            ChatError::from(EventParseError::Malformed).to_string(),
            "malformed event"
        );
        assert_eq!(
            ChatError::from(EventParseError::Unrecognized("dance".into())).to_string(),
            "unrecognized event"
        );
    }

    #[test]
    fn lookup_errors_map_to_http_status() {
        assert_eq!(ChatError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ChatError::Authorization.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ChatError::Authentication("unknown token".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
