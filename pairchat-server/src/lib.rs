//! Pairing and relay engine for anonymous one-on-one chat.
//!
//! Participants authenticate with a token issued by the [`directory`], open a
//! WebSocket, ask to be paired, and exchange messages and typing signals with
//! their peer. All matchmaking and session state is owned by the
//! [`coordinator::Coordinator`]; the [`sweeper`] expires stale typing
//! indicators in the background.

pub mod chat;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod matchmaking;
pub mod registry;
pub mod sessions;
pub mod sweeper;
pub mod typing;

use std::{fmt, sync::Arc};

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::ServerConfig;
pub use coordinator::Coordinator;
pub use directory::Directory;
pub use error::{ChatError, Result};

/// The token a participant authenticated with, used as their key everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens are credentials; only a prefix goes into logs.
        match self.0.char_indices().nth(6) {
            Some((end, _)) => write!(f, "{}…", &self.0[..end]),
            None => f.write_str(&self.0),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub directory: Directory,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            coordinator: Arc::new(Coordinator::new(config.typing_quiet_interval())),
            directory: Directory::new(config.allowed_email_domain.clone()),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(chat::api::healthz))
        .route("/api/login", post(chat::api::login))
        .route("/api/token/validate", post(chat::api::validate_token))
        .route("/api/online", get(chat::api::online))
        .route("/api/chats/:session_id/history", get(chat::api::history))
        .route("/ws/chat", get(chat::ws::handle_chat_ws))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shortens_only_long_tokens() {
        assert_eq!(Identity::from("V1StGXR8_Z5jdHi6B").to_string(), "V1StGX…");
        assert_eq!(Identity::from("abcdef").to_string(), "abcdef");
        assert_eq!(Identity::from("abc").to_string(), "abc");
    }
}
