use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use pairchat_common::{ClientEvent, EventParseError, ServerEvent};

use super::TokenQuery;
use crate::{registry::Connection, AppState, Identity};

pub const INVALID_TOKEN_REASON: &str = "invalid token";

/// GET /ws/chat?token=xxx - participant chat socket
pub async fn handle_chat_ws(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state, query.token))
}

async fn handle_chat_socket(mut socket: WebSocket, state: AppState, token: String) {
    let label = match state.directory.authenticate(&token).await {
        Ok(label) => label,
        Err(err) => {
            warn!(error = %err, "refusing chat socket");
            let _ = socket
                .send(WsMessage::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: INVALID_TOKEN_REASON.into(),
                })))
                .await;
            return;
        }
    };

    let identity = Identity::from(token);
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let conn = state
        .coordinator
        .connect(identity.clone(), Connection::new(label, outbox_tx))
        .await;

    // Task: drain this connection's outbox into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbox_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if ws_sender.send(WsMessage::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Task: feed inbound frames to the coordinator
    let coordinator = state.coordinator.clone();
    let recv_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                WsMessage::Text(text) => match ClientEvent::parse(&text) {
                    Ok(event) => coordinator.handle(&recv_identity, conn, event).await,
                    Err(err) => coordinator.reject(&recv_identity, conn, err).await,
                },
                WsMessage::Binary(_) => {
                    coordinator
                        .reject(&recv_identity, conn, EventParseError::Malformed)
                        .await
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => {}
    }

    // Cleanup: runs whether the socket closed cleanly or half-way
    if state.coordinator.disconnect(&identity, conn).await {
        state.directory.mark_offline(&identity).await;
    }
    debug!(identity = %identity, "chat socket closed");
}
