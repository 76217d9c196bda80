use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use pairchat_common::{
    HistoryResponse, LoginRequest, LoginResponse, OnlineDetails, OnlineResponse,
    TokenValidateRequest, TokenValidateResponse,
};

use super::{OptionalTokenQuery, TokenQuery};
use crate::{error::Result, AppState, Identity};

pub async fn healthz() -> &'static str {
    "ok"
}

/// POST /api/login - Issue an identity token for an allowed email
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let token = state.directory.login(&req.email).await?;

    Ok(Json(LoginResponse {
        token: token.value,
        email: req.email.trim().to_string(),
        expires_at: token.expires_at,
    }))
}

/// POST /api/token/validate - Validate a token
pub async fn validate_token(
    State(state): State<AppState>,
    Json(req): Json<TokenValidateRequest>,
) -> Json<TokenValidateResponse> {
    match state.directory.token(&req.token).await {
        Some(token) if token.is_valid() => Json(TokenValidateResponse {
            valid: true,
            expires_at: Some(token.expires_at),
        }),
        _ => Json(TokenValidateResponse {
            valid: false,
            expires_at: None,
        }),
    }
}

/// GET /api/chats/:session_id/history?token=xxx - Message log of a live session
pub async fn history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<HistoryResponse>> {
    state.directory.authenticate(&query.token).await?;
    let caller = Identity::from(query.token);
    let messages = state.coordinator.history(&caller, &session_id).await?;

    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

/// GET /api/online - Distinct reachable identities: live sockets plus logged-in tokens
pub async fn online(
    State(state): State<AppState>,
    Query(query): Query<OptionalTokenQuery>,
) -> Result<Json<OnlineResponse>> {
    if let Some(token) = &query.token {
        state.directory.authenticate(token).await?;
    }

    let connected = state.coordinator.connected_identities().await;
    let logged_in = state.directory.logged_in().await;
    let active_connections = connected.len();
    let logged_in_count = logged_in.len();

    let online: HashSet<Identity> = connected.into_iter().chain(logged_in).collect();

    Ok(Json(OnlineResponse {
        online: online.len(),
        details: OnlineDetails {
            active_connections,
            logged_in: logged_in_count,
        },
    }))
}
