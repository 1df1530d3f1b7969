//! Session and message routes.

use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use datachat_types::{ChatMessage, Session};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Deserialize, Default)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub session_id: i64,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), (StatusCode, String)> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let session = state
        .store
        .create_session(req.title.as_deref())
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(target: "datachat::api", "Created session {}", session.id);
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id,
        }),
    ))
}

#[derive(Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<Session>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionListResponse>, (StatusCode, String)> {
    let sessions = state
        .store
        .list_sessions()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(SessionListResponse { sessions }))
}

/// Delete a session, cascading to its messages, results and file binding.
/// Idempotent: deleting a nonexistent session succeeds.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .store
        .delete_session(id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<ChatMessage>,
}

/// List a session's messages in chronological order, including any attached
/// query result payloads.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MessageListResponse>, (StatusCode, String)> {
    let exists = state
        .store
        .session_exists(id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if !exists {
        return Err((StatusCode::NOT_FOUND, "Session not found".to_string()));
    }

    let messages = state
        .store
        .list_messages(id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(MessageListResponse { messages }))
}
