//! Session endpoints

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::Value;

use agentwatch_core::metrics::{NewSession, Session};
use agentwatch_core::stream::StreamMessage;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_list_limit")]
    limit: i64,
}

fn default_list_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
struct AddAgentRequest {
    agent: String,
}

/// `POST /api/sessions`: create or update a session.
pub async fn upsert_session(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Session>, ApiError> {
    let session: NewSession =
        serde_json::from_value(body).map_err(|_| ApiError::MissingFields)?;

    let stored = state.store.upsert_session(session).await?;
    state
        .broadcaster
        .broadcast(&StreamMessage::SessionUpdate(stored.clone()));

    Ok(Json(stored))
}

/// `GET /api/sessions?limit=N`: most recently started sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let sessions = state.store.list_sessions(params.limit).await?;
    Ok(Json(sessions))
}

/// `GET /api/sessions/{id}`: one session, 404 when unknown.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let session = state.store.get_session(&id).await?;
    Ok(Json(session))
}

/// `POST /api/sessions/{id}/agents`: record an agent as used by the run.
pub async fn add_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Session>, ApiError> {
    let request: AddAgentRequest =
        serde_json::from_value(body).map_err(|_| ApiError::MissingFields)?;

    let updated = state.store.add_session_agent(&id, &request.agent).await?;
    state
        .broadcaster
        .broadcast(&StreamMessage::SessionUpdate(updated.clone()));

    Ok(Json(updated))
}
