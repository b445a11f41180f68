//! Hook event endpoints

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::Value;

use agentwatch_core::events::{FilterOptions, HookEvent, NewHookEvent};
use agentwatch_core::stream::StreamMessage;

use crate::error::ApiError;
use crate::AppState;

/// Default window for `GET /events/recent` and the WebSocket backlog.
pub(crate) const RECENT_EVENTS_DEFAULT: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    RECENT_EVENTS_DEFAULT
}

/// `POST /events`: validate, persist, broadcast, return the stored event.
///
/// Validation is a presence check on the required fields; the payload
/// itself is opaque and never rejected on shape.
pub async fn create_event(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<HookEvent>, ApiError> {
    let event: NewHookEvent =
        serde_json::from_value(body).map_err(|_| ApiError::MissingFields)?;

    let stored = state.store.insert_event(event).await?;
    state
        .broadcaster
        .broadcast(&StreamMessage::Event(stored.clone()));

    Ok(Json(stored))
}

/// `GET /events/recent?limit=N`: up to N most recent events, oldest first.
pub async fn recent_events(
    State(state): State<AppState>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<HookEvent>>, ApiError> {
    let events = state.store.recent_events(params.limit).await?;
    Ok(Json(events))
}

/// `GET /events/filter-options`: distinct values for dashboard filters.
pub async fn filter_options(
    State(state): State<AppState>,
) -> Result<Json<FilterOptions>, ApiError> {
    let options = state.store.filter_options().await?;
    Ok(Json(options))
}
