//! Human-in-the-loop response endpoint and callback delivery
//!
//! The response is durably recorded first; delivery back to the requester is
//! a spawned best-effort attempt against the `callback_url` embedded in the
//! event's `humanInTheLoop` object. A failed delivery leaves the event
//! `responded`: the response is on record even if the requester never hears
//! about it.

use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use serde_json::Value;

use agentwatch_core::Error;
use agentwatch_core::events::HookEvent;
use agentwatch_core::stream::StreamMessage;

use crate::AppState;
use crate::error::ApiError;

/// Fixed window for one delivery attempt; after it, give up and log.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers recorded responses back to the original requester.
#[derive(Clone)]
pub struct HitlNotifier {
    client: reqwest::Client,
}

impl HitlNotifier {
    pub fn new() -> agentwatch_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Fire-and-forget delivery of the event's recorded response.
    ///
    /// No-op when the HITL request embeds no `callback_url`. Failures are
    /// logged and never surfaced to the HTTP caller.
    pub fn deliver(&self, event: &HookEvent) {
        let Some(url) = event
            .human_in_the_loop
            .as_ref()
            .and_then(|hitl| hitl.get("callback_url"))
            .and_then(Value::as_str)
        else {
            return;
        };

        let Some(response) = event.human_in_the_loop_response.clone() else {
            return;
        };

        let client = self.client.clone();
        let url = url.to_string();
        let event_id = event.id;
        tokio::spawn(async move {
            match client.post(&url).json(&response).send().await {
                Ok(res) if res.status().is_success() => {
                    tracing::debug!(event_id, %url, "HITL response delivered");
                }
                Ok(res) => {
                    tracing::warn!(
                        event_id, %url, status = %res.status(),
                        "HITL callback rejected the response"
                    );
                }
                Err(e) => {
                    tracing::warn!(event_id, %url, error = %e, "HITL callback delivery failed");
                }
            }
        });
    }
}

/// `POST /events/{id}/respond`: record the response, notify the requester,
/// broadcast the updated event. 404 for an unknown event id.
pub async fn respond(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<Json<HookEvent>, ApiError> {
    let updated = state.store.update_hitl_response(id, body).await?;

    state.notifier.deliver(&updated);
    state
        .broadcaster
        .broadcast(&StreamMessage::Event(updated.clone()));

    Ok(Json(updated))
}
