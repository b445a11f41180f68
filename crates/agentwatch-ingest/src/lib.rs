//! Agentwatch Ingestion API and Live Fan-out Channel
//!
//! HTTP surface for hook event producers and dashboard clients:
//! - `POST /events` plus the recent/filter-options reads
//! - `POST /events/{id}/respond` for human-in-the-loop responses
//! - `POST`/`GET /api/metrics/*` for metric ingestion and summaries
//! - `/api/sessions` CRUD
//! - `GET /stream` WebSocket upgrade for the live channel
//!
//! Every successful mutating write broadcasts a typed `{type, data}` message
//! to all connected dashboard clients. CORS is wide open by design: the
//! surface is unauthenticated and intended for local producers and
//! dashboards (a known limitation, not a goal).

pub mod broadcast;
pub mod error;
mod events;
mod hitl;
mod metrics;
mod sessions;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use agentwatch_store::EventStore;

pub use broadcast::Broadcaster;
pub use error::ApiError;
pub use hitl::HitlNotifier;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: EventStore,
    pub broadcaster: Arc<Broadcaster>,
    pub notifier: HitlNotifier,
}

/// Build the Axum router with all routes
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Hook event ingestion
        .route("/events", post(events::create_event))
        .route("/events/recent", get(events::recent_events))
        .route("/events/filter-options", get(events::filter_options))
        .route("/events/{id}/respond", post(hitl::respond))
        // Metric ingestion and summaries
        .route(
            "/api/metrics/tokens",
            post(metrics::create_token_metric).get(metrics::token_stats),
        )
        .route(
            "/api/metrics/tools",
            post(metrics::create_tool_metric).get(metrics::tool_stats),
        )
        .route(
            "/api/metrics/findings",
            post(metrics::create_finding).get(metrics::finding_stats),
        )
        .route(
            "/api/metrics/wstg",
            post(metrics::create_coverage).get(metrics::wstg_stats),
        )
        .route("/api/metrics/dashboard", get(metrics::dashboard_stats))
        // Sessions
        .route(
            "/api/sessions",
            post(sessions::upsert_session).get(sessions::list_sessions),
        )
        .route("/api/sessions/{id}", get(sessions::get_session))
        .route("/api/sessions/{id}/agents", post(sessions::add_agent))
        // Live channel + liveness
        .route("/stream", get(broadcast::stream))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Liveness probe handler
async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
