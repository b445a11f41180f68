//! Metric ingestion endpoints and summary reads
//!
//! Each POST validates its required-field subset, persists through the
//! store (insert + session aggregate in one transaction), broadcasts its
//! typed update, and returns the stored row. Each GET serves the matching
//! aggregation, optionally scoped by `?session_id=`.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::Value;

use agentwatch_core::metrics::{
    CoverageRecord, Finding, NewCoverageRecord, NewFinding, NewTokenMetric, NewToolMetric,
    TokenMetric, ToolMetric,
};
use agentwatch_core::stream::StreamMessage;
use agentwatch_metrics::{
    CoverageReport, FindingSummary, MetricsDashboard, TokenSummary, ToolEffectivenessReport,
};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    session_id: Option<String>,
}

pub async fn create_token_metric(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<TokenMetric>, ApiError> {
    let metric: NewTokenMetric =
        serde_json::from_value(body).map_err(|_| ApiError::MissingFields)?;

    let stored = state.store.insert_token_metric(metric).await?;
    state
        .broadcaster
        .broadcast(&StreamMessage::TokenUpdate(stored.clone()));

    Ok(Json(stored))
}

pub async fn create_tool_metric(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ToolMetric>, ApiError> {
    let metric: NewToolMetric =
        serde_json::from_value(body).map_err(|_| ApiError::MissingFields)?;

    let stored = state.store.insert_tool_metric(metric).await?;
    state
        .broadcaster
        .broadcast(&StreamMessage::ToolUpdate(stored.clone()));

    Ok(Json(stored))
}

pub async fn create_finding(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Finding>, ApiError> {
    let finding: NewFinding =
        serde_json::from_value(body).map_err(|_| ApiError::MissingFields)?;

    let stored = state.store.insert_finding(finding).await?;
    state
        .broadcaster
        .broadcast(&StreamMessage::FindingUpdate(stored.clone()));

    Ok(Json(stored))
}

pub async fn create_coverage(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<CoverageRecord>, ApiError> {
    let record: NewCoverageRecord =
        serde_json::from_value(body).map_err(|_| ApiError::MissingFields)?;

    let stored = state.store.insert_coverage(record).await?;
    state
        .broadcaster
        .broadcast(&StreamMessage::WstgUpdate(stored.clone()));

    Ok(Json(stored))
}

pub async fn token_stats(
    State(state): State<AppState>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<TokenSummary>, ApiError> {
    let mut conn = state.store.acquire().await?;
    let summary =
        agentwatch_metrics::token_summary(&mut conn, params.session_id.as_deref()).await?;
    Ok(Json(summary))
}

pub async fn tool_stats(
    State(state): State<AppState>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<ToolEffectivenessReport>, ApiError> {
    let mut conn = state.store.acquire().await?;
    let report =
        agentwatch_metrics::tool_effectiveness(&mut conn, params.session_id.as_deref()).await?;
    Ok(Json(report))
}

pub async fn finding_stats(
    State(state): State<AppState>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<FindingSummary>, ApiError> {
    let mut conn = state.store.acquire().await?;
    let summary =
        agentwatch_metrics::finding_summary(&mut conn, params.session_id.as_deref()).await?;
    Ok(Json(summary))
}

pub async fn wstg_stats(
    State(state): State<AppState>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<CoverageReport>, ApiError> {
    let mut conn = state.store.acquire().await?;
    let report =
        agentwatch_metrics::coverage_report(&mut conn, params.session_id.as_deref()).await?;
    Ok(Json(report))
}

/// `GET /api/metrics/dashboard`: one point-in-time snapshot of everything.
pub async fn dashboard_stats(
    State(state): State<AppState>,
) -> Result<Json<MetricsDashboard>, ApiError> {
    let snapshot = agentwatch_metrics::dashboard(state.store.pool()).await?;
    Ok(Json(snapshot))
}
