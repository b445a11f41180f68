//! Metric and session models
//!
//! Token and tool metrics are append-only rows; findings and coverage
//! records are upserts (keyed on `finding_id` and `(session_id, wstg_id)`
//! respectively). Every metric row carries the `session_id` of the run that
//! produced it and feeds that session's aggregate fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Failure,
    Timeout,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Failure => "failure",
            ToolStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ToolStatus::Success),
            "failure" => Some(ToolStatus::Failure),
            "timeout" => Some(ToolStatus::Timeout),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Confirmed,
    Likely,
    Possible,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Confirmed => "confirmed",
            Confidence::Likely => "likely",
            Confidence::Possible => "possible",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(Confidence::Confirmed),
            "likely" => Some(Confidence::Likely),
            "possible" => Some(Confidence::Possible),
            _ => None,
        }
    }
}

/// Whether a coverage item (one checklist entry) was exercised in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Executed,
    Skipped,
    Partial,
    NotApplicable,
}

impl CoverageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageStatus::Executed => "executed",
            CoverageStatus::Skipped => "skipped",
            CoverageStatus::Partial => "partial",
            CoverageStatus::NotApplicable => "not_applicable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "executed" => Some(CoverageStatus::Executed),
            "skipped" => Some(CoverageStatus::Skipped),
            "partial" => Some(CoverageStatus::Partial),
            "not_applicable" => Some(CoverageStatus::NotApplicable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Timeout,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SessionStatus::Running),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "timeout" => Some(SessionStatus::Timeout),
            _ => None,
        }
    }
}

/// Token usage reported by one model turn. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetric {
    pub id: i64,
    pub session_id: String,
    pub source_app: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub estimated_cost: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTokenMetric {
    pub session_id: String,
    pub source_app: String,
    #[serde(default)]
    pub model_name: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    /// Defaults to `input_tokens + output_tokens` when omitted.
    #[serde(default)]
    pub total_tokens: Option<i64>,
    #[serde(default)]
    pub estimated_cost: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A single tool invocation observed in a run. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetric {
    pub id: i64,
    pub session_id: String,
    pub source_app: String,
    pub tool_name: String,
    pub tool_type: String,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub found_vulnerability: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerability_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewToolMetric {
    pub session_id: String,
    pub source_app: String,
    pub tool_name: String,
    pub tool_type: String,
    pub status: ToolStatus,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub found_vulnerability: bool,
    #[serde(default)]
    pub vulnerability_type: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A security finding. Upserted on `finding_id`: duplicate submissions
/// overwrite the earlier row rather than accumulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: i64,
    pub session_id: String,
    pub source_app: String,
    pub finding_id: String,
    pub vulnerability_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wstg_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFinding {
    pub session_id: String,
    pub source_app: String,
    pub finding_id: String,
    pub vulnerability_type: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub wstg_id: Option<String>,
    #[serde(default)]
    pub tool_used: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One checklist entry recorded once per session, upserted on
/// `(session_id, wstg_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    pub id: i64,
    pub session_id: String,
    pub source_app: String,
    pub wstg_id: String,
    pub status: CoverageStatus,
    pub findings_count: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCoverageRecord {
    pub session_id: String,
    pub source_app: String,
    pub wstg_id: String,
    pub status: CoverageStatus,
    #[serde(default)]
    pub findings_count: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One continuous agent run and its derived aggregates.
///
/// Token and cost totals are incrementally summed as metrics arrive; counts
/// and the coverage percentage are recomputed from child rows on every
/// contributing write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub total_findings: i64,
    pub total_tool_calls: i64,
    pub agents_used: Vec<String>,
    pub wstg_coverage_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub session_id: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trips() {
        for status in [
            CoverageStatus::Executed,
            CoverageStatus::Skipped,
            CoverageStatus::Partial,
            CoverageStatus::NotApplicable,
        ] {
            assert_eq!(CoverageStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(
            serde_json::to_value(CoverageStatus::NotApplicable).unwrap(),
            json!("not_applicable")
        );
    }

    #[test]
    fn test_new_token_metric_defaults() {
        let metric: NewTokenMetric = serde_json::from_value(json!({
            "session_id": "s1",
            "source_app": "agentA",
            "input_tokens": 100,
            "output_tokens": 50
        }))
        .unwrap();
        assert_eq!(metric.total_tokens, None);
        assert_eq!(metric.estimated_cost, None);

        let invalid: Result<NewToolMetric, _> = serde_json::from_value(json!({
            "session_id": "s1",
            "source_app": "agentA",
            "tool_name": "nmap",
            "tool_type": "scanner",
            "status": "exploded"
        }));
        assert!(invalid.is_err());
    }
}
