//! Summary models returned by the aggregation queries

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Token and cost sums for one grouping bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub estimated_cost: f64,
}

/// Token usage rolled up overall and by model / source app.
///
/// Metrics without a model name bucket under `"unknown"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub totals: TokenTotals,
    pub by_model: BTreeMap<String, TokenTotals>,
    pub by_source_app: BTreeMap<String, TokenTotals>,
}

/// Per-tool call outcome statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEffectiveness {
    pub tool_name: String,
    pub total_calls: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub timeout_count: i64,
    /// `100 * success_count / total_calls`, rounded to two decimals;
    /// 0 when there are no calls.
    pub success_rate: f64,
    /// Mean over calls that reported a duration; absent when none did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_duration_ms: Option<f64>,
    pub vulnerabilities_found: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolEffectivenessReport {
    pub tools: Vec<ToolEffectiveness>,
}

/// Finding counts broken down along each reporting axis.
///
/// A finding with no severity or confidence buckets under `"unknown"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingSummary {
    pub total: i64,
    pub by_severity: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub by_source_app: BTreeMap<String, i64>,
    pub by_confidence: BTreeMap<String, i64>,
}

/// Coverage over one checklist category (the middle segment of the
/// `PREFIX-CATEGORY-NUMBER` item identifier).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryCoverage {
    pub total: i64,
    pub executed: i64,
    pub not_applicable: i64,
    pub coverage_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total_items: i64,
    pub by_status: BTreeMap<String, i64>,
    /// `100 * executed / (total - not_applicable)`, 0 when the denominator
    /// is 0.
    pub coverage_percentage: f64,
    pub by_category: BTreeMap<String, CategoryCoverage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCounts {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
}

/// Point-in-time dashboard snapshot composing all summaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsDashboard {
    pub sessions: SessionCounts,
    pub tokens: TokenSummary,
    pub tools: ToolEffectivenessReport,
    pub findings: FindingSummary,
    pub coverage: CoverageReport,
}
