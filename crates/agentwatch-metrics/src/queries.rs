//! Aggregation queries
//!
//! Every function takes a `&mut SqliteConnection` so the dashboard snapshot
//! can run all of them inside one transaction: a single point-in-time view
//! of a WAL database, eventually consistent with respect to in-flight
//! writes rather than strictly serializable.

use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::Row;

use agentwatch_core::{Error, Result};

use crate::models::{
    CoverageReport, FindingSummary, MetricsDashboard, SessionCounts, TokenSummary, TokenTotals,
    ToolEffectiveness, ToolEffectivenessReport,
};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Token and cost sums, grouped by model and by source app.
pub async fn token_summary(
    conn: &mut SqliteConnection,
    session_id: Option<&str>,
) -> Result<TokenSummary> {
    let filter = if session_id.is_some() {
        "WHERE session_id = ?"
    } else {
        ""
    };
    let sql = format!(
        r#"
        SELECT
            COALESCE(model_name, 'unknown') AS model,
            source_app,
            COALESCE(SUM(input_tokens), 0) AS input_tokens,
            COALESCE(SUM(output_tokens), 0) AS output_tokens,
            COALESCE(SUM(total_tokens), 0) AS total_tokens,
            COALESCE(SUM(estimated_cost), 0.0) AS estimated_cost
        FROM token_metrics
        {}
        GROUP BY model, source_app
        "#,
        filter
    );

    let mut query = sqlx::query(&sql);
    if let Some(sid) = session_id {
        query = query.bind(sid);
    }
    let rows = query
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    let mut summary = TokenSummary::default();
    for row in rows {
        let model: String = row
            .try_get("model")
            .map_err(|e| Error::Database(e.to_string()))?;
        let source_app: String = row
            .try_get("source_app")
            .map_err(|e| Error::Database(e.to_string()))?;
        let bucket = TokenTotals {
            input_tokens: row
                .try_get("input_tokens")
                .map_err(|e| Error::Database(e.to_string()))?,
            output_tokens: row
                .try_get("output_tokens")
                .map_err(|e| Error::Database(e.to_string()))?,
            total_tokens: row
                .try_get("total_tokens")
                .map_err(|e| Error::Database(e.to_string()))?,
            estimated_cost: row
                .try_get("estimated_cost")
                .map_err(|e| Error::Database(e.to_string()))?,
        };

        add_totals(&mut summary.totals, &bucket);
        add_totals(summary.by_model.entry(model).or_default(), &bucket);
        add_totals(summary.by_source_app.entry(source_app).or_default(), &bucket);
    }

    Ok(summary)
}

fn add_totals(acc: &mut TokenTotals, bucket: &TokenTotals) {
    acc.input_tokens += bucket.input_tokens;
    acc.output_tokens += bucket.output_tokens;
    acc.total_tokens += bucket.total_tokens;
    acc.estimated_cost += bucket.estimated_cost;
}

/// Per-tool call counts, outcomes, success rate, and mean duration.
pub async fn tool_effectiveness(
    conn: &mut SqliteConnection,
    session_id: Option<&str>,
) -> Result<ToolEffectivenessReport> {
    let filter = if session_id.is_some() {
        "WHERE session_id = ?"
    } else {
        ""
    };
    let sql = format!(
        r#"
        SELECT
            tool_name,
            COUNT(*) AS total_calls,
            COALESCE(SUM(status = 'success'), 0) AS success_count,
            COALESCE(SUM(status = 'failure'), 0) AS failure_count,
            COALESCE(SUM(status = 'timeout'), 0) AS timeout_count,
            AVG(duration_ms) AS avg_duration_ms,
            COALESCE(SUM(found_vulnerability), 0) AS vulnerabilities_found
        FROM tool_metrics
        {}
        GROUP BY tool_name
        ORDER BY total_calls DESC, tool_name ASC
        "#,
        filter
    );

    let mut query = sqlx::query(&sql);
    if let Some(sid) = session_id {
        query = query.bind(sid);
    }
    let rows = query
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    let mut tools = Vec::with_capacity(rows.len());
    for row in rows {
        let total_calls: i64 = row
            .try_get("total_calls")
            .map_err(|e| Error::Database(e.to_string()))?;
        let success_count: i64 = row
            .try_get("success_count")
            .map_err(|e| Error::Database(e.to_string()))?;
        let success_rate = if total_calls == 0 {
            0.0
        } else {
            round2(100.0 * success_count as f64 / total_calls as f64)
        };

        tools.push(ToolEffectiveness {
            tool_name: row
                .try_get("tool_name")
                .map_err(|e| Error::Database(e.to_string()))?,
            total_calls,
            success_count,
            failure_count: row
                .try_get("failure_count")
                .map_err(|e| Error::Database(e.to_string()))?,
            timeout_count: row
                .try_get("timeout_count")
                .map_err(|e| Error::Database(e.to_string()))?,
            success_rate,
            avg_duration_ms: row
                .try_get("avg_duration_ms")
                .map_err(|e| Error::Database(e.to_string()))?,
            vulnerabilities_found: row
                .try_get("vulnerabilities_found")
                .map_err(|e| Error::Database(e.to_string()))?,
        });
    }

    Ok(ToolEffectivenessReport { tools })
}

/// Finding counts broken down by severity, type, source app, and
/// confidence. Missing severity/confidence buckets under `"unknown"`.
pub async fn finding_summary(
    conn: &mut SqliteConnection,
    session_id: Option<&str>,
) -> Result<FindingSummary> {
    let filter = if session_id.is_some() {
        "WHERE session_id = ?"
    } else {
        ""
    };
    let sql = format!(
        "SELECT severity, vulnerability_type, source_app, confidence FROM findings {}",
        filter
    );

    let mut query = sqlx::query(&sql);
    if let Some(sid) = session_id {
        query = query.bind(sid);
    }
    let rows = query
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    let mut summary = FindingSummary::default();
    for row in rows {
        let severity: Option<String> = row
            .try_get("severity")
            .map_err(|e| Error::Database(e.to_string()))?;
        let vulnerability_type: String = row
            .try_get("vulnerability_type")
            .map_err(|e| Error::Database(e.to_string()))?;
        let source_app: String = row
            .try_get("source_app")
            .map_err(|e| Error::Database(e.to_string()))?;
        let confidence: Option<String> = row
            .try_get("confidence")
            .map_err(|e| Error::Database(e.to_string()))?;

        summary.total += 1;
        *summary
            .by_severity
            .entry(severity.unwrap_or_else(|| "unknown".to_string()))
            .or_default() += 1;
        *summary.by_type.entry(vulnerability_type).or_default() += 1;
        *summary.by_source_app.entry(source_app).or_default() += 1;
        *summary
            .by_confidence
            .entry(confidence.unwrap_or_else(|| "unknown".to_string()))
            .or_default() += 1;
    }

    Ok(summary)
}

/// Coverage status counts and the `not_applicable`-excluded percentage,
/// plus a per-category breakdown keyed on the middle segment of the item
/// identifier (`WSTG-ATHN-04` → `ATHN`; malformed ids bucket as `other`).
pub async fn coverage_report(
    conn: &mut SqliteConnection,
    session_id: Option<&str>,
) -> Result<CoverageReport> {
    let filter = if session_id.is_some() {
        "WHERE session_id = ?"
    } else {
        ""
    };
    let sql = format!("SELECT wstg_id, status FROM wstg_coverage {}", filter);

    let mut query = sqlx::query(&sql);
    if let Some(sid) = session_id {
        query = query.bind(sid);
    }
    let rows = query
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    let mut report = CoverageReport::default();
    for row in rows {
        let wstg_id: String = row
            .try_get("wstg_id")
            .map_err(|e| Error::Database(e.to_string()))?;
        let status: String = row
            .try_get("status")
            .map_err(|e| Error::Database(e.to_string()))?;

        report.total_items += 1;
        *report.by_status.entry(status.clone()).or_default() += 1;

        let category = wstg_id
            .split('-')
            .nth(1)
            .filter(|segment| !segment.is_empty())
            .unwrap_or("other")
            .to_string();
        let bucket = report.by_category.entry(category).or_default();
        bucket.total += 1;
        match status.as_str() {
            "executed" => bucket.executed += 1,
            "not_applicable" => bucket.not_applicable += 1,
            _ => {}
        }
    }

    report.coverage_percentage = percentage(
        report.by_status.get("executed").copied().unwrap_or(0),
        report.total_items - report.by_status.get("not_applicable").copied().unwrap_or(0),
    );
    for bucket in report.by_category.values_mut() {
        bucket.coverage_percentage =
            percentage(bucket.executed, bucket.total - bucket.not_applicable);
    }

    Ok(report)
}

fn percentage(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        round2(100.0 * numerator as f64 / denominator as f64)
    }
}

/// Session counts by status plus every summary, computed inside a single
/// transaction so the snapshot is one point-in-time view.
pub async fn dashboard(pool: &SqlitePool) -> Result<MetricsDashboard> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM sessions GROUP BY status")
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    let mut sessions = SessionCounts::default();
    for row in rows {
        let status: String = row
            .try_get("status")
            .map_err(|e| Error::Database(e.to_string()))?;
        let count: i64 = row
            .try_get("count")
            .map_err(|e| Error::Database(e.to_string()))?;
        sessions.total += count;
        sessions.by_status.insert(status, count);
    }

    let tokens = token_summary(&mut tx, None).await?;
    let tools = tool_effectiveness(&mut tx, None).await?;
    let findings = finding_summary(&mut tx, None).await?;
    let coverage = coverage_report(&mut tx, None).await?;

    tx.commit()
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    Ok(MetricsDashboard {
        sessions,
        tokens,
        tools,
        findings,
        coverage,
    })
}
