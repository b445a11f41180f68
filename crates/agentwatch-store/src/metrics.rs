//! Metric writes and their session aggregate effects
//!
//! Each insert and its aggregate update commit in one transaction, so a
//! concurrent reader never sees a metric row without its effect on the
//! owning session (or vice versa). Token and cost totals are incrementally
//! summed; counts and the coverage percentage are recomputed from child
//! rows. A metric referencing a session with no row leaves the aggregate
//! update a no-op; the metric itself is still persisted.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use agentwatch_core::metrics::{
    Confidence, CoverageRecord, CoverageStatus, Finding, NewCoverageRecord, NewFinding,
    NewTokenMetric, NewToolMetric, Severity, TokenMetric, ToolMetric,
};
use agentwatch_core::{Error, Result};

use crate::store::EventStore;

impl EventStore {
    /// Append a token metric and add its tokens/cost to the owning session.
    pub async fn insert_token_metric(&self, metric: NewTokenMetric) -> Result<TokenMetric> {
        let timestamp = metric.timestamp.unwrap_or_else(Utc::now);
        let total_tokens = metric
            .total_tokens
            .unwrap_or(metric.input_tokens + metric.output_tokens);
        let estimated_cost = metric.estimated_cost.unwrap_or(0.0);

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO token_metrics (
                session_id, source_app, model_name, input_tokens,
                output_tokens, total_tokens, estimated_cost, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metric.session_id)
        .bind(&metric.source_app)
        .bind(&metric.model_name)
        .bind(metric.input_tokens)
        .bind(metric.output_tokens)
        .bind(total_tokens)
        .bind(estimated_cost)
        .bind(timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE sessions
            SET total_tokens = total_tokens + ?,
                total_cost = total_cost + ?
            WHERE session_id = ?
            "#,
        )
        .bind(total_tokens)
        .bind(estimated_cost)
        .bind(&metric.session_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(TokenMetric {
            id: result.last_insert_rowid(),
            session_id: metric.session_id,
            source_app: metric.source_app,
            model_name: metric.model_name,
            input_tokens: metric.input_tokens,
            output_tokens: metric.output_tokens,
            total_tokens,
            estimated_cost,
            timestamp,
        })
    }

    /// Append a tool metric and recompute the session's tool-call count.
    pub async fn insert_tool_metric(&self, metric: NewToolMetric) -> Result<ToolMetric> {
        let timestamp = metric.timestamp.unwrap_or_else(Utc::now);

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO tool_metrics (
                session_id, source_app, tool_name, tool_type, status,
                duration_ms, found_vulnerability, vulnerability_type,
                error_message, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metric.session_id)
        .bind(&metric.source_app)
        .bind(&metric.tool_name)
        .bind(&metric.tool_type)
        .bind(metric.status.as_str())
        .bind(metric.duration_ms)
        .bind(metric.found_vulnerability)
        .bind(&metric.vulnerability_type)
        .bind(&metric.error_message)
        .bind(timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE sessions
            SET total_tool_calls = (
                SELECT COUNT(*) FROM tool_metrics WHERE session_id = ?
            )
            WHERE session_id = ?
            "#,
        )
        .bind(&metric.session_id)
        .bind(&metric.session_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(ToolMetric {
            id: result.last_insert_rowid(),
            session_id: metric.session_id,
            source_app: metric.source_app,
            tool_name: metric.tool_name,
            tool_type: metric.tool_type,
            status: metric.status,
            duration_ms: metric.duration_ms,
            found_vulnerability: metric.found_vulnerability,
            vulnerability_type: metric.vulnerability_type,
            error_message: metric.error_message,
            timestamp,
        })
    }

    /// Upsert a finding on `finding_id` and recompute the session's finding
    /// count. A duplicate submission overwrites the earlier row.
    pub async fn insert_finding(&self, finding: NewFinding) -> Result<Finding> {
        let timestamp = finding.timestamp.unwrap_or_else(Utc::now);

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO findings (
                session_id, source_app, finding_id, vulnerability_type,
                severity, confidence, wstg_id, tool_used, target_url, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(finding_id) DO UPDATE SET
                session_id = excluded.session_id,
                source_app = excluded.source_app,
                vulnerability_type = excluded.vulnerability_type,
                severity = excluded.severity,
                confidence = excluded.confidence,
                wstg_id = excluded.wstg_id,
                tool_used = excluded.tool_used,
                target_url = excluded.target_url,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(&finding.session_id)
        .bind(&finding.source_app)
        .bind(&finding.finding_id)
        .bind(&finding.vulnerability_type)
        .bind(finding.severity.map(|s| s.as_str()))
        .bind(finding.confidence.map(|c| c.as_str()))
        .bind(&finding.wstg_id)
        .bind(&finding.tool_used)
        .bind(&finding.target_url)
        .bind(timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE sessions
            SET total_findings = (
                SELECT COUNT(*) FROM findings WHERE session_id = ?
            )
            WHERE session_id = ?
            "#,
        )
        .bind(&finding.session_id)
        .bind(&finding.session_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let row = sqlx::query("SELECT * FROM findings WHERE finding_id = ?")
            .bind(&finding.finding_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        let stored = row_to_finding(&row)?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(stored)
    }

    /// Upsert a coverage record on `(session_id, wstg_id)` and recompute the
    /// session's coverage percentage over `not_applicable`-excluded totals.
    pub async fn insert_coverage(&self, record: NewCoverageRecord) -> Result<CoverageRecord> {
        let timestamp = record.timestamp.unwrap_or_else(Utc::now);
        let findings_count = record.findings_count.unwrap_or(0);

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO wstg_coverage (
                session_id, source_app, wstg_id, status, findings_count, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id, wstg_id) DO UPDATE SET
                source_app = excluded.source_app,
                status = excluded.status,
                findings_count = excluded.findings_count,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(&record.session_id)
        .bind(&record.source_app)
        .bind(&record.wstg_id)
        .bind(record.status.as_str())
        .bind(findings_count)
        .bind(timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE sessions
            SET wstg_coverage_pct = (
                SELECT CASE
                    WHEN COUNT(*) - SUM(status = 'not_applicable') = 0 THEN 0.0
                    ELSE 100.0 * SUM(status = 'executed')
                         / (COUNT(*) - SUM(status = 'not_applicable'))
                END
                FROM wstg_coverage WHERE session_id = ?
            )
            WHERE session_id = ?
            "#,
        )
        .bind(&record.session_id)
        .bind(&record.session_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let row = sqlx::query("SELECT * FROM wstg_coverage WHERE session_id = ? AND wstg_id = ?")
            .bind(&record.session_id)
            .bind(&record.wstg_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        let stored = row_to_coverage(&row)?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(stored)
    }
}

fn row_to_finding(row: &SqliteRow) -> Result<Finding> {
    let severity: Option<String> = row
        .try_get("severity")
        .map_err(|e| Error::Database(e.to_string()))?;
    let confidence: Option<String> = row
        .try_get("confidence")
        .map_err(|e| Error::Database(e.to_string()))?;

    Ok(Finding {
        id: row.try_get("id").map_err(|e| Error::Database(e.to_string()))?,
        session_id: row
            .try_get("session_id")
            .map_err(|e| Error::Database(e.to_string()))?,
        source_app: row
            .try_get("source_app")
            .map_err(|e| Error::Database(e.to_string()))?,
        finding_id: row
            .try_get("finding_id")
            .map_err(|e| Error::Database(e.to_string()))?,
        vulnerability_type: row
            .try_get("vulnerability_type")
            .map_err(|e| Error::Database(e.to_string()))?,
        severity: severity.as_deref().and_then(Severity::parse),
        confidence: confidence.as_deref().and_then(Confidence::parse),
        wstg_id: row
            .try_get("wstg_id")
            .map_err(|e| Error::Database(e.to_string()))?,
        tool_used: row
            .try_get("tool_used")
            .map_err(|e| Error::Database(e.to_string()))?,
        target_url: row
            .try_get("target_url")
            .map_err(|e| Error::Database(e.to_string()))?,
        timestamp: row
            .try_get("timestamp")
            .map_err(|e| Error::Database(e.to_string()))?,
    })
}

fn row_to_coverage(row: &SqliteRow) -> Result<CoverageRecord> {
    let status: String = row
        .try_get("status")
        .map_err(|e| Error::Database(e.to_string()))?;

    Ok(CoverageRecord {
        id: row.try_get("id").map_err(|e| Error::Database(e.to_string()))?,
        session_id: row
            .try_get("session_id")
            .map_err(|e| Error::Database(e.to_string()))?,
        source_app: row
            .try_get("source_app")
            .map_err(|e| Error::Database(e.to_string()))?,
        wstg_id: row
            .try_get("wstg_id")
            .map_err(|e| Error::Database(e.to_string()))?,
        status: CoverageStatus::parse(&status)
            .ok_or_else(|| Error::Database(format!("invalid coverage status: {}", status)))?,
        findings_count: row
            .try_get("findings_count")
            .map_err(|e| Error::Database(e.to_string()))?,
        timestamp: row
            .try_get("timestamp")
            .map_err(|e| Error::Database(e.to_string()))?,
    })
}
