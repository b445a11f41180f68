//! Event log operations
//!
//! Events are append-only. The single post-insert mutation allowed is the
//! human-in-the-loop response transition handled by `update_hitl_response`.

use chrono::Utc;
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use agentwatch_core::events::{FilterOptions, HitlStatus, HookEvent, NewHookEvent};
use agentwatch_core::{Error, Result};

use crate::store::EventStore;

/// How many distinct session ids the filter options expose.
const FILTER_SESSION_LIMIT: i64 = 300;

impl EventStore {
    /// Append a hook event, assigning its id and (if absent) timestamp.
    ///
    /// An event that carries a `humanInTheLoop` request with no status is
    /// initialized to `pending`. The payload is opaque: no shape is ever
    /// rejected.
    pub async fn insert_event(&self, event: NewHookEvent) -> Result<HookEvent> {
        let timestamp = event.timestamp.unwrap_or_else(Utc::now);
        let hitl_status = event
            .human_in_the_loop_status
            .or(event.human_in_the_loop.as_ref().map(|_| HitlStatus::Pending));

        let payload = serde_json::to_string(&event.payload)?;
        let chat = event
            .chat
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let human_in_the_loop = event
            .human_in_the_loop
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO events (
                source_app, session_id, hook_event_type, payload, chat,
                summary, timestamp, model_name, human_in_the_loop,
                human_in_the_loop_status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.source_app)
        .bind(&event.session_id)
        .bind(&event.hook_event_type)
        .bind(&payload)
        .bind(&chat)
        .bind(&event.summary)
        .bind(timestamp)
        .bind(&event.model_name)
        .bind(&human_in_the_loop)
        .bind(hitl_status.map(|s| s.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        self.get_event(result.last_insert_rowid()).await
    }

    /// Fetch one event by id.
    pub async fn get_event(&self, id: i64) -> Result<HookEvent> {
        let row = sqlx::query("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .ok_or(Error::EventNotFound(id))?;

        row_to_event(&row)
    }

    /// The most recent `limit` events, returned oldest first.
    pub async fn recent_events(&self, limit: i64) -> Result<Vec<HookEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM events
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let mut events = rows
            .iter()
            .map(row_to_event)
            .collect::<Result<Vec<_>>>()?;
        events.reverse();
        Ok(events)
    }

    /// Record a human-in-the-loop response: status becomes `responded`, the
    /// response payload is stored, and `respondedAt` is stamped.
    ///
    /// # Errors
    /// - `Error::EventNotFound` if no event has this id
    pub async fn update_hitl_response(&self, id: i64, response: Value) -> Result<HookEvent> {
        let response_text = serde_json::to_string(&response)?;

        let result = sqlx::query(
            r#"
            UPDATE events
            SET human_in_the_loop_status = 'responded',
                human_in_the_loop_response = ?,
                responded_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&response_text)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::EventNotFound(id));
        }

        self.get_event(id).await
    }

    /// Distinct filter values for the dashboard, each sorted.
    ///
    /// Session ids are capped to the most recently seen 300.
    pub async fn filter_options(&self) -> Result<FilterOptions> {
        let source_apps: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT source_app FROM events ORDER BY source_app")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        let mut session_ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT session_id FROM events
            GROUP BY session_id
            ORDER BY MAX(id) DESC
            LIMIT ?
            "#,
        )
        .bind(FILTER_SESSION_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        session_ids.sort();

        let hook_event_types: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT hook_event_type FROM events ORDER BY hook_event_type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(FilterOptions {
            source_apps,
            session_ids,
            hook_event_types,
        })
    }
}

fn row_to_event(row: &SqliteRow) -> Result<HookEvent> {
    let payload: String = row
        .try_get("payload")
        .map_err(|e| Error::Database(e.to_string()))?;
    let status: Option<String> = row
        .try_get("human_in_the_loop_status")
        .map_err(|e| Error::Database(e.to_string()))?;

    Ok(HookEvent {
        id: row.try_get("id").map_err(|e| Error::Database(e.to_string()))?,
        source_app: row
            .try_get("source_app")
            .map_err(|e| Error::Database(e.to_string()))?,
        session_id: row
            .try_get("session_id")
            .map_err(|e| Error::Database(e.to_string()))?,
        hook_event_type: row
            .try_get("hook_event_type")
            .map_err(|e| Error::Database(e.to_string()))?,
        payload: serde_json::from_str(&payload)?,
        chat: json_column(row, "chat")?,
        summary: row
            .try_get("summary")
            .map_err(|e| Error::Database(e.to_string()))?,
        timestamp: row
            .try_get("timestamp")
            .map_err(|e| Error::Database(e.to_string()))?,
        model_name: row
            .try_get("model_name")
            .map_err(|e| Error::Database(e.to_string()))?,
        human_in_the_loop: json_column(row, "human_in_the_loop")?,
        human_in_the_loop_status: status.as_deref().and_then(HitlStatus::parse),
        human_in_the_loop_response: json_column(row, "human_in_the_loop_response")?,
        responded_at: row
            .try_get("responded_at")
            .map_err(|e| Error::Database(e.to_string()))?,
    })
}

/// Decode a nullable TEXT column holding serialized JSON.
fn json_column(row: &SqliteRow, column: &str) -> Result<Option<Value>> {
    let text: Option<String> = row
        .try_get(column)
        .map_err(|e| Error::Database(e.to_string()))?;
    Ok(text.as_deref().map(serde_json::from_str).transpose()?)
}
