//! Session operations
//!
//! A session row is created on first upsert and mutated additively by the
//! metric writes that reference it. Once the status leaves `running` the
//! session is terminal: later upserts can still fill in metadata but can
//! neither resurrect it nor move it between terminal states.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use agentwatch_core::metrics::{NewSession, Session, SessionStatus};
use agentwatch_core::{Error, Result};

use crate::store::EventStore;

impl EventStore {
    /// Create or update a session.
    ///
    /// `client_name`/`target_url` merge (an omitted field never clears a
    /// stored one); `ended_at` is stamped when the status leaves `running`.
    pub async fn upsert_session(&self, session: NewSession) -> Result<Session> {
        let started_at = session.started_at.unwrap_or_else(Utc::now);
        let status = session.status.unwrap_or(SessionStatus::Running);
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, client_name, target_url, status, started_at, ended_at)
            VALUES (?1, ?2, ?3, ?4, ?5, CASE WHEN ?4 = 'running' THEN NULL ELSE ?6 END)
            ON CONFLICT(session_id) DO UPDATE SET
                client_name = COALESCE(excluded.client_name, sessions.client_name),
                target_url = COALESCE(excluded.target_url, sessions.target_url),
                status = CASE
                    WHEN sessions.status = 'running' THEN excluded.status
                    ELSE sessions.status
                END,
                ended_at = CASE
                    WHEN sessions.status = 'running' AND excluded.status <> 'running' THEN ?6
                    ELSE sessions.ended_at
                END
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.client_name)
        .bind(&session.target_url)
        .bind(status.as_str())
        .bind(started_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        self.get_session(&session.session_id).await
    }

    /// Fetch one session by id.
    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        row_to_session(&row)
    }

    /// Sessions ordered most recently started first.
    pub async fn list_sessions(&self, limit: i64) -> Result<Vec<Session>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM sessions
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.iter().map(row_to_session).collect()
    }

    /// Add an agent name to the session's `agents_used` list (deduplicated).
    ///
    /// # Errors
    /// - `Error::SessionNotFound` if no session has this id
    pub async fn add_session_agent(&self, session_id: &str, agent: &str) -> Result<Session> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let agents_text: Option<String> =
            sqlx::query_scalar("SELECT agents_used FROM sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;

        let agents_text =
            agents_text.ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        let mut agents: Vec<String> = serde_json::from_str(&agents_text)?;

        if !agents.iter().any(|a| a == agent) {
            agents.push(agent.to_string());
            sqlx::query("UPDATE sessions SET agents_used = ? WHERE session_id = ?")
                .bind(serde_json::to_string(&agents)?)
                .bind(session_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        self.get_session(session_id).await
    }
}

fn row_to_session(row: &SqliteRow) -> Result<Session> {
    let status: String = row
        .try_get("status")
        .map_err(|e| Error::Database(e.to_string()))?;
    let agents_text: String = row
        .try_get("agents_used")
        .map_err(|e| Error::Database(e.to_string()))?;

    Ok(Session {
        session_id: row
            .try_get("session_id")
            .map_err(|e| Error::Database(e.to_string()))?,
        client_name: row
            .try_get("client_name")
            .map_err(|e| Error::Database(e.to_string()))?,
        target_url: row
            .try_get("target_url")
            .map_err(|e| Error::Database(e.to_string()))?,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| Error::Database(format!("invalid session status: {}", status)))?,
        started_at: row
            .try_get("started_at")
            .map_err(|e| Error::Database(e.to_string()))?,
        ended_at: row
            .try_get("ended_at")
            .map_err(|e| Error::Database(e.to_string()))?,
        total_tokens: row
            .try_get("total_tokens")
            .map_err(|e| Error::Database(e.to_string()))?,
        total_cost: row
            .try_get("total_cost")
            .map_err(|e| Error::Database(e.to_string()))?,
        total_findings: row
            .try_get("total_findings")
            .map_err(|e| Error::Database(e.to_string()))?,
        total_tool_calls: row
            .try_get("total_tool_calls")
            .map_err(|e| Error::Database(e.to_string()))?,
        agents_used: serde_json::from_str(&agents_text)?,
        wstg_coverage_pct: row
            .try_get("wstg_coverage_pct")
            .map_err(|e| Error::Database(e.to_string()))?,
    })
}
