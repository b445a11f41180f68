//! Store handle and schema management

use std::path::{Path, PathBuf};

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use agentwatch_core::{Error, Result};

/// Current schema version. Schema changes are additive: bump the version and
/// append the `ALTER TABLE ... ADD COLUMN` statements for it in
/// `apply_migrations` so existing databases upgrade in place.
const SCHEMA_VERSION: i32 = 1;

/// Handle to the SQLite-backed event store.
///
/// Cheap to clone; all clones share one WAL-mode connection pool, so
/// concurrent readers proceed while writes serialize at the storage layer.
#[derive(Clone)]
pub struct EventStore {
    pub(crate) pool: SqlitePool,
}

impl EventStore {
    /// Open (or create) the store at `db_path`.
    ///
    /// # Errors
    /// - `Error::Database` if the connection or schema setup fails
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = expand_tilde(db_path.as_ref().to_path_buf())?;

        // Create directory if needed
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&db_path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal),
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Self::initialize_schema(&pool).await?;

        // Verify schema version
        let version: i32 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(&pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if version != SCHEMA_VERSION {
            return Err(Error::Database(format!(
                "Unsupported schema version: {}",
                version
            )));
        }

        tracing::debug!(db_path = %db_path.display(), "event store opened");

        Ok(Self { pool })
    }

    /// The underlying pool, for read-side aggregation queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check out one connection from the pool.
    pub async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
        // Schema version table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (1)")
            .execute(pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        // Append-only hook event log
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_app TEXT NOT NULL,
                session_id TEXT NOT NULL,
                hook_event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                chat TEXT,
                summary TEXT,
                timestamp TIMESTAMP NOT NULL,
                model_name TEXT,
                human_in_the_loop TEXT,
                human_in_the_loop_status TEXT,
                human_in_the_loop_response TEXT,
                responded_at TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_events_source_app ON events(source_app)",
            "CREATE INDEX IF NOT EXISTS idx_events_type ON events(hook_event_type)",
            "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp DESC)",
        ] {
            sqlx::query(index)
                .execute(pool)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        }

        // Token metrics table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS token_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                source_app TEXT NOT NULL,
                model_name TEXT,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                estimated_cost REAL NOT NULL DEFAULT 0,
                timestamp TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_token_metrics_session ON token_metrics(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_token_metrics_model ON token_metrics(model_name, timestamp DESC)",
        ] {
            sqlx::query(index)
                .execute(pool)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        }

        // Tool metrics table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tool_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                source_app TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                tool_type TEXT NOT NULL,
                status TEXT NOT NULL,
                duration_ms INTEGER,
                found_vulnerability BOOLEAN NOT NULL DEFAULT 0,
                vulnerability_type TEXT,
                error_message TEXT,
                timestamp TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_tool_metrics_session ON tool_metrics(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_tool_metrics_name ON tool_metrics(tool_name, timestamp DESC)",
            "CREATE INDEX IF NOT EXISTS idx_tool_metrics_status ON tool_metrics(status)",
        ] {
            sqlx::query(index)
                .execute(pool)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        }

        // Findings table, upserted on finding_id
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS findings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                source_app TEXT NOT NULL,
                finding_id TEXT NOT NULL UNIQUE,
                vulnerability_type TEXT NOT NULL,
                severity TEXT,
                confidence TEXT,
                wstg_id TEXT,
                tool_used TEXT,
                target_url TEXT,
                timestamp TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_findings_session ON findings(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_findings_severity ON findings(severity)",
        ] {
            sqlx::query(index)
                .execute(pool)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        }

        // Coverage table, one row per checklist item per session
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wstg_coverage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                source_app TEXT NOT NULL,
                wstg_id TEXT NOT NULL,
                status TEXT NOT NULL,
                findings_count INTEGER NOT NULL DEFAULT 0,
                timestamp TIMESTAMP NOT NULL,
                UNIQUE(session_id, wstg_id)
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_wstg_coverage_session ON wstg_coverage(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_wstg_coverage_status ON wstg_coverage(status)",
        ] {
            sqlx::query(index)
                .execute(pool)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        }

        // Sessions table with derived aggregates
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                client_name TEXT,
                target_url TEXT,
                status TEXT NOT NULL DEFAULT 'running',
                started_at TIMESTAMP NOT NULL,
                ended_at TIMESTAMP,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                total_cost REAL NOT NULL DEFAULT 0,
                total_findings INTEGER NOT NULL DEFAULT 0,
                total_tool_calls INTEGER NOT NULL DEFAULT 0,
                agents_used TEXT NOT NULL DEFAULT '[]',
                wstg_coverage_pct REAL NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at DESC)",
        ] {
            sqlx::query(index)
                .execute(pool)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        }

        Ok(())
    }
}

/// Expand tilde (~) in path
fn expand_tilde(path: PathBuf) -> Result<PathBuf> {
    if path.starts_with("~") {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Internal("Could not determine home directory".to_string()))?;
        Ok(home.join(path.strip_prefix("~").unwrap()))
    } else {
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_schema_creation() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path().join("test.db")).await.unwrap();

        let version: i32 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn test_reopen_existing_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        {
            let store = EventStore::new(&db_path).await.unwrap();
            sqlx::query("INSERT INTO sessions (session_id, started_at) VALUES ('s1', CURRENT_TIMESTAMP)")
                .execute(store.pool())
                .await
                .unwrap();
        }

        let store = EventStore::new(&db_path).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("deeper").join("test.db");
        assert!(EventStore::new(&db_path).await.is_ok());
        assert!(db_path.exists());
    }
}
