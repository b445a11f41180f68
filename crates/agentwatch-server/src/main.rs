//! Agentwatch Ingestion Server
//!
//! This server provides:
//! - Hook event ingestion on POST /events with validation
//! - Metric ingestion (tokens, tools, findings, coverage) with per-session
//!   aggregate rollups
//! - Read-side summaries and a composed dashboard snapshot
//! - A WebSocket live channel on /stream that fans every write out to all
//!   connected dashboard clients
//!
//! Usage:
//! ```bash
//! # Defaults: 127.0.0.1:4000, ~/.agentwatch/events.db
//! agentwatch-server
//!
//! # Or with environment variables
//! AGENTWATCH_PORT=4100 AGENTWATCH_DB=/tmp/events.db agentwatch-server
//! ```
//!
//! Test with:
//! ```bash
//! curl http://localhost:4000/events \
//!   -H "Content-Type: application/json" \
//!   -d '{
//!     "source_app": "claude-code",
//!     "session_id": "demo-1",
//!     "hook_event_type": "PreToolUse",
//!     "payload": {"tool_name": "Bash"}
//!   }'
//!
//! curl http://localhost:4000/api/metrics/dashboard
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use agentwatch_ingest::{AppState, Broadcaster, HitlNotifier};
use agentwatch_store::EventStore;

use config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    // Initialize tracing with configured level and sqlx query control
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::new(format!("{}", log_level));

    // By default, set sqlx to WARN to suppress query logs
    if !config.log_sql_queries {
        match "sqlx=warn".parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => tracing::warn!("Failed to set sqlx log filter: {}", e),
        }
    }

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("🚀 Initializing Agentwatch ingestion server");

    let store = EventStore::new(&config.db_path).await?;
    info!("🗄️  Event store ready: {}", config.db_path);

    let state = AppState {
        store,
        broadcaster: Arc::new(Broadcaster::new()),
        notifier: HitlNotifier::new()?,
    };
    let app = agentwatch_ingest::app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("");
    info!("✅ Agentwatch listening on http://{}", addr);
    info!("   Ingestion:");
    info!("   - Hook events:       http://{}/events", addr);
    info!("   - Metrics:           http://{}/api/metrics/{{tokens,tools,findings,wstg}}", addr);
    info!("   - Sessions:          http://{}/api/sessions", addr);
    info!("   Dashboard:");
    info!("   - Snapshot:          http://{}/api/metrics/dashboard", addr);
    info!("   - Live stream:       ws://{}/stream", addr);
    info!("   - Health check:      http://{}/healthz", addr);
    info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
