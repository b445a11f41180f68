//! Server configuration
//!
//! Everything rides the CLI, with environment-variable overrides for
//! headless deployments. The only setting the core actually depends on is
//! the listening port; the rest is plumbing (database location, logging).

use clap::Parser;

/// Agentwatch Server - hook event ingestion and live dashboard fan-out
#[derive(Debug, Parser)]
#[command(name = "agentwatch-server")]
#[command(about = "Agentwatch ingestion server for AI agent hook events", long_about = None)]
pub struct ServerConfig {
    /// Host to bind to
    #[arg(long, value_name = "HOST", env = "AGENTWATCH_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, value_name = "PORT", env = "AGENTWATCH_PORT", default_value_t = 4000)]
    pub port: u16,

    /// Path to the SQLite database file (tilde is expanded)
    #[arg(
        long,
        value_name = "FILE",
        env = "AGENTWATCH_DB",
        default_value = "~/.agentwatch/events.db"
    )]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", env = "AGENTWATCH_LOG", default_value = "info")]
    pub log_level: String,

    /// Log SQL queries at debug level
    #[arg(long, env = "AGENTWATCH_LOG_SQL")]
    pub log_sql_queries: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults() {
        let config = ServerConfig::parse_from(["agentwatch-server"]);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 4000);
        assert_eq!(config.db_path, "~/.agentwatch/events.db");
        assert_eq!(config.log_level, "info");
        assert!(!config.log_sql_queries);
    }

    #[test]
    #[serial]
    fn test_cli_overrides() {
        let config = ServerConfig::parse_from([
            "agentwatch-server",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--db-path",
            "/tmp/events.db",
            "--log-sql-queries",
        ]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.db_path, "/tmp/events.db");
        assert!(config.log_sql_queries);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        unsafe {
            std::env::set_var("AGENTWATCH_PORT", "4100");
        }
        let config = ServerConfig::parse_from(["agentwatch-server"]);
        assert_eq!(config.port, 4100);
        unsafe {
            std::env::remove_var("AGENTWATCH_PORT");
        }
    }
}
