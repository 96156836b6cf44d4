//! Common command-line arguments for the plant services

use std::path::PathBuf;

use clap::Parser;

/// Common service startup arguments
#[derive(Debug, Clone, Parser)]
#[clap(author, version, about)]
pub struct ServiceArgs {
    /// Configuration file (yaml, toml or json)
    #[clap(short = 'c', long, env = "COLLSRV_CONFIG", default_value = "config/collsrv.yaml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[clap(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Disable colored output (useful for log files)
    #[clap(long)]
    pub no_color: bool,

    /// Only validate configuration without starting service
    #[clap(long)]
    pub validate: bool,

    /// Custom database path override
    #[clap(long, env = "DB_PATH")]
    pub db_path: Option<String>,
}

impl Default for ServiceArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from("config/collsrv.yaml"),
            log_level: "info".to_string(),
            no_color: false,
            validate: false,
            db_path: None,
        }
    }
}

impl ServiceArgs {
    /// Parse log level string to tracing::Level
    pub fn parse_log_level(&self) -> tracing::Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    /// Database path: CLI flag, then `PLANT_DB_PATH`, then `DATABASE_DIR`, then
    /// the value from the config file
    pub fn get_db_path(&self, configured: &str) -> String {
        if let Some(path) = &self.db_path {
            return path.clone();
        }
        if let Ok(path) = std::env::var("PLANT_DB_PATH") {
            return path;
        }
        if let Ok(dir) = std::env::var("DATABASE_DIR") {
            return format!("{}/plant.db", dir);
        }
        configured.to_string()
    }
}
