//! Unified service bootstrap utilities
//!
//! Startup banner and logging initialization shared by the plant services.

use std::path::PathBuf;

use tracing::{info, Level};

use crate::logging::{self, LogConfig};

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g., "collsrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

/// Print unified startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ██████╗ ██╗      █████╗ ███╗   ██╗████████╗
 ██╔══██╗██║     ██╔══██╗████╗  ██║╚══██╔══╝
 ██████╔╝██║     ███████║██╔██╗ ██║   ██║
 ██╔═══╝ ██║     ██╔══██║██║╚██╗██║   ██║
 ██║     ███████╗██║  ██║██║ ╚████║   ██║
 ╚═╝     ╚══════╝╚═╝  ╚═╝╚═╝  ╚═══╝   ╚═╝
    "#;

    info!("{}", banner);
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!("");
}

/// Logging options taken from the service configuration file
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Log root directory; `PLANT_LOG_DIR` overrides it
    pub dir: Option<String>,
    /// JSON lines in the log file instead of plain text
    pub json: bool,
}

/// Initialize console + daily file logging for a service
///
/// Log root directory priority:
/// 1. PLANT_LOG_DIR environment variable
/// 2. `options.dir` from the config file
/// 3. Default "logs"
///
/// Files land in `{root}/{service}/{YYYYMMDD}_{service}.log`.
pub fn init_logging(
    service: &ServiceInfo,
    options: &LoggingOptions,
    console_level: Level,
    ansi: bool,
) -> anyhow::Result<()> {
    logging::init_log_root(options.dir.as_deref());
    let log_dir: PathBuf = logging::get_log_root().join(&service.name);

    let config = LogConfig {
        service_name: service.name.clone(),
        log_dir,
        console_level,
        enable_json: options.json,
        ansi,
        ..Default::default()
    };

    logging::init_with_config(config).map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(())
}
