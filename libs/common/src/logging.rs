//! Unified logging module for the plant telemetry services
//!
//! Console output plus a daily rolling log file per service.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809000Z [INFO] Poll round completed`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking writer alive for the life of the process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

// ============================================================================
// Log Root Directory Configuration
// ============================================================================

/// Global log root directory (initialized once from config or env)
/// Priority: PLANT_LOG_DIR env > config_dir > default "logs"
static LOG_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Initialize log root directory from config or environment
///
/// Call early during bootstrap, before any file logging is set up.
pub fn init_log_root(config_dir: Option<&str>) {
    LOG_ROOT.get_or_init(|| {
        std::env::var("PLANT_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                config_dir
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("logs"))
            })
    });
}

/// Get log root directory
pub fn get_log_root() -> PathBuf {
    LOG_ROOT.get().cloned().unwrap_or_else(|| {
        std::env::var("PLANT_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"))
    })
}

/// Default max file size: 100MB
const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

// Daily rolling file writer with naming format: {YYYYMMDD}_{service}.log
// Also rotates by size within a day ({YYYYMMDD}_{service}.N.log)
struct DailyRollingWriter {
    service_name: String,
    log_dir: PathBuf,
    current_date: Arc<Mutex<String>>,
    current_file: Arc<Mutex<Option<File>>>,
    current_size: Arc<AtomicU64>,
    max_file_size: u64,
    rotation_count: Arc<AtomicU32>,
}

impl DailyRollingWriter {
    fn new(service_name: String, log_dir: PathBuf, max_file_size: u64) -> std::io::Result<Self> {
        let current_date = chrono::Local::now().format("%Y%m%d").to_string();
        fs::create_dir_all(&log_dir)?;

        let file = Self::open(&log_dir, &current_date, &service_name, None)?;
        let initial_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            service_name,
            log_dir,
            current_date: Arc::new(Mutex::new(current_date)),
            current_file: Arc::new(Mutex::new(Some(file))),
            current_size: Arc::new(AtomicU64::new(initial_size)),
            max_file_size,
            rotation_count: Arc::new(AtomicU32::new(0)),
        })
    }

    fn open(
        log_dir: &std::path::Path,
        date: &str,
        service_name: &str,
        rotation: Option<u32>,
    ) -> std::io::Result<File> {
        let name = match rotation {
            Some(n) => format!("{}_{}.{}.log", date, service_name, n),
            None => format!("{}_{}.log", date, service_name),
        };
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(name))
    }

    fn lock_err<T>(e: std::sync::PoisonError<T>) -> std::io::Error {
        std::io::Error::other(format!("Mutex poisoned: {}", e))
    }

    /// Switch files when the local date changes or the size limit is hit
    fn roll_if_needed(&self, incoming: usize) -> std::io::Result<()> {
        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let mut current_date = self.current_date.lock().map_err(Self::lock_err)?;

        let new_file = if *current_date != today {
            *current_date = today;
            self.rotation_count.store(0, Ordering::SeqCst);
            Some(Self::open(
                &self.log_dir,
                &current_date,
                &self.service_name,
                None,
            )?)
        } else if self.current_size.load(Ordering::Relaxed) + incoming as u64 > self.max_file_size
        {
            let count = self.rotation_count.fetch_add(1, Ordering::SeqCst) + 1;
            Some(Self::open(
                &self.log_dir,
                &current_date,
                &self.service_name,
                Some(count),
            )?)
        } else {
            None
        };

        if let Some(file) = new_file {
            let size = file.metadata().map(|m| m.len()).unwrap_or(0);
            self.current_size.store(size, Ordering::SeqCst);
            *self.current_file.lock().map_err(Self::lock_err)? = Some(file);
        }
        Ok(())
    }
}

impl Write for DailyRollingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.roll_if_needed(buf.len())?;

        let mut guard = self.current_file.lock().map_err(Self::lock_err)?;
        match guard.as_mut() {
            Some(file) => {
                let written = file.write(buf)?;
                self.current_size
                    .fetch_add(written as u64, Ordering::Relaxed);
                Ok(written)
            },
            None => Ok(0),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut guard = self.current_file.lock().map_err(Self::lock_err)?;
        match guard.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name (e.g., "collsrv")
    pub service_name: String,
    /// Base directory for logs
    pub log_dir: PathBuf,
    /// Default level when RUST_LOG is not set
    pub console_level: Level,
    /// Enable JSON format for the file layer
    pub enable_json: bool,
    /// Enable ANSI colors on the console
    pub ansi: bool,
    /// Rotate within a day once a file exceeds this size
    pub max_file_size: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: get_log_root(),
            console_level: Level::INFO,
            enable_json: false,
            ansi: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Build the filter: RUST_LOG wins, otherwise [`default_directive`]
fn build_env_filter(config: &LogConfig) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(env_str) if !env_str.is_empty() => EnvFilter::new(env_str),
        _ => EnvFilter::new(default_directive(config)),
    }
}

/// `{level},{service}=debug`, or `=trace` when the console level is trace
///
/// `tracing` orders levels by verbosity: `TRACE > DEBUG > INFO`.
fn default_directive(config: &LogConfig) -> String {
    let level = config.console_level.as_str().to_lowercase();
    let service_level = if config.console_level > Level::DEBUG {
        level.clone()
    } else {
        "debug".to_string()
    };
    format!("{},{}={}", level, config.service_name, service_level)
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&config.log_dir)?;

    let writer = DailyRollingWriter::new(
        config.service_name.clone(),
        config.log_dir.clone(),
        config.max_file_size,
    )?;
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
    match guards.lock() {
        Ok(mut guards) => guards.push(guard),
        Err(poisoned) => poisoned.into_inner().push(guard),
    }

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = if config.enable_json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_level(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .event_format(BracketedLevelFormat)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(build_env_filter(&config))
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Console-only logging, used by `--validate` and tools
pub fn init(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(fmt::layer().event_format(BracketedLevelFormat))
        .try_init()?;
    Ok(())
}
