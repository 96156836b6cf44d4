//! Unified error handling for the plant telemetry services
//!
//! One error type shared by the collector and its libraries, so that poller,
//! alarm and history code report failures the same way.

use thiserror::Error;

// ============================================================================
// PlantError - Main error type
// ============================================================================

/// Main error type for the telemetry collector
#[derive(Debug, Error)]
pub enum PlantError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // ======================================
    // Database Errors
    // ======================================
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    // ======================================
    // Device & Communication Errors
    // ======================================
    #[error("Protocol error: {device}: {message}")]
    Protocol { device: String, message: String },

    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Timeout waiting for response from {0}")]
    Timeout(String),

    #[error("Device not connected: {0}")]
    NotConnected(String),

    #[error("Decode error: {point}: {reason}")]
    Decode { point: String, reason: String },

    // ======================================
    // Calculation Errors
    // ======================================
    #[error("Calculation error: {0}")]
    Calculation(String),

    #[error("Invalid expression: {expression}: {error}")]
    InvalidExpression { expression: String, error: String },

    // ======================================
    // Service Errors
    // ======================================
    #[error("Service startup failed: {0}")]
    StartupFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using PlantError
pub type PlantResult<T> = Result<T, PlantError>;

impl PlantError {
    /// Shorthand for an invalid configuration field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a device-level protocol failure
    pub fn protocol(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            device: device.into(),
            message: message.into(),
        }
    }
}

impl From<figment::Error> for PlantError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

// ============================================================================
// PlantError implements PlantErrorTrait
// ============================================================================

impl PlantErrorTrait for PlantError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::MissingConfig(_) => "MISSING_CONFIG",

            Self::Database(_) => "DATABASE_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",

            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::NotConnected(_) => "NOT_CONNECTED",
            Self::Decode { .. } => "DECODE_ERROR",

            Self::Calculation(_) => "CALCULATION_ERROR",
            Self::InvalidExpression { .. } => "INVALID_EXPRESSION",

            Self::StartupFailed(_) => "STARTUP_FAILED",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_)
            | Self::InvalidConfig { .. }
            | Self::MissingConfig(_)
            | Self::InvalidExpression { .. } => ErrorCategory::Configuration,

            Self::Database(_) | Self::Sqlite(_) => ErrorCategory::Database,

            Self::Protocol { .. } => ErrorCategory::Protocol,

            Self::ConnectionFailed { .. } | Self::NotConnected(_) => ErrorCategory::Connection,

            Self::Timeout(_) => ErrorCategory::Timeout,

            Self::Decode { .. } => ErrorCategory::DataCorruption,

            Self::Calculation(_) => ErrorCategory::Calculation,

            Self::StartupFailed(_) => ErrorCategory::Internal,

            Self::Other(_) => ErrorCategory::Unknown,
        }
    }
}

// ============================================================================
// Error Trait - Architectural layer
// ============================================================================

/// Error category enum - used for classification and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,
    Database,
    Timeout,

    // Device communication layer
    Protocol,
    Connection,

    // Calibration layer
    Calculation,

    // System level
    Internal,
    DataCorruption,

    // Others
    Unknown,
}

/// Error capability trait
///
/// Lets library-specific error types (e.g. `CalcError`) share the
/// classification used by the collector for logging and retry decisions.
pub trait PlantErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for logs and persisted device status)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether the failure is transient and the next natural cycle should retry
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Timeout
                | ErrorCategory::Connection
                | ErrorCategory::Protocol
                | ErrorCategory::Database
        )
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Database => Level::ERROR,
            ErrorCategory::Timeout | ErrorCategory::Connection | ErrorCategory::Protocol => {
                Level::WARN
            },
            ErrorCategory::DataCorruption | ErrorCategory::Calculation => Level::DEBUG,
            _ => Level::WARN,
        }
    }

    /// Whether the process must not continue (configuration errors at startup)
    fn is_fatal(&self) -> bool {
        matches!(self.category(), ErrorCategory::Configuration)
    }
}

// Tests
#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(PlantError::Timeout("plc-1".into()).is_retryable());
        assert!(PlantError::ConnectionFailed {
            endpoint: "10.0.0.5:502".into(),
            reason: "refused".into()
        }
        .is_retryable());
        assert!(!PlantError::Configuration("bad".into()).is_retryable());
        assert!(!PlantError::Decode {
            point: "temp_1".into(),
            reason: "short block".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_config_errors_are_fatal() {
        assert!(PlantError::invalid_config("devices[0].address", "empty").is_fatal());
        assert!(PlantError::InvalidExpression {
            expression: "x * k".into(),
            error: "unknown variable 'k'".into()
        }
        .is_fatal());
        assert!(!PlantError::Timeout("plc-1".into()).is_fatal());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PlantError::protocol("plc-1", "illegal data address").error_code(),
            "PROTOCOL_ERROR"
        );
        assert_eq!(
            PlantError::NotConnected("plc-2".into()).category(),
            ErrorCategory::Connection
        );
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(
            PlantError::Database("disk full".into()).log_level(),
            tracing::Level::ERROR
        );
        assert_eq!(
            PlantError::Timeout("plc-1".into()).log_level(),
            tracing::Level::WARN
        );
        assert_eq!(
            PlantError::StartupFailed("log dir not writable".into()).log_level(),
            tracing::Level::ERROR
        );
    }
}
