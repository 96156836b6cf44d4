//! Error types for plant-calc

use errors::{ErrorCategory, PlantError, PlantErrorTrait};
use thiserror::Error;

/// Calibration errors
#[derive(Debug, Error)]
pub enum CalcError {
    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Invalid formula '{formula}': {reason}")]
    InvalidFormula { formula: String, reason: String },

    #[error("Invalid calibration rule: {0}")]
    InvalidRule(String),

    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(String),

    #[error("No formula range covers raw value {0}")]
    NoMatchingRange(f64),
}

impl CalcError {
    pub fn expression(msg: impl Into<String>) -> Self {
        Self::Expression(msg.into())
    }

    pub fn invalid_rule(msg: impl Into<String>) -> Self {
        Self::InvalidRule(msg.into())
    }

    pub fn invalid_formula(formula: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFormula {
            formula: formula.into(),
            reason: reason.into(),
        }
    }

    /// Attach the sensor type a load-time error belongs to
    pub fn for_sensor(self, name: &str) -> Self {
        match self {
            Self::InvalidFormula { formula, reason } => Self::InvalidFormula {
                formula,
                reason: format!("sensor type '{}': {}", name, reason),
            },
            other => Self::invalid_rule(format!("sensor type '{}': {}", name, other)),
        }
    }
}

impl PlantErrorTrait for CalcError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Expression(_) => "CALCULATION_ERROR",
            Self::InvalidFormula { .. } => "INVALID_EXPRESSION",
            Self::InvalidRule(_) => "INVALID_CALIBRATION_RULE",
            Self::UnknownSensorType(_) => "UNKNOWN_SENSOR_TYPE",
            Self::NoMatchingRange(_) => "NO_MATCHING_RANGE",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidFormula { .. } | Self::InvalidRule(_) | Self::UnknownSensorType(_) => {
                ErrorCategory::Configuration
            },
            Self::Expression(_) | Self::NoMatchingRange(_) => ErrorCategory::Calculation,
        }
    }
}

impl From<CalcError> for PlantError {
    fn from(err: CalcError) -> Self {
        match err {
            CalcError::Expression(msg) => PlantError::Calculation(msg),
            CalcError::InvalidFormula { formula, reason } => PlantError::InvalidExpression {
                expression: formula,
                error: reason,
            },
            other => PlantError::Configuration(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;
