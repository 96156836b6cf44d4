//! Calibration configuration types
//!
//! Loaded once at startup as part of the collector configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Calibration section of the collector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Calibration rules keyed by sensor type name
    #[serde(default)]
    pub sensor_types: HashMap<String, SensorTypeConfig>,

    /// (device, point) -> sensor type bindings
    #[serde(default)]
    pub sensor_map: Vec<SensorBinding>,
}

/// Calibration rule for one sensor type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorTypeConfig {
    /// Lookup table entries, any order (sorted at load)
    #[serde(default)]
    pub lookup: Vec<LookupEntry>,

    /// Formula sub-ranges, evaluated first-match in declaration order
    #[serde(default)]
    pub ranges: Vec<FormulaRangeConfig>,
}

/// One (raw, engineering value) pair of a lookup table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub raw: f64,
    pub value: f64,
}

/// Raw sub-range `[raw_min, raw_max)` with its formula over `x`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaRangeConfig {
    pub raw_min: f64,
    pub raw_max: f64,
    pub formula: String,
}

/// Binds a device point to a sensor type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorBinding {
    pub device_id: String,
    pub point: String,
    pub sensor_type: String,
}
