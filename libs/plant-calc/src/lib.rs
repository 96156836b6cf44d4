//! plant-calc - Sensor calibration for the plant telemetry collector
//!
//! Converts raw register values into engineering units. Each (device, point)
//! pair may be bound to a sensor type; a sensor type carries either a lookup
//! table (piecewise-linear interpolation) or a list of raw sub-ranges, each
//! with a precompiled arithmetic formula over the raw value `x`.
//!
//! # Example
//!
//! ```rust
//! use plant_calc::{CalibrationConfig, CalibrationEngine, LookupEntry, SensorBinding, SensorTypeConfig};
//!
//! let mut config = CalibrationConfig::default();
//! config.sensor_types.insert(
//!     "pt100".to_string(),
//!     SensorTypeConfig {
//!         lookup: vec![
//!             LookupEntry { raw: 0.0, value: 0.0 },
//!             LookupEntry { raw: 100.0, value: 50.0 },
//!         ],
//!         ranges: vec![],
//!     },
//! );
//! config.sensor_map.push(SensorBinding {
//!     device_id: "D1".to_string(),
//!     point: "temp_1".to_string(),
//!     sensor_type: "pt100".to_string(),
//! });
//!
//! let engine = CalibrationEngine::from_config(&config).unwrap();
//! assert_eq!(engine.calibrate("D1", "temp_1", 50.0), 25.0);
//! // Unmapped points pass through unchanged
//! assert_eq!(engine.calibrate("D1", "pressure", 812.0), 812.0);
//! ```
//!
//! # Formula functions
//!
//! | Function | Signature | Description |
//! |----------|-----------|-------------|
//! | `scale` | `scale(value, factor)` | Multiply by factor |
//! | `clamp` | `clamp(value, min, max)` | Limit to range |
//! | `abs` | `abs(value)` | Absolute value |
//! | `min` | `min(a, b)` | Minimum of two |
//! | `max` | `max(a, b)` | Maximum of two |
//! | `round` | `round(value, decimals)` | Round to decimals |
//! | `sqrt` | `sqrt(value)` | Square root |
//! | `ln` | `ln(value)` | Natural logarithm |
//! | `exp` | `exp(value)` | e^value |

pub mod config;
pub mod engine;
pub mod error;
pub mod formula;
pub mod lookup;

pub use config::{CalibrationConfig, FormulaRangeConfig, LookupEntry, SensorBinding, SensorTypeConfig};
pub use engine::CalibrationEngine;
pub use error::{CalcError, Result};
pub use formula::{Formula, RangedFormulas};
pub use lookup::LookupTable;
