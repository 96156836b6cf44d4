//! CalibrationEngine - raw register value to engineering units
//!
//! Resolution order for a (device, point):
//! 1. No sensor type bound -> raw value unchanged
//! 2. Sensor type has a lookup table -> interpolate
//! 3. Otherwise -> first matching formula sub-range
//!
//! Any failure at evaluation time falls back to the raw value; only invalid
//! configuration is reported as an error, and only at load.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::config::CalibrationConfig;
use crate::error::{CalcError, Result};
use crate::formula::RangedFormulas;
use crate::lookup::LookupTable;

#[derive(Debug, Clone)]
enum SensorRule {
    Lookup(LookupTable),
    Formulas(RangedFormulas),
}

/// Calibration engine built from static configuration
#[derive(Debug, Clone, Default)]
pub struct CalibrationEngine {
    rules: HashMap<String, SensorRule>,
    /// (device_id, point) -> sensor type
    bindings: HashMap<(String, String), String>,
}

impl CalibrationEngine {
    /// Build the engine, validating every rule and binding
    pub fn from_config(config: &CalibrationConfig) -> Result<Self> {
        let mut rules = HashMap::with_capacity(config.sensor_types.len());

        for (name, sensor) in &config.sensor_types {
            let rule = if !sensor.lookup.is_empty() {
                SensorRule::Lookup(
                    LookupTable::new(sensor.lookup.clone()).map_err(|e| e.for_sensor(name))?,
                )
            } else if !sensor.ranges.is_empty() {
                SensorRule::Formulas(
                    RangedFormulas::compile(&sensor.ranges).map_err(|e| e.for_sensor(name))?,
                )
            } else {
                return Err(CalcError::invalid_rule(format!(
                    "sensor type '{}' has neither a lookup table nor formula ranges",
                    name
                )));
            };
            rules.insert(name.clone(), rule);
        }

        let mut bindings = HashMap::with_capacity(config.sensor_map.len());
        for binding in &config.sensor_map {
            if !rules.contains_key(&binding.sensor_type) {
                return Err(CalcError::UnknownSensorType(format!(
                    "{} (bound to {}/{})",
                    binding.sensor_type, binding.device_id, binding.point
                )));
            }
            let key = (binding.device_id.clone(), binding.point.clone());
            if let Some(previous) = bindings.insert(key, binding.sensor_type.clone()) {
                return Err(CalcError::invalid_rule(format!(
                    "{}/{} bound twice ('{}' and '{}')",
                    binding.device_id, binding.point, previous, binding.sensor_type
                )));
            }
        }

        debug!(
            "Calibration engine loaded: {} sensor types, {} bindings",
            rules.len(),
            bindings.len()
        );

        Ok(Self { rules, bindings })
    }

    /// Sensor type bound to a device point, if any
    pub fn sensor_type(&self, device_id: &str, point: &str) -> Option<&str> {
        self.bindings
            .get(&(device_id.to_string(), point.to_string()))
            .map(String::as_str)
    }

    /// Convert a raw value to engineering units
    ///
    /// Never fails: unmapped points and evaluation errors yield `raw`.
    pub fn calibrate(&self, device_id: &str, point: &str, raw: f64) -> f64 {
        let Some(sensor_type) = self.sensor_type(device_id, point) else {
            return raw;
        };
        let Some(rule) = self.rules.get(sensor_type) else {
            return raw;
        };

        match rule {
            SensorRule::Lookup(table) => table.interpolate(raw),
            SensorRule::Formulas(formulas) => match formulas.eval(raw) {
                Ok(value) => value,
                Err(e) => {
                    trace!(
                        "Calibration fallback for {}/{} ({}): {}",
                        device_id,
                        point,
                        sensor_type,
                        e
                    );
                    raw
                },
            },
        }
    }
}
