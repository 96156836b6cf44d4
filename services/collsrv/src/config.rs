//! collsrv configuration
//!
//! Loaded once at startup from a YAML/TOML/JSON file overlaid with
//! `COLLSRV_`-prefixed environment variables, then validated. Nothing here is
//! reloaded while the service runs.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use common::time::LocalZone;
use errors::{PlantError, PlantResult};
use plant_calc::{CalibrationConfig, CalibrationEngine};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::poller::client::RegisterKind;
use crate::poller::decode::{DataType, WordOrder, MAX_BLOCK_REGISTERS};
use crate::poller::reconnect::ReconnectPolicy;

/// Environment variable prefix for overrides (`COLLSRV_POLLER__INTERVAL_MS=1000`)
pub const ENV_PREFIX: &str = "COLLSRV_";

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollsrvConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub alarm: AlarmConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Log root directory (PLANT_LOG_DIR wins when set)
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Write the log file as JSON lines
    #[serde(default)]
    pub log_json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            database_path: default_database_path(),
            log_dir: None,
            log_json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Time between poll rounds
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,

    /// Upper bound on one device's connect + read within a round
    #[serde(default = "default_device_timeout_ms")]
    pub device_timeout_ms: u64,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            device_timeout_ms: default_device_timeout_ms(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// ±25% random jitter on each delay
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::from_config(
            self.initial_delay_ms,
            self.max_delay_ms,
            self.backoff_multiplier,
            self.jitter,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Out-of-range dwell time before an alarm activates
    #[serde(default = "default_activation_delay_secs")]
    pub activation_delay_secs: u64,

    /// In-range dwell time before an active alarm resolves
    #[serde(default = "default_resolution_delay_secs")]
    pub resolution_delay_secs: u64,

    /// A non-quiescent key without observations for this long is reported stale
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Capacity of the in-process alarm event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            activation_delay_secs: default_activation_delay_secs(),
            resolution_delay_secs: default_resolution_delay_secs(),
            stale_after_secs: default_stale_after_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Aggregation window width
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often the aggregator checks for completed windows
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Local wall-clock time of the daily raw-sample cleanup, "HH:MM"
    #[serde(default = "default_cleanup_time")]
    pub cleanup_time: String,

    /// "local", "UTC" or a fixed offset like "+08:00"
    #[serde(default)]
    pub timezone: LocalZone,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            tick_interval_secs: default_tick_interval_secs(),
            cleanup_time: default_cleanup_time(),
            timezone: LocalZone::default(),
        }
    }
}

impl HistoryConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_secs as i64)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn cleanup_time(&self) -> PlantResult<NaiveTime> {
        NaiveTime::parse_from_str(self.cleanup_time.trim(), "%H:%M").map_err(|e| {
            PlantError::invalid_config(
                "history.cleanup_time",
                format!("'{}' is not HH:MM ({})", self.cleanup_time, e),
            )
        })
    }
}

/// One polled controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,

    /// Display name; defaults to the id
    #[serde(default)]
    pub name: Option<String>,

    /// "host:port"; ignored for simulated devices
    #[serde(default)]
    pub address: String,

    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    #[serde(default)]
    pub register_kind: RegisterKind,

    /// Serve values from the built-in simulator instead of the network
    #[serde(default)]
    pub simulated: bool,

    #[serde(default)]
    pub points: Vec<PointConfig>,

    /// Allowed range per exact point name
    #[serde(default)]
    pub ranges: HashMap<String, RangeConfig>,

    /// Allowed range shared by a group of points
    #[serde(default)]
    pub range_groups: Vec<RangeGroupConfig>,
}

impl DeviceConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Register layout of one point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    pub name: String,

    /// Register address of the point's first word
    pub offset: u16,

    #[serde(default)]
    pub data_type: DataType,

    /// Multiplier applied after decoding (0.1 for tenths)
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Word order of 32-bit values
    #[serde(default)]
    pub word_order: WordOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeConfig {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeGroupConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub points: Vec<String>,
    pub min: f64,
    pub max: f64,
}

fn default_service_name() -> String {
    "collsrv".to_string()
}

fn default_database_path() -> String {
    "data/collsrv.db".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_device_timeout_ms() -> u64 {
    1500
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_activation_delay_secs() -> u64 {
    60
}

fn default_resolution_delay_secs() -> u64 {
    180
}

fn default_stale_after_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_window_secs() -> u64 {
    15 * 60
}

fn default_tick_interval_secs() -> u64 {
    15
}

fn default_cleanup_time() -> String {
    "00:01".to_string()
}

fn default_unit_id() -> u8 {
    1
}

fn default_scale() -> f64 {
    1.0
}

impl CollsrvConfig {
    /// Load from file + environment
    pub fn load(path: &Path) -> PlantResult<Self> {
        common::config_loader::load_config(path, ENV_PREFIX)
    }

    /// Check everything that would otherwise fail later at runtime
    pub fn validate(&self) -> PlantResult<()> {
        self.validate_timing()?;
        self.history.cleanup_time()?;

        let mut device_ids = HashSet::new();
        for (index, device) in self.devices.iter().enumerate() {
            if device.id.trim().is_empty() {
                return Err(PlantError::invalid_config(
                    format!("devices[{}].id", index),
                    "must not be empty",
                ));
            }
            if !device_ids.insert(device.id.as_str()) {
                return Err(PlantError::invalid_config(
                    format!("devices[{}].id", index),
                    format!("duplicate device id '{}'", device.id),
                ));
            }
            validate_device(device)?;
        }

        CalibrationEngine::from_config(&self.calibration)?;
        Ok(())
    }

    fn validate_timing(&self) -> PlantResult<()> {
        if self.poller.interval_ms == 0 {
            return Err(PlantError::invalid_config(
                "poller.interval_ms",
                "must be greater than 0",
            ));
        }
        if self.poller.device_timeout_ms == 0 {
            return Err(PlantError::invalid_config(
                "poller.device_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.poller.device_timeout_ms > self.poller.interval_ms {
            warn!(
                "poller.device_timeout_ms ({}) exceeds poller.interval_ms ({}); rounds will overlap their schedule",
                self.poller.device_timeout_ms, self.poller.interval_ms
            );
        }
        let reconnect = &self.poller.reconnect;
        if reconnect.backoff_multiplier < 1.0 || !reconnect.backoff_multiplier.is_finite() {
            return Err(PlantError::invalid_config(
                "poller.reconnect.backoff_multiplier",
                "must be a finite number >= 1.0",
            ));
        }
        if reconnect.max_delay_ms < reconnect.initial_delay_ms {
            return Err(PlantError::invalid_config(
                "poller.reconnect.max_delay_ms",
                "must not be smaller than initial_delay_ms",
            ));
        }
        if self.history.window_secs == 0 {
            return Err(PlantError::invalid_config(
                "history.window_secs",
                "must be greater than 0",
            ));
        }
        if self.history.tick_interval_secs == 0
            || self.history.tick_interval_secs > self.history.window_secs
        {
            return Err(PlantError::invalid_config(
                "history.tick_interval_secs",
                format!(
                    "must be between 1 and the window width ({}s)",
                    self.history.window_secs
                ),
            ));
        }
        Ok(())
    }
}

fn validate_device(device: &DeviceConfig) -> PlantResult<()> {
    let field = |name: &str| format!("devices.{}.{}", device.id, name);

    if !device.simulated && device.address.trim().is_empty() {
        return Err(PlantError::invalid_config(
            field("address"),
            "required unless the device is simulated",
        ));
    }

    let mut names = HashSet::new();
    for point in &device.points {
        if point.name.trim().is_empty() {
            return Err(PlantError::invalid_config(
                field("points"),
                "point name must not be empty",
            ));
        }
        if !names.insert(point.name.as_str()) {
            return Err(PlantError::invalid_config(
                field("points"),
                format!("duplicate point '{}'", point.name),
            ));
        }
        if !point.scale.is_finite() || point.scale == 0.0 {
            return Err(PlantError::invalid_config(
                field("points"),
                format!("point '{}' has an invalid scale", point.name),
            ));
        }
    }

    if let Some((start, count)) = crate::poller::decode::block_span(&device.points) {
        if count > MAX_BLOCK_REGISTERS {
            return Err(PlantError::invalid_config(
                field("points"),
                format!(
                    "register block {}..{} spans {} registers (max {})",
                    start,
                    u32::from(start) + u32::from(count),
                    count,
                    MAX_BLOCK_REGISTERS
                ),
            ));
        }
    }

    for (point, range) in &device.ranges {
        check_range(&field(&format!("ranges.{}", point)), range.min, range.max)?;
        if !names.contains(point.as_str()) {
            warn!("Range for unknown point {}/{}", device.id, point);
        }
    }
    for (index, group) in device.range_groups.iter().enumerate() {
        check_range(
            &field(&format!("range_groups[{}]", index)),
            group.min,
            group.max,
        )?;
    }
    Ok(())
}

fn check_range(field: &str, min: f64, max: f64) -> PlantResult<()> {
    if !min.is_finite() || !max.is_finite() || min > max {
        return Err(PlantError::invalid_config(
            field,
            format!("invalid range [{}, {}]", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
poller:
  interval_ms: 1000
history:
  window_secs: 600
  timezone: "+08:00"
devices:
  - id: D1
    name: "Boiler 1"
    address: "192.168.1.10:502"
    points:
      - { name: temp_1, offset: 0, scale: 0.1 }
      - { name: temp_2, offset: 1, data_type: i16, scale: 0.1 }
      - { name: flow, offset: 2, data_type: f32, word_order: little }
    ranges:
      temp_1: { min: 80, max: 90 }
    range_groups:
      - { points: [temp_1, temp_2], min: 0, max: 120 }
calibration:
  sensor_types:
    pt100:
      lookup:
        - { raw: 0, value: 0 }
        - { raw: 100, value: 50 }
  sensor_map:
    - { device_id: D1, point: temp_2, sensor_type: pt100 }
"#;

    fn sample() -> CollsrvConfig {
        serde_yaml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_defaults_and_overrides() {
        let config = sample();
        assert_eq!(config.poller.interval_ms, 1000);
        assert_eq!(config.poller.device_timeout_ms, 1500);
        assert_eq!(config.alarm.activation_delay_secs, 60);
        assert_eq!(config.alarm.resolution_delay_secs, 180);
        assert_eq!(config.history.window_secs, 600);
        assert_eq!(config.history.tick_interval_secs, 15);
        assert_eq!(
            config.history.cleanup_time().unwrap(),
            NaiveTime::from_hms_opt(0, 1, 0).unwrap()
        );

        let device = &config.devices[0];
        assert_eq!(device.display_name(), "Boiler 1");
        assert_eq!(device.unit_id, 1);
        assert_eq!(device.register_kind, RegisterKind::Holding);
        assert_eq!(device.points[2].data_type, DataType::F32);
        assert_eq!(device.points[2].word_order, WordOrder::Little);

        config.validate().unwrap();
    }

    #[test]
    fn test_tick_must_not_exceed_window() {
        let mut config = sample();
        config.history.tick_interval_secs = 601;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let mut config = sample();
        config.devices.push(config.devices[0].clone());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate device id"));
    }

    #[test]
    fn test_address_required_unless_simulated() {
        let mut config = sample();
        config.devices[0].address.clear();
        assert!(config.validate().is_err());
        config.devices[0].simulated = true;
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_range_and_cleanup_time() {
        let mut config = sample();
        config.devices[0]
            .ranges
            .insert("temp_2".to_string(), RangeConfig { min: 5.0, max: 1.0 });
        assert!(config.validate().is_err());

        let mut config = sample();
        config.history.cleanup_time = "25:00".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_calibration_errors_surface_in_validate() {
        let mut config = sample();
        config.calibration.sensor_map[0].sensor_type = "missing".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("missing"));
    }

    #[test]
    fn test_oversized_block_rejected() {
        let mut config = sample();
        config.devices[0].points.push(PointConfig {
            name: "far".to_string(),
            offset: 500,
            data_type: DataType::U16,
            scale: 1.0,
            word_order: WordOrder::Big,
        });
        assert!(config.validate().is_err());
    }
}
