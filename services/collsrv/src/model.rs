//! Records that flow between the poller, alarm and history stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decoded (uncalibrated) value of one point
#[derive(Debug, Clone, PartialEq)]
pub struct PointValue {
    pub point: String,
    pub raw: f64,
}

/// Everything one device produced in one poll round
///
/// All points share the single capture timestamp of the round.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBatch {
    pub device_id: String,
    pub device_name: String,
    pub timestamp: DateTime<Utc>,
    pub values: Vec<PointValue>,
}

/// Calibrated sample as stored in `raw_samples`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub device_id: String,
    pub device_name: String,
    pub point: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Mean of one (device, point) over a window, as computed by the raw store
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMean {
    pub device_id: String,
    pub point: String,
    pub mean: f64,
    pub count: i64,
}

/// One row of `aggregate_windows`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateWindow {
    pub device_id: String,
    pub point: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub mean_value: f64,
    pub sample_count: i64,
}

/// Which threshold a violation crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    High,
    Low,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HIGH" => Some(Self::High),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmEventKind {
    Activate,
    Resolve,
}

impl AlarmEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Resolve => "resolve",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "activate" => Some(Self::Activate),
            "resolve" => Some(Self::Resolve),
            _ => None,
        }
    }
}

/// Alarm activation or resolution
///
/// For a resolve event `direction` and `threshold` describe the alarm being
/// cleared and `value` is the in-range value that cleared it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub device_id: String,
    pub point: String,
    pub kind: AlarmEventKind,
    pub direction: Direction,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}
