//! Allowed value ranges per (device, point)

use std::collections::HashMap;

use tracing::warn;

use crate::config::DeviceConfig;
use crate::model::Direction;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Inclusive on both ends
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Crossed threshold, if any
    pub fn violation(&self, value: f64) -> Option<(Direction, f64)> {
        if value > self.max {
            Some((Direction::High, self.max))
        } else if value < self.min {
            Some((Direction::Low, self.min))
        } else {
            None
        }
    }
}

/// device id -> point -> range
#[derive(Debug, Clone, Default)]
pub struct RangeTable {
    ranges: HashMap<String, HashMap<String, ValueRange>>,
}

impl RangeTable {
    /// Build from device configs; an exact point entry wins over a group entry,
    /// and among groups the first one listing the point wins
    pub fn from_devices(devices: &[DeviceConfig]) -> Self {
        let mut ranges = HashMap::with_capacity(devices.len());

        for device in devices {
            let mut points: HashMap<String, ValueRange> = HashMap::new();

            for group in &device.range_groups {
                for point in &group.points {
                    if points.contains_key(point) {
                        warn!(
                            "{}/{} listed in more than one range group; keeping the first",
                            device.id, point
                        );
                        continue;
                    }
                    points.insert(point.clone(), ValueRange::new(group.min, group.max));
                }
            }
            for (point, range) in &device.ranges {
                points.insert(point.clone(), ValueRange::new(range.min, range.max));
            }

            if !points.is_empty() {
                ranges.insert(device.id.clone(), points);
            }
        }

        Self { ranges }
    }

    pub fn insert(&mut self, device_id: &str, point: &str, range: ValueRange) {
        self.ranges
            .entry(device_id.to_string())
            .or_default()
            .insert(point.to_string(), range);
    }

    pub fn get(&self, device_id: &str, point: &str) -> Option<ValueRange> {
        self.ranges.get(device_id)?.get(point).copied()
    }

    pub fn len(&self) -> usize {
        self.ranges.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::config::{RangeConfig, RangeGroupConfig};

    fn device() -> DeviceConfig {
        DeviceConfig {
            id: "D1".to_string(),
            name: None,
            address: String::new(),
            unit_id: 1,
            register_kind: Default::default(),
            simulated: true,
            points: vec![],
            ranges: HashMap::from([("temp_1".to_string(), RangeConfig { min: 80.0, max: 90.0 })]),
            range_groups: vec![
                RangeGroupConfig {
                    name: Some("temperatures".to_string()),
                    points: vec!["temp_1".to_string(), "temp_2".to_string()],
                    min: 0.0,
                    max: 120.0,
                },
                RangeGroupConfig {
                    name: None,
                    points: vec!["temp_2".to_string(), "pressure".to_string()],
                    min: 1.0,
                    max: 2.0,
                },
            ],
        }
    }

    #[test]
    fn test_exact_beats_group() {
        let table = RangeTable::from_devices(&[device()]);
        assert_eq!(table.get("D1", "temp_1"), Some(ValueRange::new(80.0, 90.0)));
        assert_eq!(table.get("D1", "temp_2"), Some(ValueRange::new(0.0, 120.0)));
        assert_eq!(table.get("D1", "pressure"), Some(ValueRange::new(1.0, 2.0)));
        assert_eq!(table.get("D1", "flow"), None);
        assert_eq!(table.get("D2", "temp_1"), None);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_violation_direction() {
        let range = ValueRange::new(80.0, 90.0);
        assert_eq!(range.violation(95.0), Some((Direction::High, 90.0)));
        assert_eq!(range.violation(79.9), Some((Direction::Low, 80.0)));
        assert_eq!(range.violation(80.0), None);
        assert_eq!(range.violation(90.0), None);
        assert!(range.contains(85.0));
    }
}
