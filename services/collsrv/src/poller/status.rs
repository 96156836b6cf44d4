//! Device connection status registry

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::reconnect::ConnectionState;

/// What an operator sees for one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub state: ConnectionState,
    /// Duration of the last attempted round
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
}

impl DeviceStatus {
    fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            state: ConnectionState::Disconnected,
            last_latency_ms: None,
            last_error: None,
            consecutive_failures: 0,
            last_success: None,
        }
    }
}

/// Shared, concurrently updated status map
#[derive(Debug, Clone, Default)]
pub struct DeviceStatusRegistry {
    inner: Arc<DashMap<String, DeviceStatus>>,
}

impl DeviceStatusRegistry {
    pub fn new<'a>(device_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let inner = DashMap::new();
        for id in device_ids {
            inner.insert(id.to_string(), DeviceStatus::new(id));
        }
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn record_success(&self, device_id: &str, latency_ms: u64, at: DateTime<Utc>) {
        let mut entry = self
            .inner
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceStatus::new(device_id));
        entry.state = ConnectionState::Connected;
        entry.last_latency_ms = Some(latency_ms);
        entry.last_error = None;
        entry.consecutive_failures = 0;
        entry.last_success = Some(at);
    }

    pub fn record_failure(
        &self,
        device_id: &str,
        latency_ms: u64,
        error: String,
        consecutive_failures: u32,
    ) {
        let mut entry = self
            .inner
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceStatus::new(device_id));
        entry.state = ConnectionState::Reconnecting;
        entry.last_latency_ms = Some(latency_ms);
        entry.last_error = Some(error);
        entry.consecutive_failures = consecutive_failures;
    }

    pub fn mark_disconnected(&self, device_id: &str) {
        if let Some(mut entry) = self.inner.get_mut(device_id) {
            entry.state = ConnectionState::Disconnected;
        }
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceStatus> {
        self.inner.get(device_id).map(|e| e.value().clone())
    }

    /// All statuses sorted by device id
    pub fn snapshot(&self) -> Vec<DeviceStatus> {
        let mut all: Vec<DeviceStatus> = self.inner.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        all
    }
}
