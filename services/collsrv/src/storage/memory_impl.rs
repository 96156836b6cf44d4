//! In-memory stores for tests and dry runs

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errors::{PlantError, PlantResult};
use parking_lot::RwLock;

use super::{AggregateStore, AlarmEventStore, RawSampleStore};
use crate::model::{AggregateWindow, AlarmEvent, RawSample, WindowMean};

type WindowKey = (String, String, DateTime<Utc>);

#[derive(Default)]
pub struct MemoryStore {
    samples: RwLock<Vec<RawSample>>,
    windows: RwLock<BTreeMap<WindowKey, AggregateWindow>>,
    watermark: RwLock<Option<DateTime<Utc>>>,
    events: RwLock<Vec<AlarmEvent>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail until cleared
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.read().len()
    }

    pub fn samples(&self) -> Vec<RawSample> {
        self.samples.read().clone()
    }

    fn check_writable(&self) -> PlantResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PlantError::Database("write rejected (fail_writes set)".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RawSampleStore for MemoryStore {
    async fn insert_batch(&self, samples: &[RawSample]) -> PlantResult<u64> {
        self.check_writable()?;
        self.samples.write().extend_from_slice(samples);
        Ok(samples.len() as u64)
    }

    async fn latest_timestamp(
        &self,
        device_id: &str,
        point: &str,
    ) -> PlantResult<Option<DateTime<Utc>>> {
        Ok(self
            .samples
            .read()
            .iter()
            .filter(|s| s.device_id == device_id && s.point == point)
            .map(|s| s.timestamp)
            .max())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> PlantResult<u64> {
        self.check_writable()?;
        let mut samples = self.samples.write();
        let before = samples.len();
        samples.retain(|s| s.timestamp >= cutoff);
        Ok((before - samples.len()) as u64)
    }

    async fn window_means(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PlantResult<Vec<WindowMean>> {
        let mut sums: BTreeMap<(String, String), (f64, i64)> = BTreeMap::new();
        for s in self
            .samples
            .read()
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp < end)
        {
            let entry = sums
                .entry((s.device_id.clone(), s.point.clone()))
                .or_insert((0.0, 0));
            entry.0 += s.value;
            entry.1 += 1;
        }
        Ok(sums
            .into_iter()
            .map(|((device_id, point), (sum, count))| WindowMean {
                device_id,
                point,
                mean: sum / count as f64,
                count,
            })
            .collect())
    }
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn upsert_window(&self, window: &AggregateWindow) -> PlantResult<()> {
        self.check_writable()?;
        self.windows.write().insert(
            (
                window.device_id.clone(),
                window.point.clone(),
                window.window_start,
            ),
            window.clone(),
        );
        Ok(())
    }

    async fn latest_window_end(&self) -> PlantResult<Option<DateTime<Utc>>> {
        Ok(self.windows.read().values().map(|w| w.window_end).max())
    }

    async fn load_watermark(&self) -> PlantResult<Option<DateTime<Utc>>> {
        Ok(*self.watermark.read())
    }

    async fn save_watermark(&self, window_end: DateTime<Utc>) -> PlantResult<()> {
        self.check_writable()?;
        let mut watermark = self.watermark.write();
        if watermark.map_or(true, |current| window_end > current) {
            *watermark = Some(window_end);
        }
        Ok(())
    }

    async fn list_windows(
        &self,
        device_id: &str,
        point: &str,
    ) -> PlantResult<Vec<AggregateWindow>> {
        Ok(self
            .windows
            .read()
            .values()
            .filter(|w| w.device_id == device_id && w.point == point)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AlarmEventStore for MemoryStore {
    async fn record_event(&self, event: &AlarmEvent) -> PlantResult<()> {
        self.check_writable()?;
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> PlantResult<Vec<AlarmEvent>> {
        Ok(self.events.read().iter().rev().take(limit).cloned().collect())
    }
}
