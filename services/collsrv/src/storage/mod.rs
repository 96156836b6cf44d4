//! Persistence seams
//!
//! The pipeline and the history tasks only see these traits. [`SqliteStore`]
//! backs them in production; [`MemoryStore`] in tests.

pub mod memory_impl;
pub mod schema;
pub mod sqlite_impl;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errors::{PlantError, PlantResult};

use crate::model::{AggregateWindow, AlarmEvent, RawSample, WindowMean};

pub use memory_impl::MemoryStore;
pub use sqlite_impl::SqliteStore;

/// Append-only calibrated samples
#[async_trait]
pub trait RawSampleStore: Send + Sync {
    /// Insert all samples atomically; returns rows written
    async fn insert_batch(&self, samples: &[RawSample]) -> PlantResult<u64>;

    /// Newest sample time for one (device, point)
    async fn latest_timestamp(
        &self,
        device_id: &str,
        point: &str,
    ) -> PlantResult<Option<DateTime<Utc>>>;

    /// Delete samples strictly older than `cutoff`; returns rows deleted
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> PlantResult<u64>;

    /// Mean and count per (device, point) over `[start, end)`
    async fn window_means(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PlantResult<Vec<WindowMean>>;
}

/// Window averages and the aggregator watermark
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Insert or overwrite the row for (device, point, window_start)
    async fn upsert_window(&self, window: &AggregateWindow) -> PlantResult<()>;

    /// Largest window end of any stored row
    async fn latest_window_end(&self) -> PlantResult<Option<DateTime<Utc>>>;

    async fn load_watermark(&self) -> PlantResult<Option<DateTime<Utc>>>;

    /// Persist the watermark; never moves it backwards
    async fn save_watermark(&self, window_end: DateTime<Utc>) -> PlantResult<()>;

    /// Rows of one (device, point) ordered by window start
    async fn list_windows(&self, device_id: &str, point: &str)
        -> PlantResult<Vec<AggregateWindow>>;
}

#[async_trait]
pub trait AlarmEventStore: Send + Sync {
    async fn record_event(&self, event: &AlarmEvent) -> PlantResult<()>;

    /// Newest first
    async fn recent_events(&self, limit: usize) -> PlantResult<Vec<AlarmEvent>>;
}

/// The three stores as injected into the runtime
#[derive(Clone)]
pub struct Stores {
    pub raw: Arc<dyn RawSampleStore>,
    pub aggregates: Arc<dyn AggregateStore>,
    pub events: Arc<dyn AlarmEventStore>,
}

impl Stores {
    /// All three backed by one store
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: RawSampleStore + AggregateStore + AlarmEventStore + 'static,
    {
        Self {
            raw: store.clone(),
            aggregates: store.clone(),
            events: store,
        }
    }
}

pub(crate) fn from_millis(ms: i64) -> PlantResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| PlantError::Database(format!("timestamp {} out of range", ms)))
}
