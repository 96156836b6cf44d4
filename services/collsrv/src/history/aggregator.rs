//! Fixed-window averaging of raw samples
//!
//! The watermark is the end of the last window fully written. A tick
//! processes every window that has closed since, oldest first, and only
//! moves the watermark after that window's rows are stored.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use errors::{PlantError, PlantErrorTrait, PlantResult};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::model::AggregateWindow;
use crate::storage::{AggregateStore, RawSampleStore};

/// Upper bound on windows handled in one tick; the rest wait for the next
pub const MAX_WINDOWS_PER_TICK: usize = 672;

/// Start of the epoch-aligned window containing `at`
pub fn floor_to_window(at: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let width = window.num_milliseconds();
    if width <= 0 {
        return at;
    }
    let ms = at.timestamp_millis();
    let floored = ms - ms.rem_euclid(width);
    Utc.timestamp_millis_opt(floored).single().unwrap_or(at)
}

pub struct HistoryAggregator {
    raw: Arc<dyn RawSampleStore>,
    aggregates: Arc<dyn AggregateStore>,
    window: Duration,
    watermark: Mutex<Option<DateTime<Utc>>>,
}

impl HistoryAggregator {
    pub fn new(
        raw: Arc<dyn RawSampleStore>,
        aggregates: Arc<dyn AggregateStore>,
        window: Duration,
    ) -> PlantResult<Self> {
        if window <= Duration::zero() {
            return Err(PlantError::invalid_config(
                "history.window_secs",
                "window must be positive",
            ));
        }
        Ok(Self {
            raw,
            aggregates,
            window,
            watermark: Mutex::new(None),
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn watermark(&self) -> Option<DateTime<Utc>> {
        *self.watermark.lock().await
    }

    /// Restore the watermark: persisted value, else newest aggregate row,
    /// else the start of the window containing `now`
    pub async fn init(&self, now: DateTime<Utc>) -> PlantResult<DateTime<Utc>> {
        let mut watermark = self.watermark.lock().await;

        let (restored, source) = match self.aggregates.load_watermark().await? {
            Some(persisted) => (persisted, "persisted watermark"),
            None => match self.aggregates.latest_window_end().await? {
                Some(latest) => (latest, "latest aggregate row"),
                None => (floor_to_window(now, self.window), "current window start"),
            },
        };

        info!(
            "History aggregator starting at {} (from {}, window {}s)",
            restored,
            source,
            self.window.num_seconds()
        );
        *watermark = Some(restored);
        Ok(restored)
    }

    /// Aggregate every closed window; returns how many windows were completed
    ///
    /// A store failure ends the tick with the watermark left at the last
    /// completed window, so the failed window is retried on the next tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> PlantResult<usize> {
        let mut guard = self.watermark.lock().await;
        let mut watermark = match *guard {
            Some(w) => w,
            None => {
                drop(guard);
                self.init(now).await?;
                guard = self.watermark.lock().await;
                guard.unwrap_or_else(|| floor_to_window(now, self.window))
            },
        };

        let mut completed = 0;
        while now >= watermark + self.window {
            if completed == MAX_WINDOWS_PER_TICK {
                debug!(
                    "Aggregation catch-up paused at {} after {} windows",
                    watermark, completed
                );
                break;
            }

            let end = watermark + self.window;
            if let Err(e) = self.aggregate_window(watermark, end).await {
                warn!(
                    "Aggregation of [{}, {}) failed ({}), will retry: {}",
                    watermark,
                    end,
                    e.error_code(),
                    e
                );
                return Err(e);
            }

            watermark = end;
            *guard = Some(watermark);
            completed += 1;
        }

        Ok(completed)
    }

    async fn aggregate_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> PlantResult<()> {
        let means = self.raw.window_means(start, end).await?;

        for mean in &means {
            self.aggregates
                .upsert_window(&AggregateWindow {
                    device_id: mean.device_id.clone(),
                    point: mean.point.clone(),
                    window_start: start,
                    window_end: end,
                    mean_value: mean.mean,
                    sample_count: mean.count,
                })
                .await?;
        }
        self.aggregates.save_watermark(end).await?;

        if means.is_empty() {
            debug!("Window [{}, {}) had no samples", start, end);
        } else {
            debug!("Window [{}, {}) aggregated {} series", start, end, means.len());
        }
        Ok(())
    }
}
