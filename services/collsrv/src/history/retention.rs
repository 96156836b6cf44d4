//! Raw-sample retention: only the current local day is kept
//!
//! Samples the aggregator has not yet consumed are never deleted, so the
//! cutoff is the earlier of local midnight and the aggregation watermark.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::time::LocalZone;
use errors::PlantResult;
use tracing::{debug, info};

use super::aggregator::HistoryAggregator;
use crate::storage::RawSampleStore;

#[derive(Clone)]
pub struct RetentionTask {
    raw: Arc<dyn RawSampleStore>,
    zone: LocalZone,
    aggregator: Option<Arc<HistoryAggregator>>,
}

impl RetentionTask {
    pub fn new(raw: Arc<dyn RawSampleStore>, zone: LocalZone) -> Self {
        Self {
            raw,
            zone,
            aggregator: None,
        }
    }

    /// Hold back deletion until `aggregator` has moved past the samples
    pub fn with_aggregator(mut self, aggregator: Arc<HistoryAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn zone(&self) -> LocalZone {
        self.zone
    }

    /// Start of the local day containing `now`
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.zone.start_of_day(now)
    }

    /// Day cutoff clamped to the aggregation watermark
    pub async fn effective_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let day_start = self.cutoff(now);
        let watermark = match &self.aggregator {
            Some(aggregator) => aggregator.watermark().await,
            None => None,
        };
        match watermark {
            Some(w) if w < day_start => w,
            _ => day_start,
        }
    }

    /// Delete raw samples from before today that are already aggregated;
    /// returns rows deleted
    pub async fn run_cleanup(&self, now: DateTime<Utc>) -> PlantResult<u64> {
        let cutoff = self.effective_cutoff(now).await;
        let deleted = self.raw.delete_older_than(cutoff).await?;
        if deleted > 0 {
            info!("Retention removed {} raw samples before {}", deleted, cutoff);
        } else {
            debug!("Retention: nothing before {}", cutoff);
        }
        Ok(deleted)
    }
}
