//! Poll → calibrate → store → debounce
//!
//! Batches are handled one after another so observations of one key reach
//! the debouncer in capture order.

use std::sync::Arc;

use chrono::Duration;
use common::time::Clock;
use errors::PlantErrorTrait;
use plant_calc::CalibrationEngine;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::alarm::{AlarmDebouncer, AlarmState};
use crate::history::RetentionTask;
use crate::model::{AlarmEvent, DeviceBatch, RawSample};
use crate::poller::status::DeviceStatus;
use crate::poller::Poller;
use crate::storage::{AlarmEventStore, RawSampleStore};

/// What one cycle produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    /// Devices that returned a batch
    pub devices: usize,
    pub samples_stored: u64,
    pub events: Vec<AlarmEvent>,
}

pub struct Collector {
    poller: Poller,
    calibration: CalibrationEngine,
    debouncer: AlarmDebouncer,
    raw: Arc<dyn RawSampleStore>,
    events: Arc<dyn AlarmEventStore>,
    retention: RetentionTask,
    event_tx: broadcast::Sender<AlarmEvent>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl Collector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        poller: Poller,
        calibration: CalibrationEngine,
        debouncer: AlarmDebouncer,
        raw: Arc<dyn RawSampleStore>,
        events: Arc<dyn AlarmEventStore>,
        retention: RetentionTask,
        clock: Arc<dyn Clock>,
        stale_after: Duration,
        event_capacity: usize,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            poller,
            calibration,
            debouncer,
            raw,
            events,
            retention,
            event_tx,
            clock,
            stale_after,
        }
    }

    /// Alarm activations and resolutions as they happen
    pub fn subscribe(&self) -> broadcast::Receiver<AlarmEvent> {
        self.event_tx.subscribe()
    }

    /// One poll round followed by processing of whatever came back
    pub async fn run_poll_cycle(&self) -> CycleSummary {
        let batches = self.poller.poll_round().await;
        self.process_batches(batches).await
    }

    pub async fn process_batches(&self, batches: Vec<DeviceBatch>) -> CycleSummary {
        let mut summary = CycleSummary {
            devices: batches.len(),
            ..Default::default()
        };

        for batch in batches {
            let samples = self.calibrate(batch);
            if samples.is_empty() {
                continue;
            }

            match self.raw.insert_batch(&samples).await {
                Ok(stored) => summary.samples_stored += stored,
                Err(e) => warn!(
                    "Storing {} samples of {} failed ({}): {}",
                    samples.len(),
                    samples[0].device_id,
                    e.error_code(),
                    e
                ),
            }

            for sample in &samples {
                if let Some(event) = self.debouncer.observe(
                    &sample.device_id,
                    &sample.point,
                    sample.value,
                    sample.timestamp,
                ) {
                    self.publish(&event).await;
                    summary.events.push(event);
                }
            }
        }

        if summary.samples_stored > 0 {
            if let Err(e) = self.retention.run_cleanup(self.clock.now()).await {
                warn!("Retention after insert failed: {}", e);
            }
        }

        for (device_id, point) in self.debouncer.stale_keys(self.clock.now(), self.stale_after) {
            debug!(
                "No data for {}/{} in {}s; alarm state frozen",
                device_id,
                point,
                self.stale_after.num_seconds()
            );
        }

        summary
    }

    fn calibrate(&self, batch: DeviceBatch) -> Vec<RawSample> {
        let DeviceBatch {
            device_id,
            device_name,
            timestamp,
            values,
        } = batch;

        values
            .into_iter()
            .map(|v| RawSample {
                value: self.calibration.calibrate(&device_id, &v.point, v.raw),
                device_id: device_id.clone(),
                device_name: device_name.clone(),
                point: v.point,
                timestamp,
            })
            .collect()
    }

    async fn publish(&self, event: &AlarmEvent) {
        if let Err(e) = self.events.record_event(event).await {
            warn!(
                "Persisting alarm event {}/{} failed: {}",
                event.device_id, event.point, e
            );
        }
        // No subscribers is fine
        let _ = self.event_tx.send(event.clone());
    }

    pub fn device_statuses(&self) -> Vec<DeviceStatus> {
        self.poller.device_statuses()
    }

    pub fn alarm_snapshot(&self) -> Vec<((String, String), AlarmState)> {
        let mut states: Vec<_> = self.debouncer.snapshot().into_iter().collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub async fn shutdown(&self) {
        self.poller.disconnect_all().await;
    }
}
