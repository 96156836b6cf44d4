//! Service startup
//!
//! Builds every component from the validated configuration and hands the
//! three recurring jobs to the [`Scheduler`]:
//!
//! ```text
//! ┌──────────────┐ every poll interval ┌──────────────┐   ┌─────────────┐
//! │  Scheduler   │────────────────────►│  Collector   │──►│ raw_samples │
//! │              │                     │ poll/cal/deb │   └─────────────┘
//! │              │                     └──────┬───────┘          │
//! │              │                            ▼                  │
//! │              │                     ┌──────────────┐          │
//! │              │                     │ alarm_events │          │
//! │              │                     └──────────────┘          ▼
//! │              │ every tick interval ┌──────────────┐   ┌───────────────────┐
//! │              │────────────────────►│  Aggregator  │──►│ aggregate_windows │
//! │              │                     └──────────────┘   └───────────────────┘
//! │              │ daily 00:01 local   ┌──────────────┐
//! │              │────────────────────►│  Retention   │
//! └──────────────┘                     └──────────────┘
//! ```

use std::sync::Arc;

use chrono::Duration;
use errors::{PlantErrorTrait, PlantResult};
use plant_calc::CalibrationEngine;
use tracing::{error, info, warn};

use super::pipeline::Collector;
use super::scheduler::Scheduler;
use crate::alarm::{AlarmDebouncer, DebounceConfig, RangeTable};
use crate::config::CollsrvConfig;
use crate::history::{HistoryAggregator, RetentionTask};
use crate::poller::Poller;
use crate::storage::Stores;

/// Handles to the running components
pub struct CollectorService {
    pub collector: Arc<Collector>,
    pub aggregator: Arc<HistoryAggregator>,
    pub retention: RetentionTask,
}

impl CollectorService {
    /// Close device connections; call after the scheduler has stopped
    pub async fn shutdown(&self) {
        self.collector.shutdown().await;
        info!("Collector service stopped");
    }
}

/// Build the pipeline and start polling, aggregation and daily cleanup
///
/// Fails without spawning anything if the configuration cannot be turned
/// into components or the aggregator watermark cannot be restored.
pub async fn start_collector_service(
    config: &CollsrvConfig,
    stores: Stores,
    scheduler: &Scheduler,
) -> PlantResult<CollectorService> {
    let clock = scheduler.clock();
    let ranges = RangeTable::from_devices(&config.devices);
    let calibration = CalibrationEngine::from_config(&config.calibration)?;
    let cleanup_time = config.history.cleanup_time()?;

    let aggregator = Arc::new(HistoryAggregator::new(
        stores.raw.clone(),
        stores.aggregates.clone(),
        config.history.window(),
    )?);
    aggregator.init(clock.now()).await?;

    let poller = Poller::from_config(config, &ranges, clock.clone());
    let retention = RetentionTask::new(stores.raw.clone(), config.history.timezone)
        .with_aggregator(aggregator.clone());
    let range_count = ranges.len();
    let debouncer = AlarmDebouncer::new(ranges, DebounceConfig::from(&config.alarm));

    let collector = Arc::new(Collector::new(
        poller,
        calibration,
        debouncer,
        stores.raw.clone(),
        stores.events.clone(),
        retention.clone(),
        clock.clone(),
        Duration::seconds(config.alarm.stale_after_secs as i64),
        config.alarm.event_channel_capacity,
    ));

    info!(
        "Starting collector: {} devices, {} alarm ranges, poll every {:?}",
        collector.poller().device_count(),
        range_count,
        config.poller.interval()
    );

    let poll_collector = collector.clone();
    scheduler.spawn_periodic("poll", config.poller.interval(), move || {
        let collector = poll_collector.clone();
        async move {
            collector.run_poll_cycle().await;
        }
    });

    let tick_aggregator = aggregator.clone();
    let tick_clock = clock.clone();
    scheduler.spawn_periodic(
        "aggregate",
        config.history.tick_interval(),
        move || {
            let aggregator = tick_aggregator.clone();
            let clock = tick_clock.clone();
            async move {
                // Failures are logged by the aggregator and retried next tick
                let _ = aggregator.tick(clock.now()).await;
            }
        },
    );

    let daily_retention = retention.clone();
    scheduler.spawn_daily(
        "retention",
        config.history.timezone,
        cleanup_time,
        move |at| {
            let retention = daily_retention.clone();
            async move {
                if let Err(e) = retention.run_cleanup(at).await {
                    if e.is_retryable() {
                        warn!("Daily retention failed, next run tomorrow: {}", e);
                    } else {
                        error!("Daily retention failed: {}", e);
                    }
                }
            }
        },
    );

    Ok(CollectorService {
        collector,
        aggregator,
        retention,
    })
}
