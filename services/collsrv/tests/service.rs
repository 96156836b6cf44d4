//! Whole service on paused tokio time with a simulated device

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod support;

use std::sync::Arc;
use std::time::Duration;

use collsrv::config::CollsrvConfig;
use collsrv::poller::decode::DataType;
use collsrv::poller::reconnect::ConnectionState;
use collsrv::runtime::{start_collector_service, Scheduler};
use collsrv::storage::{AggregateStore, MemoryStore, Stores};
use common::time::{LocalZone, ManualClock};

use self::support::{at, device, point};

fn config() -> CollsrvConfig {
    let mut sim = device(
        "SIM1",
        vec![
            point("level", 0, DataType::U16, 1.0),
            point("temp", 1, DataType::I16, 0.1),
        ],
        &[("level", 10.0, 90.0)],
    );
    sim.simulated = true;

    let mut config = CollsrvConfig {
        devices: vec![sim],
        ..Default::default()
    };
    config.poller.interval_ms = 1000;
    config.history.window_secs = 60;
    config.history.tick_interval_secs = 5;
    config.history.timezone = LocalZone::utc();
    config
}

#[tokio::test(start_paused = true)]
async fn polls_on_schedule_and_stops_on_shutdown() {
    let config = config();
    config.validate().unwrap();

    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(at(0)));
    let scheduler = Scheduler::new(clock.clone());
    let service = start_collector_service(&config, Stores::shared(store.clone()), &scheduler)
        .await
        .unwrap();
    assert_eq!(scheduler.task_count(), 3);

    // Polls at 0, 1, 2, 3, 4 s
    tokio::time::sleep(Duration::from_millis(4500)).await;
    assert_eq!(store.sample_count(), 10);
    assert!(store.samples().iter().all(|s| s.device_name == "SIM1"));

    let statuses = service.collector.device_statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, ConnectionState::Connected);

    // Simulated values stay in range: no alarm state at all
    assert!(service.collector.alarm_snapshot().is_empty());

    scheduler.shutdown().await;
    service.shutdown().await;
    assert_eq!(scheduler.task_count(), 0);

    let polled = store.sample_count();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(store.sample_count(), polled);
}

#[tokio::test(start_paused = true)]
async fn aggregation_task_follows_the_clock() {
    let config = config();
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(at(0)));
    let scheduler = Scheduler::new(clock.clone());
    let service = start_collector_service(&config, Stores::shared(store.clone()), &scheduler)
        .await
        .unwrap();
    assert_eq!(service.aggregator.watermark().await, Some(at(0)));

    tokio::time::sleep(Duration::from_millis(500)).await;
    clock.set(at(61));
    // Next aggregation tick is at 5 s
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(service.aggregator.watermark().await, Some(at(60)));
    let rows = store.list_windows("SIM1", "level").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].window_start, at(0));
    assert!(rows[0].sample_count >= 1);
    assert!((10.0..=90.0).contains(&rows[0].mean_value));

    scheduler.shutdown().await;
}
