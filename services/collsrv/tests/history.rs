//! History Aggregator and retention against on-disk SQLite

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod support;

use std::sync::Arc;

use chrono::{Duration, FixedOffset, TimeZone, Utc};
use collsrv::history::{HistoryAggregator, RetentionTask};
use collsrv::model::RawSample;
use collsrv::storage::{AggregateStore, RawSampleStore, SqliteStore};
use common::time::LocalZone;
use common::SqliteClient;

use self::support::at;

fn sample(point: &str, value: f64, secs: i64) -> RawSample {
    RawSample {
        device_id: "D1".to_string(),
        device_name: "Boiler".to_string(),
        point: point.to_string(),
        value,
        timestamp: at(secs),
    }
}

async fn open(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
    let client = SqliteClient::new(dir.path().join("collsrv.db")).await.unwrap();
    Arc::new(SqliteStore::new(client).await.unwrap())
}

fn aggregator(store: &Arc<SqliteStore>) -> HistoryAggregator {
    HistoryAggregator::new(store.clone(), store.clone(), Duration::minutes(15)).unwrap()
}

#[tokio::test]
async fn gaps_and_zero_means() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    // t0 is 08:00, aligned to 15 min
    store
        .insert_batch(&[
            sample("p", -1.0, 60),
            sample("p", 1.0, 120),
            // nothing in [900, 1800)
            sample("p", 4.0, 1800),
        ])
        .await
        .unwrap();

    let agg = aggregator(&store);
    assert_eq!(agg.init(at(10)).await.unwrap(), at(0));
    assert_eq!(agg.tick(at(2700)).await.unwrap(), 3);

    let rows = store.list_windows("D1", "p").await.unwrap();
    assert_eq!(rows.len(), 2, "empty window must not produce a row");
    assert_eq!(rows[0].window_start, at(0));
    assert_eq!(rows[0].mean_value, 0.0);
    assert_eq!(rows[0].sample_count, 2);
    assert_eq!(rows[1].window_start, at(1800));
    assert_eq!(rows[1].window_end, at(2700));
    assert_eq!(rows[1].mean_value, 4.0);
}

#[tokio::test]
async fn restart_resumes_from_persisted_watermark() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open(&dir).await;
        store.insert_batch(&[sample("p", 10.0, 30)]).await.unwrap();
        let agg = aggregator(&store);
        agg.init(at(0)).await.unwrap();
        assert_eq!(agg.tick(at(1000)).await.unwrap(), 1);
        store.client().close().await;
    }

    let store = open(&dir).await;
    // Arrives late for the first window; already aggregated, not revisited
    store
        .insert_batch(&[sample("p", 30.0, 40), sample("p", 20.0, 950)])
        .await
        .unwrap();
    let agg = aggregator(&store);
    assert_eq!(agg.init(at(5000)).await.unwrap(), at(900));
    assert_eq!(agg.tick(at(1800)).await.unwrap(), 1);

    let rows = store.list_windows("D1", "p").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].mean_value, 10.0);
    assert_eq!(rows[1].mean_value, 20.0);
}

#[tokio::test]
async fn replayed_window_overwrites_its_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    store.insert_batch(&[sample("p", 10.0, 30)]).await.unwrap();

    let agg = aggregator(&store);
    agg.init(at(0)).await.unwrap();
    agg.tick(at(900)).await.unwrap();

    // Late sample, and the watermark rolled back (restored from backup)
    store.insert_batch(&[sample("p", 20.0, 60)]).await.unwrap();
    sqlx::query("UPDATE aggregator_watermark SET window_end_ms = ?")
        .bind(at(0).timestamp_millis())
        .execute(store.client().pool())
        .await
        .unwrap();

    let replay = aggregator(&store);
    assert_eq!(replay.init(at(900)).await.unwrap(), at(0));
    assert_eq!(replay.tick(at(900)).await.unwrap(), 1);

    let rows = store.list_windows("D1", "p").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].mean_value, 15.0);
    assert_eq!(rows[0].sample_count, 2);
    assert_eq!(store.load_watermark().await.unwrap(), Some(at(900)));
}

#[tokio::test]
async fn retention_keeps_only_today() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    let zone = LocalZone::Fixed(FixedOffset::east_opt(2 * 3600).unwrap());
    let task = RetentionTask::new(store.clone(), zone);

    // Local midnight at +02:00 is 22:00 UTC the day before
    let ts = |d, h, m| Utc.with_ymd_and_hms(2024, 6, d, h, m, 0).unwrap();
    let make = |timestamp| RawSample {
        device_id: "D1".into(),
        device_name: "D1".into(),
        point: "p".into(),
        value: 1.0,
        timestamp,
    };
    store
        .insert_batch(&[
            make(ts(9, 12, 0)),
            make(ts(9, 21, 59)),
            make(ts(9, 22, 0)),
            make(ts(9, 22, 30)),
        ])
        .await
        .unwrap();

    let now = ts(9, 22, 1);
    assert_eq!(task.cutoff(now), ts(9, 22, 0));
    assert_eq!(task.run_cleanup(now).await.unwrap(), 2);
    assert_eq!(task.run_cleanup(now).await.unwrap(), 0);
    assert_eq!(
        store.latest_timestamp("D1", "p").await.unwrap(),
        Some(ts(9, 22, 30))
    );
}
