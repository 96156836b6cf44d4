//! SQLite-backed stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::sqlite::SqliteClient;
use errors::{PlantError, PlantResult};
use sqlx::SqlitePool;
use tracing::{debug, trace};

use super::schema::init_schema;
use super::{from_millis, AggregateStore, AlarmEventStore, RawSampleStore};
use crate::model::{
    AggregateWindow, AlarmEvent, AlarmEventKind, Direction, RawSample, WindowMean,
};

#[derive(Clone)]
pub struct SqliteStore {
    client: SqliteClient,
}

impl SqliteStore {
    /// Wrap a client and create the schema if missing
    pub async fn new(client: SqliteClient) -> PlantResult<Self> {
        init_schema(client.pool()).await?;
        Ok(Self { client })
    }

    /// Fresh in-memory database, schema included
    pub async fn in_memory() -> PlantResult<Self> {
        let client = SqliteClient::in_memory()
            .await
            .map_err(|e| PlantError::Database(e.to_string()))?;
        Self::new(client).await
    }

    fn pool(&self) -> &SqlitePool {
        self.client.pool()
    }

    pub fn client(&self) -> &SqliteClient {
        &self.client
    }
}

#[async_trait]
impl RawSampleStore for SqliteStore {
    async fn insert_batch(&self, samples: &[RawSample]) -> PlantResult<u64> {
        if samples.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool().begin().await?;
        for sample in samples {
            sqlx::query(
                "INSERT INTO raw_samples (device_id, device_name, point, value, timestamp_ms) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&sample.device_id)
            .bind(&sample.device_name)
            .bind(&sample.point)
            .bind(sample.value)
            .bind(sample.timestamp.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        trace!("Inserted {} raw samples", samples.len());
        Ok(samples.len() as u64)
    }

    async fn latest_timestamp(
        &self,
        device_id: &str,
        point: &str,
    ) -> PlantResult<Option<DateTime<Utc>>> {
        let (latest,) = sqlx::query_as::<_, (Option<i64>,)>(
            "SELECT MAX(timestamp_ms) FROM raw_samples WHERE device_id = ? AND point = ?",
        )
        .bind(device_id)
        .bind(point)
        .fetch_one(self.pool())
        .await?;
        latest.map(from_millis).transpose()
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> PlantResult<u64> {
        let result = sqlx::query("DELETE FROM raw_samples WHERE timestamp_ms < ?")
            .bind(cutoff.timestamp_millis())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn window_means(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PlantResult<Vec<WindowMean>> {
        let rows = sqlx::query_as::<_, (String, String, f64, i64)>(
            "SELECT device_id, point, AVG(value), COUNT(*) FROM raw_samples \
             WHERE timestamp_ms >= ? AND timestamp_ms < ? \
             GROUP BY device_id, point ORDER BY device_id, point",
        )
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(device_id, point, mean, count)| WindowMean {
                device_id,
                point,
                mean,
                count,
            })
            .collect())
    }
}

#[async_trait]
impl AggregateStore for SqliteStore {
    async fn upsert_window(&self, window: &AggregateWindow) -> PlantResult<()> {
        sqlx::query(
            "INSERT INTO aggregate_windows \
             (device_id, point, window_start_ms, window_end_ms, mean_value, sample_count) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(device_id, point, window_start_ms) DO UPDATE SET \
             window_end_ms = excluded.window_end_ms, \
             mean_value = excluded.mean_value, \
             sample_count = excluded.sample_count",
        )
        .bind(&window.device_id)
        .bind(&window.point)
        .bind(window.window_start.timestamp_millis())
        .bind(window.window_end.timestamp_millis())
        .bind(window.mean_value)
        .bind(window.sample_count)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn latest_window_end(&self) -> PlantResult<Option<DateTime<Utc>>> {
        let (latest,) =
            sqlx::query_as::<_, (Option<i64>,)>("SELECT MAX(window_end_ms) FROM aggregate_windows")
                .fetch_one(self.pool())
                .await?;
        latest.map(from_millis).transpose()
    }

    async fn load_watermark(&self) -> PlantResult<Option<DateTime<Utc>>> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT window_end_ms FROM aggregator_watermark WHERE id = 1",
        )
        .fetch_optional(self.pool())
        .await?;
        row.map(|(ms,)| from_millis(ms)).transpose()
    }

    async fn save_watermark(&self, window_end: DateTime<Utc>) -> PlantResult<()> {
        sqlx::query(
            "INSERT INTO aggregator_watermark (id, window_end_ms, updated_at_ms) VALUES (1, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             window_end_ms = MAX(window_end_ms, excluded.window_end_ms), \
             updated_at_ms = excluded.updated_at_ms",
        )
        .bind(window_end.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .execute(self.pool())
        .await?;
        debug!("Aggregator watermark saved at {}", window_end);
        Ok(())
    }

    async fn list_windows(
        &self,
        device_id: &str,
        point: &str,
    ) -> PlantResult<Vec<AggregateWindow>> {
        let rows = sqlx::query_as::<_, (i64, i64, f64, i64)>(
            "SELECT window_start_ms, window_end_ms, mean_value, sample_count \
             FROM aggregate_windows WHERE device_id = ? AND point = ? \
             ORDER BY window_start_ms",
        )
        .bind(device_id)
        .bind(point)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|(start, end, mean_value, sample_count)| {
                Ok(AggregateWindow {
                    device_id: device_id.to_string(),
                    point: point.to_string(),
                    window_start: from_millis(start)?,
                    window_end: from_millis(end)?,
                    mean_value,
                    sample_count,
                })
            })
            .collect()
    }
}

#[async_trait]
impl AlarmEventStore for SqliteStore {
    async fn record_event(&self, event: &AlarmEvent) -> PlantResult<()> {
        sqlx::query(
            "INSERT INTO alarm_events \
             (device_id, point, kind, direction, value, threshold, timestamp_ms) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.device_id)
        .bind(&event.point)
        .bind(event.kind.as_str())
        .bind(event.direction.as_str())
        .bind(event.value)
        .bind(event.threshold)
        .bind(event.timestamp.timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> PlantResult<Vec<AlarmEvent>> {
        let rows = sqlx::query_as::<_, (String, String, String, String, f64, f64, i64)>(
            "SELECT device_id, point, kind, direction, value, threshold, timestamp_ms \
             FROM alarm_events ORDER BY timestamp_ms DESC, id DESC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|(device_id, point, kind, direction, value, threshold, ts)| {
                let kind = AlarmEventKind::parse(&kind)
                    .ok_or_else(|| PlantError::Database(format!("bad event kind '{}'", kind)))?;
                let direction = Direction::parse(&direction).ok_or_else(|| {
                    PlantError::Database(format!("bad event direction '{}'", direction))
                })?;
                Ok(AlarmEvent {
                    device_id,
                    point,
                    kind,
                    direction,
                    value,
                    threshold,
                    timestamp: from_millis(ts)?,
                })
            })
            .collect()
    }
}
