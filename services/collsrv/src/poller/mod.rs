//! Device Poller
//!
//! One round visits every device concurrently. Per device: connect if
//! needed (subject to backoff), read one register block, decode each point.
//! A device that fails or exceeds `device_timeout` is skipped for the round
//! and never delays the others.

pub mod client;
pub mod decode;
pub mod reconnect;
pub mod simulator;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use common::time::Clock;
use errors::{PlantError, PlantErrorTrait, PlantResult};
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::alarm::ranges::RangeTable;
use crate::config::{CollsrvConfig, DeviceConfig};
use crate::model::{DeviceBatch, PointValue};

use self::client::{ModbusTcpClient, RegisterClient};
use self::decode::{block_span, decode_point};
use self::reconnect::{ReconnectHelper, ReconnectPolicy};
use self::simulator::SimulatedClient;
use self::status::{DeviceStatus, DeviceStatusRegistry};

struct DeviceSlot {
    config: DeviceConfig,
    block: Option<(u16, u16)>,
    client: Box<dyn RegisterClient>,
    reconnect: ReconnectHelper,
}

/// Outcome of one device in one round
enum RoundOutcome {
    Batch(DeviceBatch),
    /// Waiting out a reconnect delay, no I/O performed
    Skipped,
}

pub struct Poller {
    devices: Vec<Mutex<DeviceSlot>>,
    statuses: DeviceStatusRegistry,
    clock: Arc<dyn Clock>,
    device_timeout: Duration,
}

impl Poller {
    /// Create a poller over explicitly supplied clients
    pub fn new(
        devices: Vec<(DeviceConfig, Box<dyn RegisterClient>)>,
        policy: ReconnectPolicy,
        device_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let statuses = DeviceStatusRegistry::new(devices.iter().map(|(d, _)| d.id.as_str()));
        let devices = devices
            .into_iter()
            .map(|(config, client)| {
                Mutex::new(DeviceSlot {
                    block: block_span(&config.points),
                    config,
                    client,
                    reconnect: ReconnectHelper::new(policy.clone()),
                })
            })
            .collect();

        Self {
            devices,
            statuses,
            clock,
            device_timeout,
        }
    }

    /// Modbus TCP clients for real devices, simulators for `simulated: true`
    pub fn from_config(config: &CollsrvConfig, ranges: &RangeTable, clock: Arc<dyn Clock>) -> Self {
        let devices = config
            .devices
            .iter()
            .map(|device| {
                let client: Box<dyn RegisterClient> = if device.simulated {
                    Box::new(SimulatedClient::new(device, ranges))
                } else {
                    Box::new(ModbusTcpClient::new(
                        device.id.clone(),
                        device.address.clone(),
                        device.unit_id,
                    ))
                };
                (device.clone(), client)
            })
            .collect();

        Self::new(
            devices,
            config.poller.reconnect.policy(),
            config.poller.device_timeout(),
            clock,
        )
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Poll every device once; failed or skipped devices contribute nothing
    pub async fn poll_round(&self) -> Vec<DeviceBatch> {
        let futures = self.devices.iter().map(|slot| self.poll_slot(slot));
        join_all(futures).await.into_iter().flatten().collect()
    }

    async fn poll_slot(&self, slot: &Mutex<DeviceSlot>) -> Option<DeviceBatch> {
        let mut slot = slot.lock().await;
        let started = Instant::now();

        let result = tokio::time::timeout(self.device_timeout, self.read_device(&mut slot)).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let device_id = slot.config.id.clone();

        let error = match result {
            Ok(Ok(RoundOutcome::Batch(batch))) => {
                slot.reconnect.mark_connected();
                self.statuses
                    .record_success(&device_id, latency_ms, batch.timestamp);
                trace!(
                    "Device {} read {} points in {}ms",
                    device_id,
                    batch.values.len(),
                    latency_ms
                );
                return Some(batch);
            },
            Ok(Ok(RoundOutcome::Skipped)) => return None,
            Ok(Err(e)) => e,
            Err(_) => PlantError::Timeout(format!(
                "{} after {}ms",
                device_id,
                self.device_timeout.as_millis()
            )),
        };

        // Any failure drops the connection; the next allowed round reconnects
        slot.client.disconnect().await;
        let delay = slot.reconnect.record_failure(Instant::now());
        self.statuses.record_failure(
            &device_id,
            latency_ms,
            error.to_string(),
            slot.reconnect.consecutive_failures(),
        );

        let message = format!(
            "Device {} unavailable this round ({}): {}; retry in {:?}",
            device_id,
            error.error_code(),
            error,
            delay
        );
        if slot.reconnect.consecutive_failures() == 1 {
            warn!("{}", message);
        } else {
            debug!("{}", message);
        }
        None
    }

    async fn read_device(&self, slot: &mut DeviceSlot) -> PlantResult<RoundOutcome> {
        if !slot.client.is_connected() {
            if !slot.reconnect.should_attempt(Instant::now()) {
                return Ok(RoundOutcome::Skipped);
            }
            slot.client.connect().await?;
        }

        let config = &slot.config;
        let Some((start, count)) = slot.block else {
            // No points configured: a successful empty round
            return Ok(RoundOutcome::Batch(DeviceBatch {
                device_id: config.id.clone(),
                device_name: config.display_name().to_string(),
                timestamp: self.clock.now(),
                values: Vec::new(),
            }));
        };

        let registers = slot
            .client
            .read_registers(config.register_kind, start, count)
            .await?;
        let timestamp = self.clock.now();

        let mut values = Vec::with_capacity(config.points.len());
        for point in &config.points {
            match decode_point(point, start, &registers) {
                Ok(raw) => values.push(PointValue {
                    point: point.name.clone(),
                    raw,
                }),
                Err(e) => debug!("Device {}: dropping point this round: {}", config.id, e),
            }
        }

        Ok(RoundOutcome::Batch(DeviceBatch {
            device_id: config.id.clone(),
            device_name: config.display_name().to_string(),
            timestamp,
            values,
        }))
    }

    /// Write one holding register on a device, connecting if necessary
    pub async fn write_register(&self, device_id: &str, address: u16, value: u16) -> PlantResult<()> {
        for slot in &self.devices {
            let mut slot = slot.lock().await;
            if slot.config.id != device_id {
                continue;
            }
            let write = async {
                slot.client.connect().await?;
                slot.client.write_register(address, value).await?;
                Ok::<(), PlantError>(())
            };
            return tokio::time::timeout(self.device_timeout, write)
                .await
                .map_err(|_| PlantError::Timeout(device_id.to_string()))?;
        }
        Err(PlantError::invalid_config(
            "device_id",
            format!("unknown device '{}'", device_id),
        ))
    }

    pub fn device_statuses(&self) -> Vec<DeviceStatus> {
        self.statuses.snapshot()
    }

    pub fn status_registry(&self) -> &DeviceStatusRegistry {
        &self.statuses
    }

    /// Close every connection (shutdown)
    pub async fn disconnect_all(&self) {
        let futures = self.devices.iter().map(|slot| async move {
            let mut slot = slot.lock().await;
            slot.client.disconnect().await;
            slot.reconnect.reset();
            self.statuses.mark_disconnected(&slot.config.id);
        });
        join_all(futures).await;
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::config::PointConfig;
    use crate::poller::client::RegisterKind;
    use crate::poller::decode::DataType;
    use async_trait::async_trait;
    use chrono::Utc;
    use common::time::ManualClock;
    use tracing_test::traced_test;

    struct Unreachable;

    #[async_trait]
    impl RegisterClient for Unreachable {
        async fn connect(&mut self) -> PlantResult<()> {
            Err(PlantError::ConnectionFailed {
                endpoint: "10.0.0.9:502".to_string(),
                reason: "connection refused".to_string(),
            })
        }

        fn is_connected(&self) -> bool {
            false
        }

        async fn read_registers(
            &mut self,
            _kind: RegisterKind,
            _start: u16,
            _count: u16,
        ) -> PlantResult<Vec<u16>> {
            Err(PlantError::NotConnected("D9".to_string()))
        }

        async fn write_register(&mut self, _address: u16, _value: u16) -> PlantResult<()> {
            Err(PlantError::NotConnected("D9".to_string()))
        }

        async fn disconnect(&mut self) {}
    }

    fn device() -> DeviceConfig {
        DeviceConfig {
            id: "D9".to_string(),
            name: None,
            address: "10.0.0.9:502".to_string(),
            unit_id: 1,
            register_kind: RegisterKind::Holding,
            simulated: false,
            points: vec![PointConfig {
                name: "p".to_string(),
                offset: 0,
                data_type: DataType::U16,
                scale: 1.0,
                word_order: Default::default(),
            }],
            ranges: Default::default(),
            range_groups: vec![],
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_first_failure_warns_then_quiet() {
        let poller = Poller::new(
            vec![(device(), Box::new(Unreachable) as Box<dyn RegisterClient>)],
            ReconnectPolicy::from_config(0, 0, 1.0, false),
            Duration::from_secs(1),
            Arc::new(ManualClock::new(Utc::now())),
        );

        assert!(poller.poll_round().await.is_empty());
        assert!(logs_contain("Device D9 unavailable this round"));
        assert!(logs_contain("CONNECTION_FAILED"));

        assert!(poller.poll_round().await.is_empty());
        let status = poller.status_registry().get("D9").unwrap();
        assert_eq!(status.consecutive_failures, 2);
        assert_eq!(status.last_success, None);

        logs_assert(|lines: &[&str]| {
            let warns = lines
                .iter()
                .filter(|l| l.contains("WARN") && l.contains("unavailable this round"))
                .count();
            if warns == 1 {
                Ok(())
            } else {
                Err(format!("expected one warning, saw {}", warns))
            }
        });
    }
}
