//! Shared fixtures for collsrv integration tests

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use collsrv::config::{DeviceConfig, PointConfig, RangeConfig};
use collsrv::poller::client::{RegisterClient, RegisterKind};
use collsrv::poller::decode::{DataType, WordOrder};
use errors::{PlantError, PlantResult};
use parking_lot::Mutex;

/// 2024-01-15 08:00:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(secs)
}

pub fn point(name: &str, offset: u16, data_type: DataType, scale: f64) -> PointConfig {
    PointConfig {
        name: name.to_string(),
        offset,
        data_type,
        scale,
        word_order: WordOrder::Big,
    }
}

pub fn device(id: &str, points: Vec<PointConfig>, ranges: &[(&str, f64, f64)]) -> DeviceConfig {
    DeviceConfig {
        id: id.to_string(),
        name: None,
        address: "127.0.0.1:502".to_string(),
        unit_id: 1,
        register_kind: RegisterKind::Holding,
        simulated: false,
        points,
        ranges: ranges
            .iter()
            .map(|(p, min, max)| (p.to_string(), RangeConfig { min: *min, max: *max }))
            .collect::<HashMap<_, _>>(),
        range_groups: vec![],
    }
}

/// What the next read returns
#[derive(Debug, Clone)]
pub enum Step {
    Registers(Vec<u16>),
    Fail,
    /// Never completes
    Hang,
}

/// Register client driven by a queue of steps; repeats the last one when
/// the queue runs dry
#[derive(Clone, Default)]
pub struct ScriptedClient {
    steps: Arc<Mutex<VecDeque<Step>>>,
    last: Arc<Mutex<Option<Step>>>,
    pub refuse_connect: Arc<Mutex<bool>>,
    pub connects: Arc<AtomicUsize>,
    pub reads: Arc<AtomicUsize>,
    connected: bool,
}

impl ScriptedClient {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            ..Default::default()
        }
    }

    /// Refuses every connect; nothing is queued, so steps pushed later run
    /// first once connects are allowed
    pub fn refusing() -> Self {
        let client = Self::default();
        *client.refuse_connect.lock() = true;
        client
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().push_back(step);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock();
        let mut last = self.last.lock();
        if let Some(step) = steps.pop_front() {
            *last = Some(step.clone());
            step
        } else {
            last.clone().unwrap_or(Step::Fail)
        }
    }
}

#[async_trait]
impl RegisterClient for ScriptedClient {
    async fn connect(&mut self) -> PlantResult<()> {
        if self.connected {
            return Ok(());
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        if *self.refuse_connect.lock() {
            return Err(PlantError::ConnectionFailed {
                endpoint: "scripted".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn read_registers(
        &mut self,
        _kind: RegisterKind,
        _start: u16,
        count: u16,
    ) -> PlantResult<Vec<u16>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::Registers(mut registers) => {
                registers.resize(usize::from(count), 0);
                Ok(registers)
            },
            Step::Fail => Err(PlantError::protocol("scripted", "exception IllegalDataAddress")),
            Step::Hang => std::future::pending().await,
        }
    }

    async fn write_register(&mut self, _address: u16, _value: u16) -> PlantResult<()> {
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }
}
