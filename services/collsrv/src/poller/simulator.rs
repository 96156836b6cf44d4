//! Simulated device for bench runs without hardware
//!
//! Every read produces register values that decode to a value inside the
//! point's configured range (0..100 when it has none). Registers written
//! through [`RegisterClient::write_register`] are served back as written.

use std::collections::HashMap;

use async_trait::async_trait;
use errors::{PlantError, PlantResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::client::{RegisterClient, RegisterKind};
use super::decode::{decode_point, encode_point, DataType};
use crate::alarm::ranges::{RangeTable, ValueRange};
use crate::config::{DeviceConfig, PointConfig};

const FALLBACK_RANGE: ValueRange = ValueRange {
    min: 0.0,
    max: 100.0,
};

pub struct SimulatedClient {
    device_id: String,
    points: Vec<(PointConfig, ValueRange)>,
    written: HashMap<u16, u16>,
    rng: StdRng,
    connected: bool,
}

impl SimulatedClient {
    pub fn new(device: &DeviceConfig, ranges: &RangeTable) -> Self {
        Self::with_rng(device, ranges, StdRng::from_entropy())
    }

    /// Deterministic sequence for tests
    pub fn with_seed(device: &DeviceConfig, ranges: &RangeTable, seed: u64) -> Self {
        Self::with_rng(device, ranges, StdRng::seed_from_u64(seed))
    }

    fn with_rng(device: &DeviceConfig, ranges: &RangeTable, rng: StdRng) -> Self {
        let points = device
            .points
            .iter()
            .map(|p| {
                let range = ranges.get(&device.id, &p.name).unwrap_or(FALLBACK_RANGE);
                (p.clone(), range)
            })
            .collect();
        Self {
            device_id: device.id.clone(),
            points,
            written: HashMap::new(),
            rng,
            connected: false,
        }
    }

    fn sample(&mut self, point: &PointConfig, range: ValueRange) -> Vec<u16> {
        let value = match point.data_type {
            DataType::F32 => self.uniform(range.min, range.max),
            _ => {
                // Pick an integer register value whose scaled value is in range
                let (a, b) = (range.min / point.scale, range.max / point.scale);
                let (lo, hi) = (a.min(b).ceil(), a.max(b).floor());
                if lo <= hi {
                    self.uniform(lo, hi).round() * point.scale
                } else {
                    (range.min + range.max) / 2.0
                }
            },
        };

        let registers = encode_point(point, value);
        match decode_point(point, point.offset, &registers) {
            Ok(decoded) if range.contains(decoded) => registers,
            _ => encode_point(point, (range.min + range.max) / 2.0),
        }
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if lo < hi {
            self.rng.gen_range(lo..=hi)
        } else {
            lo
        }
    }
}

#[async_trait]
impl RegisterClient for SimulatedClient {
    async fn connect(&mut self) -> PlantResult<()> {
        if !self.connected {
            debug!("Simulated device {} connected", self.device_id);
            self.connected = true;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn read_registers(
        &mut self,
        _kind: RegisterKind,
        start: u16,
        count: u16,
    ) -> PlantResult<Vec<u16>> {
        if !self.connected {
            return Err(PlantError::NotConnected(self.device_id.clone()));
        }

        let mut block = vec![0u16; usize::from(count)];
        let end = u32::from(start) + u32::from(count);

        let points = std::mem::take(&mut self.points);
        for (point, range) in &points {
            let registers = self.sample(point, *range);
            for (i, word) in registers.into_iter().enumerate() {
                let address = u32::from(point.offset) + i as u32;
                if address >= u32::from(start) && address < end {
                    block[(address - u32::from(start)) as usize] = word;
                }
            }
        }
        self.points = points;

        for (&address, &value) in &self.written {
            if address >= start && u32::from(address) < end {
                block[usize::from(address - start)] = value;
            }
        }
        Ok(block)
    }

    async fn write_register(&mut self, address: u16, value: u16) -> PlantResult<()> {
        if !self.connected {
            return Err(PlantError::NotConnected(self.device_id.clone()));
        }
        self.written.insert(address, value);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }
}
