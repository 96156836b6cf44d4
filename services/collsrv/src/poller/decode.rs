//! Register block layout and point decoding
//!
//! One read per device covers `[min offset, max(offset + width))`. Each point
//! is then decoded from its slice of that block and multiplied by its scale.

use errors::{PlantError, PlantResult};
use serde::{Deserialize, Serialize};

use crate::config::PointConfig;

/// Modbus limit for one read-registers request
pub const MAX_BLOCK_REGISTERS: u16 = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    U16,
    I16,
    U32,
    I32,
    F32,
}

impl DataType {
    /// Number of 16-bit registers
    pub fn width(&self) -> u16 {
        match self {
            Self::U16 | Self::I16 => 1,
            Self::U32 | Self::I32 | Self::F32 => 2,
        }
    }
}

/// Order of the two registers of a 32-bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordOrder {
    /// High word first (AB CD)
    #[default]
    Big,
    /// Low word first (CD AB)
    Little,
}

/// `(start, count)` of the block covering every point, None when there are no points
pub fn block_span(points: &[PointConfig]) -> Option<(u16, u16)> {
    let start = points.iter().map(|p| p.offset).min()?;
    let end = points
        .iter()
        .map(|p| u32::from(p.offset) + u32::from(p.data_type.width()))
        .max()?;
    let count = (end - u32::from(start)).min(u32::from(u16::MAX)) as u16;
    Some((start, count))
}

fn decode_error(point: &PointConfig, reason: impl Into<String>) -> PlantError {
    PlantError::Decode {
        point: point.name.clone(),
        reason: reason.into(),
    }
}

fn join_words(first: u16, second: u16, order: WordOrder) -> u32 {
    let (hi, lo) = match order {
        WordOrder::Big => (first, second),
        WordOrder::Little => (second, first),
    };
    (u32::from(hi) << 16) | u32::from(lo)
}

fn split_words(value: u32, order: WordOrder) -> [u16; 2] {
    let hi = (value >> 16) as u16;
    let lo = (value & 0xFFFF) as u16;
    match order {
        WordOrder::Big => [hi, lo],
        WordOrder::Little => [lo, hi],
    }
}

/// Decode one point from a block read starting at `block_start`
///
/// Errors only concern this point: registers outside the block, or an f32
/// that is NaN or infinite.
pub fn decode_point(point: &PointConfig, block_start: u16, registers: &[u16]) -> PlantResult<f64> {
    let width = usize::from(point.data_type.width());
    let index = point
        .offset
        .checked_sub(block_start)
        .map(usize::from)
        .ok_or_else(|| decode_error(point, "offset precedes the register block"))?;
    let words = registers
        .get(index..index + width)
        .ok_or_else(|| {
            decode_error(
                point,
                format!(
                    "registers {}..{} outside block of {} starting at {}",
                    point.offset,
                    usize::from(point.offset) + width,
                    registers.len(),
                    block_start
                ),
            )
        })?;

    let value = match point.data_type {
        DataType::U16 => f64::from(words[0]),
        DataType::I16 => f64::from(words[0] as i16),
        DataType::U32 => f64::from(join_words(words[0], words[1], point.word_order)),
        DataType::I32 => f64::from(join_words(words[0], words[1], point.word_order) as i32),
        DataType::F32 => {
            let f = f32::from_bits(join_words(words[0], words[1], point.word_order));
            if !f.is_finite() {
                return Err(decode_error(point, format!("non-finite float {}", f)));
            }
            f64::from(f)
        },
    };

    Ok(value * point.scale)
}

/// Inverse of [`decode_point`]: registers that decode to (approximately) `value`
///
/// Integer types round to the nearest representable value and saturate.
pub fn encode_point(point: &PointConfig, value: f64) -> Vec<u16> {
    let unscaled = value / point.scale;
    match point.data_type {
        DataType::U16 => vec![unscaled.round().clamp(0.0, f64::from(u16::MAX)) as u16],
        DataType::I16 => {
            let v = unscaled
                .round()
                .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
            vec![v as u16]
        },
        DataType::U32 => {
            let v = unscaled.round().clamp(0.0, f64::from(u32::MAX)) as u32;
            split_words(v, point.word_order).to_vec()
        },
        DataType::I32 => {
            let v = unscaled
                .round()
                .clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
            split_words(v as u32, point.word_order).to_vec()
        },
        DataType::F32 => split_words((unscaled as f32).to_bits(), point.word_order).to_vec(),
    }
}
