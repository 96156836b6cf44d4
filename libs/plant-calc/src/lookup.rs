//! Lookup-table calibration with piecewise-linear interpolation

use crate::config::LookupEntry;
use crate::error::{CalcError, Result};

/// Lookup table sorted by raw value ascending
#[derive(Debug, Clone)]
pub struct LookupTable {
    entries: Vec<LookupEntry>,
}

impl LookupTable {
    /// Build a table, sorting entries by raw value once
    ///
    /// Entries with equal raw values keep their declaration order.
    pub fn new(mut entries: Vec<LookupEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(CalcError::invalid_rule("lookup table has no entries"));
        }
        if let Some(bad) = entries
            .iter()
            .find(|e| !e.raw.is_finite() || !e.value.is_finite())
        {
            return Err(CalcError::invalid_rule(format!(
                "lookup entry ({}, {}) is not finite",
                bad.raw, bad.value
            )));
        }

        entries.sort_by(|a, b| a.raw.total_cmp(&b.raw));
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Map a raw value to its engineering value
    ///
    /// Values at or beyond either end clamp to that end's value; values in
    /// between are linearly interpolated and rounded to the nearest integer.
    /// Where several entries share a raw value, the last one declared wins
    /// at exactly that value.
    pub fn interpolate(&self, x: f64) -> f64 {
        // Non-empty is guaranteed by the constructor
        let first = self.entries[0];
        let last = self.entries[self.entries.len() - 1];

        if x <= first.raw {
            return first.value;
        }
        if x >= last.raw {
            return last.value;
        }

        // First entry strictly above x; its predecessor is at or below x
        let upper = self.entries.partition_point(|e| e.raw <= x);
        let lo = self.entries[upper - 1];
        let hi = self.entries[upper];

        if hi.raw == lo.raw {
            return lo.value;
        }

        let y = lo.value + (x - lo.raw) * (hi.value - lo.value) / (hi.raw - lo.raw);
        y.round()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn entry(raw: f64, value: f64) -> LookupEntry {
        LookupEntry { raw, value }
    }

    #[test]
    fn test_interpolation_and_clamping() {
        let table = LookupTable::new(vec![entry(0.0, 0.0), entry(100.0, 50.0)]).unwrap();

        assert_eq!(table.interpolate(50.0), 25.0);
        assert_eq!(table.interpolate(-10.0), 0.0);
        assert_eq!(table.interpolate(150.0), 50.0);
        assert_eq!(table.interpolate(0.0), 0.0);
        assert_eq!(table.interpolate(100.0), 50.0);
    }

    #[test]
    fn test_entries_sorted_at_load() {
        let table = LookupTable::new(vec![
            entry(200.0, 80.0),
            entry(0.0, 0.0),
            entry(100.0, 50.0),
        ])
        .unwrap();

        assert_eq!(table.interpolate(150.0), 65.0);
        assert_eq!(table.interpolate(75.0), 38.0); // 37.5 rounds away from zero
    }

    #[test]
    fn test_duplicate_raw_entries_never_divide_by_zero() {
        let table = LookupTable::new(vec![
            entry(0.0, 0.0),
            entry(50.0, 20.0),
            entry(50.0, 30.0),
            entry(100.0, 40.0),
        ])
        .unwrap();

        // At a duplicated raw value the later declared entry wins
        assert_eq!(table.interpolate(50.0), 30.0);
        // Just below it, interpolation still runs toward the earlier entry
        assert_eq!(table.interpolate(49.0), 20.0);
        assert_eq!(table.interpolate(75.0), 35.0);
    }

    #[test]
    fn test_all_entries_identical_raw() {
        let table = LookupTable::new(vec![entry(10.0, 3.0), entry(10.0, 7.0)]).unwrap();
        assert_eq!(table.interpolate(10.0), 3.0);
        assert_eq!(table.interpolate(5.0), 3.0);
        assert_eq!(table.interpolate(15.0), 7.0);
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(LookupTable::new(vec![]).is_err());
        assert!(LookupTable::new(vec![entry(f64::NAN, 1.0)]).is_err());
    }
}
