//! Alarm Debouncer and the ranges it checks against

pub mod debounce;
pub mod ranges;

pub use debounce::{AlarmDebouncer, AlarmPhase, AlarmState, DebounceConfig};
pub use ranges::{RangeTable, ValueRange};
