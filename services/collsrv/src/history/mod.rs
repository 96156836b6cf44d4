//! History Aggregator and raw-sample retention

pub mod aggregator;
pub mod retention;

pub use aggregator::{floor_to_window, HistoryAggregator, MAX_WINDOWS_PER_TICK};
pub use retention::RetentionTask;
