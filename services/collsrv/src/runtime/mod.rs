//! Runtime orchestration: timers, the poll pipeline and service startup

pub mod lifecycle;
pub mod pipeline;
pub mod scheduler;

pub use lifecycle::{start_collector_service, CollectorService};
pub use pipeline::{Collector, CycleSummary};
pub use scheduler::Scheduler;
