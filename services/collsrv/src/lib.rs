//! Plant telemetry collector (collsrv)
//!
//! Polls register-based field devices on a fixed cadence, calibrates the
//! decoded values, stores them, raises debounced range alarms and keeps
//! fixed-window averages of the stored samples.
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐
//! │  Poller  │──►│ Calibration │──►│ raw_samples  │◄──│ History         │
//! │ (Modbus) │   │ (plant-calc)│   └──────────────┘   │ Aggregator      │
//! └──────────┘   └──────┬──────┘                      └────────┬────────┘
//!                       ▼                                      ▼
//!               ┌───────────────┐                   ┌───────────────────┐
//!               │ Alarm         │──► alarm_events   │ aggregate_windows │
//!               │ Debouncer     │──► broadcast      └───────────────────┘
//!               └───────────────┘
//! ```
//!
//! Everything runs on one tokio runtime; the [`runtime::Scheduler`] owns the
//! timers and stops them on shutdown.

pub mod alarm;
pub mod config;
pub mod history;
pub mod model;
pub mod poller;
pub mod runtime;
pub mod storage;

pub use config::CollsrvConfig;
pub use runtime::{start_collector_service, Collector, CollectorService, Scheduler};
