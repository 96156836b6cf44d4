//! Plant services basic library
//!
//! Shared by every service in the workspace:
//! - logging (console + daily rolling files)
//! - configuration loading (figment)
//! - SQLite pool bootstrap
//! - clock abstraction and local-day arithmetic
//! - shutdown signal handling

pub mod bootstrap_args;
pub mod config_loader;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;
pub mod sqlite;
pub mod time;

pub use bootstrap_args::ServiceArgs;
pub use sqlite::{SqliteClient, SqlitePool};
pub use time::{Clock, LocalZone, ManualClock, SystemClock};
