//! Daylog - day-file log persistence
//!
//! Durable per-day log files with severity filtering, a failure circuit
//! breaker, zip archival, archive retention and historical queries.

pub mod clock;
pub mod config;
pub mod engine;
pub mod logging;

pub use engine::{LogEngine, MaintenanceReport};
