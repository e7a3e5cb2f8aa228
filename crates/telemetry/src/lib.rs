//! Process-wide telemetry for the session batcher.
//!
//! Metrics live in memory and are exposed over the HTTP surface; logging goes
//! through `tracing`.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
