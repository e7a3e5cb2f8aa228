//! Bulk sinks for flushed session batches.
//!
//! A sink pushes one [`Batch`](batch_core::Batch) as a single bulk operation
//! routed by session key. Sinks never retry; a failed push is reported to
//! the caller, which logs the batch as lost.

pub mod clickhouse_sink;
pub mod config;
pub mod elasticsearch;
pub mod lifecycle;
pub mod schema;
pub mod sink;

pub use clickhouse_sink::ClickHouseSink;
pub use config::*;
pub use elasticsearch::ElasticsearchSink;
pub use lifecycle::LifecyclePolicy;
pub use sink::*;
