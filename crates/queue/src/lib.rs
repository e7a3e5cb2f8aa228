//! Message-queue trigger for the session batcher.
//!
//! Reads one pipe-delimited log message per queue record and hands it to
//! the [`pipeline::Ingestor`]. Offsets advance only past messages that were
//! ingested or permanently rejected.

pub mod config;
pub mod consumer;
pub mod worker;

pub use config::*;
pub use consumer::{QueueConsumer, QueueRecord, RecordSource};
pub use worker::{BatchOutcome, QueueWorker};
