//! Core types, flush policy, and validation for the session batcher.

pub mod buffer;
pub mod clock;
pub mod config;
pub mod error;
pub mod limits;
pub mod policy;
pub mod record;
pub mod wire;

pub use buffer::*;
pub use clock::*;
pub use config::*;
pub use error::{Error, Result};
pub use policy::{evaluate, evaluate_overdue, should_flush, FlushDecision};
pub use record::*;
