//! Ingestion and flush pipeline.
//!
//! transport → [`Ingestor`] → buffer store append → [`FlushCoordinator`]
//! → flush policy → snapshot and clear → bulk sink → delete (durable only)

pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod ingestor;
pub mod registry;
pub mod scheduler;

pub use config::*;
pub use coordinator::*;
pub use diagnostics::*;
pub use ingestor::*;
pub use registry::*;
pub use scheduler::*;
