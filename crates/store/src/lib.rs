//! Session buffer stores for the session batcher.
//!
//! Two interchangeable implementations of [`BufferStore`]:
//! - [`VolatileStore`]: process-local map, lives for the process lifetime
//! - [`DurableStore`]: loads and saves each buffer through a [`KvStore`]
//!   around every operation, for hosts that keep no memory between calls

pub mod durable;
pub mod kv;
pub mod locks;
pub mod store;
pub mod volatile;

pub use durable::*;
pub use kv::*;
pub use locks::*;
pub use store::*;
pub use volatile::*;
