//! Shared harness for the session batcher integration tests.

pub mod mocks;
