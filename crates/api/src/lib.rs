//! HTTP transport for the session batcher.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
