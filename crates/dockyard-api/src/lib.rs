//! API server for Dockyard CI.
//!
//! Accepts GitHub webhook events and serves builds, build logs and hook
//! registration over HTTP.

pub mod error;
pub mod routes;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use state::AppState;
