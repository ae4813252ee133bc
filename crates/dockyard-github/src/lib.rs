//! GitHub integration for Dockyard CI.
//!
//! - [`GitHubClient`]: the REST client builds use as their source control
//! - [`webhook`]: event payload parsing and signature verification

pub mod archive;
pub mod client;
pub mod error;
pub mod webhook;

pub use client::{GitHubClient, GitHubClientFactory};
pub use error::GitHubError;
pub use webhook::{parse_event, verify_signature};
