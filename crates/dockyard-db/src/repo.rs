//! Repository traits and implementations.

pub mod build;
pub mod hook;
pub mod log;

pub use build::{BuildRepo, PgBuildRepo};
pub use hook::{HookRecord, HookRepo, PgHookRepo};
pub use log::{LogRepo, PgLogRepo};
