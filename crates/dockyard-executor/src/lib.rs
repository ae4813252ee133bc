//! Container runtime backends for Dockyard CI.
//!
//! Provides:
//! - A Docker Engine endpoint implementing [`ContainerRuntime`]
//! - The round-robin pool builds acquire endpoints from

pub mod docker;
pub mod pool;

pub use docker::DockerRuntime;
pub use dockyard_core::{ContainerConfig, ContainerRuntime, OutputSink};
pub use pool::RuntimePool;
