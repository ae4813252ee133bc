//! Configuration parsing for Dockyard CI.
//!
//! This crate handles parsing of:
//! - Build specs committed in repositories (`.dockyard.yml`)
//! - Server configuration (`dockyard.kdl`)

pub mod error;
pub mod spec;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use spec::{BUILD_SPEC_PATH, SpecWarning, parse_spec, validate_spec};
pub use system::{
    DEFAULT_MEMORY_LIMIT, DockerConfig, DockerEndpointConfig, GitHubConfig, SystemConfig,
    load_system_config, parse_system_config,
};
