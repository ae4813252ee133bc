//! Server configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Memory ceiling for a build container, in bytes.
pub const DEFAULT_MEMORY_LIMIT: i64 = 1_024_000_000;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Server-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub github: GitHubConfig,
    pub docker: DockerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub api_url: String,
    /// Events the webhook subscribes to.
    pub events: Vec<String>,
    /// Public URL GitHub delivers events to.
    pub events_url: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GITHUB_API.to_string(),
            events: vec!["push".to_string(), "pull_request".to_string()],
            events_url: None,
            webhook_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    pub memory_limit: i64,
    /// Cluster hosts; empty means the local daemon.
    pub endpoints: Vec<DockerEndpointConfig>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            endpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerEndpointConfig {
    pub host: String,
    /// Directory holding `ca.pem`, `cert.pem` and `key.pem` for TLS hosts.
    pub cert_path: Option<String>,
}

/// Read and parse a KDL configuration file.
pub fn load_system_config(path: impl AsRef<Path>) -> ConfigResult<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_system_config(&content)
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut config = SystemConfig {
        port: DEFAULT_PORT,
        database_url: None,
        github: GitHubConfig::default(),
        docker: DockerConfig::default(),
    };

    for node in doc.nodes() {
        match node.name().value() {
            "server" => {
                if let Some(port) = get_integer_prop(node, "port") {
                    config.port = u16::try_from(port).map_err(|_| ConfigError::InvalidValue {
                        field: "server.port".to_string(),
                        message: format!("{} is not a valid port", port),
                    })?;
                }
            }
            "database" => {
                config.database_url = get_string_prop(node, "url");
            }
            "github" => parse_github(node, &mut config.github),
            "docker" => parse_docker(node, &mut config.docker)?,
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_github(node: &KdlNode, github: &mut GitHubConfig) {
    let Some(children) = node.children() else {
        return;
    };

    for child in children.nodes() {
        match child.name().value() {
            "api-url" => {
                if let Some(url) = get_first_string_arg(child) {
                    github.api_url = url.trim_end_matches('/').to_string();
                }
            }
            "events" => github.events = get_all_string_args(child),
            "events-url" => github.events_url = get_first_string_arg(child),
            "webhook-secret" => github.webhook_secret = get_first_string_arg(child),
            _ => {}
        }
    }
}

fn parse_docker(node: &KdlNode, docker: &mut DockerConfig) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "memory-limit" => {
                let limit = get_first_integer_arg(child).ok_or_else(|| {
                    ConfigError::MissingField("docker.memory-limit value".to_string())
                })?;
                docker.memory_limit =
                    i64::try_from(limit)
                        .ok()
                        .filter(|l| *l > 0)
                        .ok_or_else(|| ConfigError::InvalidValue {
                            field: "docker.memory-limit".to_string(),
                            message: format!("{} is not a positive byte count", limit),
                        })?;
            }
            "endpoint" => {
                let host = get_first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("docker.endpoint host".to_string()))?;
                docker.endpoints.push(DockerEndpointConfig {
                    host,
                    cert_path: get_string_prop(child, "cert-path"),
                });
            }
            _ => {}
        }
    }

    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_integer_prop(node: &KdlNode, name: &str) -> Option<i128> {
    node.get(name).and_then(|v| v.as_integer())
}
