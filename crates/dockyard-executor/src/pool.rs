//! Round-robin pool of container runtime endpoints.

use dockyard_config::DockerConfig;
use dockyard_core::{ContainerRuntime, Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::DockerRuntime;

/// Fixed set of endpoints shared by all builds.
///
/// There is no health checking: a build routed to a down endpoint fails.
pub struct RuntimePool {
    endpoints: Vec<Arc<dyn ContainerRuntime>>,
    next: AtomicUsize,
}

impl RuntimePool {
    pub fn new(endpoints: Vec<Arc<dyn ContainerRuntime>>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::Internal(
                "runtime pool needs at least one endpoint".to_string(),
            ));
        }
        Ok(Self {
            endpoints,
            next: AtomicUsize::new(0),
        })
    }

    /// Connect to every configured Docker endpoint, or to the local daemon
    /// when none is configured.
    pub fn from_config(config: &DockerConfig) -> Result<Self> {
        let mut endpoints: Vec<Arc<dyn ContainerRuntime>> = Vec::new();
        if config.endpoints.is_empty() {
            endpoints.push(Arc::new(DockerRuntime::local()?));
        }
        for endpoint in &config.endpoints {
            endpoints.push(Arc::new(DockerRuntime::connect(endpoint)?));
        }
        info!(endpoints = endpoints.len(), "Runtime pool ready");
        Self::new(endpoints)
    }

    /// Next endpoint in rotation.
    pub fn acquire(&self) -> Arc<dyn ContainerRuntime> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        Arc::clone(&self.endpoints[index])
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
