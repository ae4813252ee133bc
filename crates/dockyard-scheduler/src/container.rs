//! The disposable container a build runs in.

use dockyard_core::{ContainerConfig, ContainerRuntime, Error, OutputSink, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A created and started container, owned by exactly one build.
///
/// Release it with [`Container::remove`]. A container dropped without being
/// removed (a cancelled build future, for instance) is removed in the
/// background instead.
pub struct Container {
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    released: bool,
}

impl Container {
    /// Create a container on `runtime` and start it. A container that was
    /// created but failed to start is removed before the error is returned.
    pub async fn create_and_start(
        runtime: Arc<dyn ContainerRuntime>,
        config: &ContainerConfig,
    ) -> Result<Self> {
        let id = runtime.create_container(config).await?;
        let container = Self {
            runtime,
            id,
            released: false,
        };

        if let Err(e) = container.runtime.start_container(&container.id).await {
            warn!(container = %container.id, error = %e, "Failed to start container");
            if let Err(remove_err) = container.remove().await {
                warn!(error = %remove_err, "Failed to remove unstarted container");
            }
            return Err(e);
        }

        info!(container = %container.id, image = %config.image, endpoint = %container.runtime.endpoint(), "Container started");
        Ok(container)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run `sh -c <command>`, streaming output to `sink`. A non-zero exit
    /// code is [`Error::CommandFailed`].
    pub async fn exec(&self, command: &str, sink: &dyn OutputSink) -> Result<()> {
        debug!(container = %self.id, command = %command, "Executing command");
        let cmd = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
        let code = self.runtime.exec(&self.id, cmd, sink).await?;
        if code != 0 {
            return Err(Error::CommandFailed { code });
        }
        Ok(())
    }

    /// Force-remove the container.
    pub async fn remove(mut self) -> Result<()> {
        self.released = true;
        self.runtime.remove_container(&self.id).await
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(container = %self.id, "Container dropped without removal, removing in background");
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let runtime = Arc::clone(&self.runtime);
        let id = std::mem::take(&mut self.id);
        handle.spawn(async move {
            if let Err(e) = runtime.remove_container(&id).await {
                warn!(container = %id, error = %e, "Background container removal failed");
            }
        });
    }
}
