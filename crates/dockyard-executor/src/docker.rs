//! Docker Engine endpoint.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{BuildImageOptions, TagImageOptions};
use bollard::models::HostConfig;
use bollard::{API_DEFAULT_VERSION, Docker};
use bytes::Bytes;
use dockyard_config::DockerEndpointConfig;
use dockyard_core::{ContainerConfig, ContainerRuntime, Error, OutputSink, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Image builds and job commands routinely outlive bollard's default of two minutes.
const TIMEOUT_SECS: u64 = 3600;

/// Keeps the container running between execs, whatever the image's own command is.
const KEEP_ALIVE: [&str; 3] = ["tail", "-f", "/dev/null"];

fn runtime_error(action: &str, err: bollard::errors::Error) -> Error {
    Error::Runtime(format!("Failed to {}: {}", action, err))
}

/// One Docker daemon, local or remote.
pub struct DockerRuntime {
    docker: Docker,
    endpoint: String,
}

impl DockerRuntime {
    /// Connect to the local daemon using the usual `DOCKER_HOST` defaults.
    pub fn local() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| runtime_error("connect to the local Docker daemon", e))?
            .with_timeout(std::time::Duration::from_secs(TIMEOUT_SECS));
        Ok(Self {
            docker,
            endpoint: "local".to_string(),
        })
    }

    /// Connect to a configured endpoint. With a cert path the connection uses
    /// TLS with `ca.pem`, `cert.pem` and `key.pem` from that directory.
    pub fn connect(config: &DockerEndpointConfig) -> Result<Self> {
        let host = config.host.as_str();
        let docker = match &config.cert_path {
            Some(cert_path) => {
                let certs = PathBuf::from(cert_path);
                Docker::connect_with_ssl(
                    host,
                    &certs.join("key.pem"),
                    &certs.join("cert.pem"),
                    &certs.join("ca.pem"),
                    TIMEOUT_SECS,
                    API_DEFAULT_VERSION,
                )
            }
            None if host.starts_with("unix://") => {
                Docker::connect_with_unix(host, TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_http(host, TIMEOUT_SECS, API_DEFAULT_VERSION),
        }
        .map_err(|e| runtime_error(&format!("connect to Docker endpoint {}", host), e))?;

        Ok(Self {
            docker,
            endpoint: host.to_string(),
        })
    }
}

/// Tar a build context directory in memory.
fn pack_context(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(".", dir)?;
    builder.into_inner()
}

fn container_config(config: &ContainerConfig) -> Config<String> {
    let host_config = HostConfig {
        memory: Some(config.memory_limit),
        ..Default::default()
    };

    Config {
        image: Some(config.image.clone()),
        user: config.user.clone(),
        working_dir: config.working_dir.clone(),
        env: Some(config.env.clone()),
        entrypoint: Some(KEEP_ALIVE.iter().map(|s| s.to_string()).collect()),
        attach_stdout: Some(false),
        attach_stderr: Some(false),
        tty: Some(false),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn image_exists(&self, tagged_image: &str) -> Result<bool> {
        match self.docker.inspect_image(tagged_image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(runtime_error("inspect image", e)),
        }
    }

    async fn build_image(
        &self,
        image_name: &str,
        context_dir: &Path,
        dockerfile: &str,
    ) -> Result<()> {
        let dir = context_dir.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || pack_context(&dir))
            .await
            .map_err(|e| Error::Internal(format!("Build context task failed: {}", e)))?
            .map_err(|e| Error::Runtime(format!("Failed to pack build context: {}", e)))?;

        info!(image = %image_name, endpoint = %self.endpoint, "Building image");
        let options = BuildImageOptions {
            dockerfile: dockerfile.to_string(),
            t: image_name.to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(Bytes::from(archive)));
        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| runtime_error("build image", e))?;
            if let Some(error) = info.error {
                return Err(Error::Runtime(format!(
                    "Failed to build image {}: {}",
                    image_name, error
                )));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(image = %image_name, "{}", line);
                }
            }
        }
        Ok(())
    }

    async fn tag_image(&self, image_name: &str, tag: &str) -> Result<()> {
        let options = TagImageOptions {
            repo: image_name.to_string(),
            tag: tag.to_string(),
        };
        self.docker
            .tag_image(image_name, Some(options))
            .await
            .map_err(|e| runtime_error("tag image", e))
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        info!(image = %config.image, endpoint = %self.endpoint, "Creating container");
        let container = self
            .docker
            .create_container(
                None::<CreateContainerOptions<String>>,
                container_config(config),
            )
            .await
            .map_err(|e| runtime_error("create container", e))?;
        Ok(container.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        info!(container = %container_id, "Starting container");
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| runtime_error("start container", e))
    }

    async fn exec(
        &self,
        container_id: &str,
        cmd: Vec<String>,
        sink: &dyn OutputSink,
    ) -> Result<i64> {
        let options = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            cmd: Some(cmd),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(container_id, options)
            .await
            .map_err(|e| runtime_error("create exec", e))?;

        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| runtime_error("start exec", e))?
        {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    let chunk = chunk.map_err(|e| runtime_error("read exec output", e))?;
                    sink.write(chunk.into_bytes()).await?;
                }
            }
            StartExecResults::Detached => {
                return Err(Error::Runtime("exec started detached".to_string()));
            }
        }

        // The output stream ending does not mean the exec succeeded.
        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| runtime_error("inspect exec", e))?;
        inspect
            .exit_code
            .ok_or_else(|| Error::Runtime(format!("exec {} reported no exit code", exec.id)))
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        info!(container = %container_id, "Removing container");
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(container_id, Some(options))
            .await
            .map_err(|e| runtime_error("remove container", e))
    }
}
