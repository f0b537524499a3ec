//! Docker API wrapper using the bollard crate.
//!
//! This module provides a high-level interface to the Docker operations
//! the stage workers need: image bootstrap, container lifecycle and logs.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::BuildImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tracing::debug;

use crate::error::DockerError;
use crate::execution::worker::{WorkerHandle, WorkerRuntime, WorkerSpec, WORKER_MOUNT_POINT};

/// Configuration for creating a new container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Unique name for the container.
    pub name: String,
    /// Docker image to use.
    pub image: String,
    /// Environment variables.
    pub env: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Bind mounts (host:container:mode format).
    pub volumes: Vec<String>,
}

impl ContainerConfig {
    /// Creates a new container configuration with the given name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: Vec::new(),
            working_dir: None,
            volumes: Vec::new(),
        }
    }

    /// Adds environment variables.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds bind mounts.
    pub fn with_volumes(mut self, volumes: Vec<String>) -> Self {
        self.volumes = volumes;
        self
    }
}

impl From<&WorkerSpec> for ContainerConfig {
    fn from(spec: &WorkerSpec) -> Self {
        ContainerConfig::new(spec.name.clone(), spec.image.clone())
            .with_env(spec.env.clone())
            .with_volumes(vec![spec.bind()])
            .with_working_dir(WORKER_MOUNT_POINT)
    }
}

/// Status of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatusInfo {
    /// Container is created but not started.
    Created,
    /// Container is running.
    Running,
    /// Container is restarting.
    Restarting,
    /// Container has exited.
    Exited { exit_code: i64 },
    /// Container is being removed.
    Removing,
    /// Container is dead.
    Dead,
    /// Unknown status.
    Unknown(String),
}

/// Docker client wrapper for container operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a new Docker client connecting to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::DaemonUnavailable` if the Docker daemon is not accessible.
    pub fn new(timeout: Duration) -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::DaemonUnavailable(format!("Failed to connect: {e}")))?
            .with_timeout(timeout);

        Ok(Self { docker })
    }

    /// Creates a new container with the given configuration.
    ///
    /// # Returns
    ///
    /// The container ID on success.
    pub async fn create_container(&self, config: ContainerConfig) -> Result<String, DockerError> {
        let host_config = HostConfig {
            binds: if config.volumes.is_empty() {
                None
            } else {
                Some(config.volumes.clone())
            },
            ..Default::default()
        };

        let container_config = Config {
            image: Some(config.image.clone()),
            env: if config.env.is_empty() {
                None
            } else {
                Some(config.env.clone())
            },
            working_dir: config.working_dir.clone(),
            host_config: Some(host_config),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to create container: {e}")))?;

        Ok(response.id)
    }

    /// Starts a container by ID.
    pub async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to start container: {e}")))?;

        Ok(())
    }

    /// Removes a container by ID or name.
    ///
    /// # Arguments
    ///
    /// * `id` - Container ID or name
    /// * `force` - Force removal even if running
    pub async fn remove_container(&self, id: &str, force: bool) -> Result<(), DockerError> {
        let options = RemoveContainerOptions {
            force,
            v: true, // Remove anonymous volumes
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => DockerError::ContainerNotFound { id: id.to_string() },
                other => DockerError::RunFailed(format!("Failed to remove container: {other}")),
            })?;

        Ok(())
    }

    /// Gets the last `tail` lines of a container's logs.
    ///
    /// # Returns
    ///
    /// Combined stdout and stderr logs as a string.
    pub async fn get_logs(&self, id: &str, tail: usize) -> Result<String, DockerError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            tail: tail.to_string(),
            ..Default::default()
        };

        let mut logs = self.docker.logs(id, Some(options));
        let mut output = String::new();

        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(DockerError::RunFailed(format!("Error reading logs: {e}")));
                }
            }
        }

        Ok(output)
    }

    /// Gets the status of a container.
    pub async fn container_status(&self, id: &str) -> Result<ContainerStatusInfo, DockerError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => DockerError::ContainerNotFound { id: id.to_string() },
                other => DockerError::RunFailed(format!("Failed to inspect container: {other}")),
            })?;

        let state = info
            .state
            .ok_or_else(|| DockerError::RunFailed("Container has no state".to_string()))?;

        let status = state.status.map(|s| s.to_string()).unwrap_or_default();

        match status.as_str() {
            "created" => Ok(ContainerStatusInfo::Created),
            "running" => Ok(ContainerStatusInfo::Running),
            "restarting" => Ok(ContainerStatusInfo::Restarting),
            "removing" => Ok(ContainerStatusInfo::Removing),
            "exited" => Ok(ContainerStatusInfo::Exited {
                exit_code: state.exit_code.unwrap_or(-1),
            }),
            "dead" => Ok(ContainerStatusInfo::Dead),
            other => Ok(ContainerStatusInfo::Unknown(other.to_string())),
        }
    }

    /// Checks if an image exists locally.
    pub async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    /// Builds an image from a directory used as the build context.
    ///
    /// # Arguments
    ///
    /// * `context_dir` - Directory packed and sent as the build context
    /// * `dockerfile` - Dockerfile path relative to the context
    /// * `tag` - Tag of the resulting image
    pub async fn build_image(
        &self,
        context_dir: &Path,
        dockerfile: &str,
        tag: &str,
    ) -> Result<(), DockerError> {
        let mut archive = tar::Builder::new(Vec::new());
        archive.append_dir_all(".", context_dir)?;
        let context = archive.into_inner()?;

        let options = BuildImageOptions {
            dockerfile: dockerfile.to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(context.into()));

        while let Some(result) = stream.next().await {
            let info =
                result.map_err(|e| DockerError::BuildFailed(format!("Failed to build {tag}: {e}")))?;

            if let Some(error) = info.error {
                return Err(DockerError::BuildFailed(format!("{tag}: {error}")));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(image = tag, "{}", line);
                }
            }
        }

        Ok(())
    }

    /// Waits for a container to finish executing.
    ///
    /// # Returns
    ///
    /// The exit code of the container.
    pub async fn wait_container(&self, id: &str) -> Result<i64, DockerError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        if let Some(result) = stream.next().await {
            return match result {
                Ok(response) => Ok(response.status_code),
                // bollard reports non-zero exits as an error carrying the code
                Err(BollardError::DockerContainerWaitError { code, .. }) => Ok(code),
                Err(e) => Err(DockerError::RunFailed(format!(
                    "Error waiting for container: {e}"
                ))),
            };
        }

        // If stream is empty, check container state
        let status = self.container_status(id).await?;
        match status {
            ContainerStatusInfo::Exited { exit_code } => Ok(exit_code),
            _ => Err(DockerError::RunFailed(
                "Container did not exit normally".to_string(),
            )),
        }
    }
}

#[async_trait]
impl WorkerRuntime for DockerClient {
    async fn image_exists(&self, image: &str) -> bool {
        DockerClient::image_exists(self, image).await
    }

    async fn build_image(
        &self,
        context_dir: &Path,
        dockerfile: &str,
        tag: &str,
    ) -> Result<(), DockerError> {
        DockerClient::build_image(self, context_dir, dockerfile, tag).await
    }

    async fn remove_worker(&self, name: &str) -> Result<(), DockerError> {
        self.remove_container(name, true).await
    }

    async fn launch_worker(&self, spec: &WorkerSpec) -> Result<WorkerHandle, DockerError> {
        let id = self.create_container(ContainerConfig::from(spec)).await?;
        self.start_container(&id).await?;

        Ok(WorkerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn wait_worker(&self, handle: &WorkerHandle) -> Result<i64, DockerError> {
        self.wait_container(&handle.id).await
    }

    async fn worker_logs(
        &self,
        handle: &WorkerHandle,
        tail: usize,
    ) -> Result<String, DockerError> {
        self.get_logs(&handle.id, tail).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_config_builder() {
        let config = ContainerConfig::new("double-build", "wash-build-image:latest")
            .with_env(vec!["FOO=bar".to_string()])
            .with_working_dir("/app")
            .with_volumes(vec!["/tmp/gen/double:/app:rw".to_string()]);

        assert_eq!(config.name, "double-build");
        assert_eq!(config.image, "wash-build-image:latest");
        assert_eq!(config.env.len(), 1);
        assert_eq!(config.working_dir.unwrap(), "/app");
        assert_eq!(config.volumes, vec!["/tmp/gen/double:/app:rw"]);
    }

    #[test]
    fn test_container_config_from_worker_spec() {
        let spec = WorkerSpec::new(
            "double-deploy",
            "wash-deploy-image:latest",
            Path::new("/srv/project/gen/double"),
        )
        .with_env(vec!["WASMCLOUD_CTL_HOST=nats".to_string()]);

        let config = ContainerConfig::from(&spec);
        assert_eq!(config.name, "double-deploy");
        assert_eq!(config.volumes, vec!["/srv/project/gen/double:/app:rw"]);
        assert_eq!(config.working_dir.as_deref(), Some("/app"));
    }

    #[test]
    fn test_container_status_info() {
        let exited = ContainerStatusInfo::Exited { exit_code: 0 };
        let unknown = ContainerStatusInfo::Unknown("custom".to_string());

        assert!(matches!(
            exited,
            ContainerStatusInfo::Exited { exit_code: 0 }
        ));
        assert!(matches!(unknown, ContainerStatusInfo::Unknown(_)));
    }

    #[tokio::test]
    #[ignore] // Requires a running Docker daemon
    async fn test_remove_missing_container_is_not_found() {
        let client = DockerClient::new(Duration::from_secs(10)).expect("docker available");
        let result = client
            .remove_container("pelato-definitely-missing-build", true)
            .await;
        assert!(matches!(result, Err(DockerError::ContainerNotFound { .. })));
    }
}
