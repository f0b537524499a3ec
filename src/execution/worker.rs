//! Worker abstraction over the container substrate.
//!
//! A worker is a named, isolated container performing one stage action for
//! one generated component. The orchestrator only talks to the substrate
//! through `WorkerRuntime`, which `DockerClient` implements.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::DockerError;

/// Mount point of the component directory inside every worker.
pub const WORKER_MOUNT_POINT: &str = "/app";

/// Deterministic worker name for a component and stage.
///
/// The same component always maps to the same name for a given stage, so
/// a leftover worker from an earlier run can be found and evicted.
pub fn worker_name(component: &str, stage: &str) -> String {
    format!("{}-{}", component, stage)
}

/// Everything needed to launch one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Worker (container) name.
    pub name: String,
    /// Image the worker runs.
    pub image: String,
    /// Environment in `KEY=value` form.
    pub env: Vec<String>,
    /// Host directory bound read-write at `WORKER_MOUNT_POINT`.
    pub bind_dir: PathBuf,
}

impl WorkerSpec {
    /// Creates a spec for `name` running `image` over `bind_dir`.
    pub fn new(name: impl Into<String>, image: impl Into<String>, bind_dir: &Path) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: Vec::new(),
            bind_dir: bind_dir.to_path_buf(),
        }
    }

    /// Sets the worker environment.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Bind mount in Docker `host:container:mode` form.
    pub fn bind(&self) -> String {
        format!("{}:{}:rw", self.bind_dir.display(), WORKER_MOUNT_POINT)
    }
}

/// Handle to a launched worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    /// Substrate identifier of the worker.
    pub id: String,
    /// Worker name.
    pub name: String,
}

/// Container substrate used to run stage workers.
#[async_trait]
pub trait WorkerRuntime: Send + Sync {
    /// Checks whether `image` is available locally.
    async fn image_exists(&self, image: &str) -> bool;

    /// Builds `tag` from `dockerfile` inside `context_dir`.
    async fn build_image(
        &self,
        context_dir: &Path,
        dockerfile: &str,
        tag: &str,
    ) -> Result<(), DockerError>;

    /// Force-removes the worker called `name`.
    ///
    /// Returns `DockerError::ContainerNotFound` when no such worker exists.
    async fn remove_worker(&self, name: &str) -> Result<(), DockerError>;

    /// Creates and starts a worker without waiting for it.
    async fn launch_worker(&self, spec: &WorkerSpec) -> Result<WorkerHandle, DockerError>;

    /// Blocks until the worker exits and returns its exit code.
    async fn wait_worker(&self, handle: &WorkerHandle) -> Result<i64, DockerError>;

    /// Returns the last `tail` lines of the worker output.
    async fn worker_logs(&self, handle: &WorkerHandle, tail: usize)
        -> Result<String, DockerError>;
}
