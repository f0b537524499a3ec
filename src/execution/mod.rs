//! Docker execution layer for stage workers.
//!
//! This module provides the container substrate the stages run their
//! workers on, using the bollard crate for container lifecycle management.
//!
//! # Architecture
//!
//! Worker lifecycle:
//! ```text
//! EVICT STALE → LAUNCH → WAIT → exit 0: REMOVE / exit != 0: RETAIN
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pelato::execution::{DockerClient, WorkerRuntime, WorkerSpec};
//!
//! let client = DockerClient::new(Duration::from_secs(120))?;
//! let spec = WorkerSpec::new("double-build", "wash-build-image:latest", &dir);
//! let handle = client.launch_worker(&spec).await?;
//! let exit_code = client.wait_worker(&handle).await?;
//! ```

pub mod docker_client;
#[cfg(test)]
pub mod mock;
pub mod worker;

pub use docker_client::{ContainerConfig, ContainerStatusInfo, DockerClient};
pub use worker::{worker_name, WorkerHandle, WorkerRuntime, WorkerSpec, WORKER_MOUNT_POINT};
