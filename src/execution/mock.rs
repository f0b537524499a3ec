//! In-memory `WorkerRuntime` used by unit tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::DockerError;
use crate::execution::worker::{WorkerHandle, WorkerRuntime, WorkerSpec};

/// Substrate call recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ImageBuilt(String),
    Removed(String),
    Launched(String),
    Waited(String),
}

#[derive(Debug, Default)]
struct State {
    images: HashSet<String>,
    workers: HashSet<String>,
    exit_codes: HashMap<String, i64>,
    launch_failures: HashSet<String>,
    wait_failures: HashSet<String>,
    hanging_waits: HashSet<String>,
    remove_failures: HashSet<String>,
    launched: Vec<WorkerSpec>,
    events: Vec<Event>,
    next_id: usize,
}

/// Fake container substrate that tracks worker names like Docker does.
#[derive(Debug, Default)]
pub struct MockRuntime {
    state: Mutex<State>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, image: &str) -> Self {
        self.state.lock().unwrap().images.insert(image.to_string());
        self
    }

    /// Registers a leftover worker from an earlier run.
    pub fn with_existing_worker(self, name: &str) -> Self {
        self.state.lock().unwrap().workers.insert(name.to_string());
        self
    }

    pub fn with_exit_code(self, name: &str, code: i64) -> Self {
        self.state
            .lock()
            .unwrap()
            .exit_codes
            .insert(name.to_string(), code);
        self
    }

    pub fn with_launch_failure(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .launch_failures
            .insert(name.to_string());
        self
    }

    pub fn with_wait_failure(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .wait_failures
            .insert(name.to_string());
        self
    }

    /// Makes waits on `name` never complete.
    pub fn with_hanging_wait(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .hanging_waits
            .insert(name.to_string());
        self
    }

    /// Makes every removal of `name` fail with a daemon error.
    pub fn with_remove_failure(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .remove_failures
            .insert(name.to_string());
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn launched(&self) -> Vec<WorkerSpec> {
        self.state.lock().unwrap().launched.clone()
    }

    /// Names of workers currently present in the substrate.
    pub fn workers(&self) -> HashSet<String> {
        self.state.lock().unwrap().workers.clone()
    }
}

#[async_trait]
impl WorkerRuntime for MockRuntime {
    async fn image_exists(&self, image: &str) -> bool {
        self.state.lock().unwrap().images.contains(image)
    }

    async fn build_image(
        &self,
        _context_dir: &Path,
        _dockerfile: &str,
        tag: &str,
    ) -> Result<(), DockerError> {
        let mut state = self.state.lock().unwrap();
        state.images.insert(tag.to_string());
        state.events.push(Event::ImageBuilt(tag.to_string()));
        Ok(())
    }

    async fn remove_worker(&self, name: &str) -> Result<(), DockerError> {
        let mut state = self.state.lock().unwrap();
        if state.remove_failures.contains(name) {
            return Err(DockerError::RunFailed(format!(
                "Error response from daemon: cannot remove container \"/{}\"",
                name
            )));
        }
        if state.workers.remove(name) {
            state.events.push(Event::Removed(name.to_string()));
            Ok(())
        } else {
            Err(DockerError::ContainerNotFound {
                id: name.to_string(),
            })
        }
    }

    async fn launch_worker(&self, spec: &WorkerSpec) -> Result<WorkerHandle, DockerError> {
        let mut state = self.state.lock().unwrap();
        if state.launch_failures.contains(&spec.name) {
            return Err(DockerError::RunFailed(format!(
                "Failed to create container: {}",
                spec.name
            )));
        }
        if !state.workers.insert(spec.name.clone()) {
            return Err(DockerError::RunFailed(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }

        state.next_id += 1;
        state.launched.push(spec.clone());
        state.events.push(Event::Launched(spec.name.clone()));

        Ok(WorkerHandle {
            id: format!("mock-{}", state.next_id),
            name: spec.name.clone(),
        })
    }

    async fn wait_worker(&self, handle: &WorkerHandle) -> Result<i64, DockerError> {
        {
            let mut state = self.state.lock().unwrap();
            state.events.push(Event::Waited(handle.name.clone()));
            if state.wait_failures.contains(&handle.name) {
                return Err(DockerError::RunFailed("Error waiting for container".to_string()));
            }
            if !state.hanging_waits.contains(&handle.name) {
                return Ok(state.exit_codes.get(&handle.name).copied().unwrap_or(0));
            }
        }

        Ok(std::future::pending().await)
    }

    async fn worker_logs(
        &self,
        handle: &WorkerHandle,
        _tail: usize,
    ) -> Result<String, DockerError> {
        Ok(format!("{} failed\n", handle.name))
    }
}
