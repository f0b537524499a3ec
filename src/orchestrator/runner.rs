//! Stage runner shared by build, deploy and remove.
//!
//! Failure handling differs by phase. A descriptor, launch or synchronous
//! wait error inside the per-component loop aborts the whole stage, while
//! the detached join phase records each failed worker and keeps going.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::descriptor::DeploymentDescriptor;
use crate::error::{DockerError, StageError};
use crate::execution::{worker_name, WorkerHandle, WorkerRuntime, WorkerSpec};
use crate::pipeline::config::PipelineConfig;

use super::report::{StageReport, WorkerOutcome, WorkerStatus};
use super::stage::{HostIdentity, StageSpec};

/// Number of log lines shown for a failed worker.
const FAILED_WORKER_LOG_TAIL: usize = 20;

/// A launched worker whose result has not been collected yet.
#[derive(Debug)]
struct PendingWorker {
    component: String,
    handle: WorkerHandle,
}

impl PendingWorker {
    fn abandoned(self) -> WorkerOutcome {
        WorkerOutcome {
            component: self.component,
            worker: self.handle.name,
            status: WorkerStatus::Abandoned,
        }
    }
}

/// Runs stages against a worker substrate.
pub struct StageRunner<'a, R: WorkerRuntime + ?Sized> {
    runtime: &'a R,
    config: &'a PipelineConfig,
    cancel: CancellationToken,
}

impl<'a, R: WorkerRuntime + ?Sized> StageRunner<'a, R> {
    /// Creates a runner over `runtime`.
    pub fn new(runtime: &'a R, config: &'a PipelineConfig) -> Self {
        Self {
            runtime,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops launching and awaiting workers once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs `spec` over every component directory in `generated_root`.
    ///
    /// # Errors
    ///
    /// - `StageError::InvalidProject` if `generated_root` is missing; nothing is launched
    /// - `StageError::ImageBuild` if the worker image cannot be built
    /// - `StageError::Descriptor`, `WorkerLaunch` or `WorkerWait` on the first
    ///   failure inside the per-component loop
    ///
    /// Workers that exit non-zero are not errors; they are reported as failed
    /// outcomes and left in place.
    pub async fn run_stage(
        &self,
        spec: &StageSpec,
        generated_root: &Path,
    ) -> Result<StageReport, StageError> {
        let started = Instant::now();
        let stage = spec.stage.name();

        if !generated_root.is_dir() {
            error!(stage, path = %generated_root.display(), "Project directory is not valid");
            return Err(StageError::InvalidProject(
                generated_root.display().to_string(),
            ));
        }

        info!(stage, detached = spec.detached, "Running stage");

        let image_build_time = self.ensure_image(spec).await?;

        let mut outcomes = Vec::new();
        let mut wait_list = Vec::new();
        let mut cancelled = false;

        for dir in list_components(generated_root)? {
            if self.cancel.is_cancelled() {
                warn!(stage, "Interrupted; no further workers will be launched");
                cancelled = true;
                break;
            }

            let pending = self.launch(spec, &dir).await?;

            if spec.detached {
                wait_list.push(pending);
                continue;
            }

            let waited = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = self.runtime.wait_worker(&pending.handle) => Some(result),
            };

            match waited {
                None => {
                    warn!(stage, worker = %pending.handle.name, "Interrupted while waiting; worker abandoned");
                    outcomes.push(pending.abandoned());
                    cancelled = true;
                    break;
                }
                Some(Ok(exit_code)) => outcomes.push(self.settle(pending, exit_code).await),
                Some(Err(source)) => {
                    return Err(StageError::WorkerWait {
                        worker: pending.handle.name,
                        source,
                    });
                }
            }
        }

        if !wait_list.is_empty() {
            if cancelled {
                outcomes.extend(wait_list.into_iter().map(PendingWorker::abandoned));
            } else {
                info!(stage, workers = wait_list.len(), "Waiting for detached workers");
                for pending in wait_list {
                    let outcome = self.join(pending).await;
                    if outcome.status == WorkerStatus::Abandoned {
                        cancelled = true;
                    }
                    outcomes.push(outcome);
                }
            }
        }

        let report = StageReport {
            stage: spec.stage,
            outcomes,
            image_build_time,
            components_time: started.elapsed(),
            cancelled,
        };

        let retained = report.retained_workers();
        if retained.is_empty() {
            info!(
                stage,
                succeeded = report.succeeded(),
                elapsed_secs = report.components_time.as_secs_f64(),
                "Stage completed"
            );
        } else {
            warn!(
                stage,
                succeeded = report.succeeded(),
                failed = report.failed(),
                retained = ?retained,
                "Stage completed with failures"
            );
        }

        Ok(report)
    }

    /// Builds the worker image once if it is not present.
    async fn ensure_image(
        &self,
        spec: &StageSpec,
    ) -> Result<Option<std::time::Duration>, StageError> {
        if self.runtime.image_exists(&spec.image).await {
            debug!(image = %spec.image, "Worker image present");
            return Ok(None);
        }

        info!(image = %spec.image, dockerfile = %spec.dockerfile, "Building worker image");
        let started = Instant::now();
        self.runtime
            .build_image(&spec.context_dir, &spec.dockerfile, &spec.image)
            .await
            .map_err(|source| StageError::ImageBuild {
                image: spec.image.clone(),
                source,
            })?;

        Ok(Some(started.elapsed()))
    }

    /// Evicts any stale worker and launches a fresh one for `dir`.
    async fn launch(&self, spec: &StageSpec, dir: &Path) -> Result<PendingWorker, StageError> {
        let descriptor_error = |source| StageError::Descriptor {
            dir: dir.display().to_string(),
            source,
        };

        let descriptor = DeploymentDescriptor::read(dir).map_err(descriptor_error)?;
        let identity = HostIdentity::of(dir).unwrap_or_else(|e| {
            warn!(dir = %dir.display(), error = %e, "Could not read directory owner, using 0:0");
            HostIdentity::default()
        });
        let env = spec
            .stage
            .worker_env(&descriptor, self.config, identity)
            .map_err(descriptor_error)?;

        let name = worker_name(&descriptor.component_name, spec.stage.name());
        self.evict_stale(&name).await;

        let bind_dir = dir.canonicalize()?;
        let worker = WorkerSpec::new(&name, &spec.image, &bind_dir).with_env(env);

        info!(
            stage = spec.stage.name(),
            component = %descriptor.component_name,
            worker = %name,
            "Launching worker"
        );

        let handle = self
            .runtime
            .launch_worker(&worker)
            .await
            .map_err(|source| StageError::WorkerLaunch {
                worker: name.clone(),
                source,
            })?;

        Ok(PendingWorker {
            component: descriptor.component_name,
            handle,
        })
    }

    /// Force-removes a worker left over from an earlier run.
    async fn evict_stale(&self, name: &str) {
        match self.runtime.remove_worker(name).await {
            Ok(()) => info!(worker = name, "Evicted stale worker"),
            Err(DockerError::ContainerNotFound { .. }) => {}
            Err(e) => warn!(worker = name, error = %e, "Failed to evict stale worker"),
        }
    }

    /// Waits for a detached worker; failures never abort the join.
    async fn join(&self, pending: PendingWorker) -> WorkerOutcome {
        if self.cancel.is_cancelled() {
            return pending.abandoned();
        }

        let waited = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = self.runtime.wait_worker(&pending.handle) => Some(result),
        };

        match waited {
            None => pending.abandoned(),
            Some(Ok(exit_code)) => self.settle(pending, exit_code).await,
            Some(Err(e)) => {
                error!(
                    component = %pending.component,
                    worker = %pending.handle.name,
                    error = %e,
                    "Failed waiting on worker"
                );
                WorkerOutcome {
                    component: pending.component,
                    worker: pending.handle.name,
                    status: WorkerStatus::Failed {
                        exit_code: None,
                        reason: e.to_string(),
                    },
                }
            }
        }
    }

    /// Removes a worker that exited 0; keeps and reports any other.
    async fn settle(&self, pending: PendingWorker, exit_code: i64) -> WorkerOutcome {
        let PendingWorker { component, handle } = pending;

        if exit_code == 0 {
            if let Err(e) = self.runtime.remove_worker(&handle.name).await {
                warn!(worker = %handle.name, error = %e, "Failed to remove finished worker");
            }
            debug!(component = %component, worker = %handle.name, "Worker succeeded");
            return WorkerOutcome {
                component,
                worker: handle.name,
                status: WorkerStatus::Succeeded,
            };
        }

        let logs = match self
            .runtime
            .worker_logs(&handle, FAILED_WORKER_LOG_TAIL)
            .await
        {
            Ok(logs) => logs,
            Err(e) => {
                debug!(worker = %handle.name, error = %e, "Could not fetch worker logs");
                String::new()
            }
        };

        error!(
            component = %component,
            worker = %handle.name,
            exit_code,
            logs = %logs.trim_end(),
            "Worker failed; left in place for inspection"
        );

        WorkerOutcome {
            component,
            worker: handle.name,
            status: WorkerStatus::Failed {
                exit_code: Some(exit_code),
                reason: format!("exited with code {}", exit_code),
            },
        }
    }
}

/// Lists component directories under `generated_root`, in listing order.
fn list_components(generated_root: &Path) -> Result<Vec<PathBuf>, StageError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(generated_root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}
