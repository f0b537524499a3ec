//! Pipeline driver for the generate, build, deploy and remove stages.
//!
//! The driver owns the configuration read at startup and runs one stage,
//! or the composite `brush` flow, against a project directory.
//!
//! # Pipeline Flow
//!
//! 1. **Generate**: render one component directory per workflow task under `gen/`
//! 2. **Build**: compile and push every generated component
//! 3. **Deploy**: deploy every component onto the lattice
//! 4. **Remove**: tear deployed components down again
//!
//! When metrics are enabled, every invocation appends one run record to
//! `<project>/metrics.yaml`, even when a stage fails part way.
//!
//! # Example
//!
//! ```rust,ignore
//! use pelato::execution::DockerClient;
//! use pelato::orchestrator::Stage;
//! use pelato::pipeline::{Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_env()?;
//! let docker = DockerClient::new(config.docker_timeout)?;
//! let pipeline = Pipeline::new(config);
//!
//! pipeline.generate(project_dir)?;
//! let report = pipeline.run_stage(&docker, Stage::Build, project_dir).await?;
//! println!("{} workers succeeded", report.succeeded());
//! ```

pub mod config;

pub use config::{load_env_file, ConfigError, PipelineConfig, ENV_FILE};

use std::path::Path;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{GeneratorError, MetricsError, StageError, WorkflowError};
use crate::execution::WorkerRuntime;
use crate::generator::{CodeGenerator, GenerationReport, GENERATED_DIR};
use crate::metrics::{MetricsHistory, MetricsRun, RunClock, METRICS_FILE};
use crate::orchestrator::{Stage, StageReport, StageRunner, StageSpec};
use crate::workflow::Workflow;

/// Errors that abort a pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Manifest could not be loaded.
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Generated output could not be reset.
    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// A worker stage aborted.
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    /// Metrics history could not be written.
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

/// Result of the composite generate, build and deploy flow.
#[derive(Debug)]
pub struct BrushReport {
    /// Code generation result.
    pub generation: GenerationReport,
    /// Reports of the worker stages that ran, in order.
    pub stages: Vec<StageReport>,
    /// Whether the flow was interrupted before finishing.
    pub cancelled: bool,
}

impl BrushReport {
    /// Returns true when every task was generated and every worker succeeded.
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self.generation.is_complete()
            && self.stages.iter().all(StageReport::is_success)
    }
}

/// Timings collected for one invocation.
struct Recorder {
    clock: RunClock,
    run: MetricsRun,
}

/// Drives stages over a project directory.
pub struct Pipeline {
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Creates a pipeline from a validated configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` to interrupt running stages.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Generates every workflow task into `<project_dir>/gen`.
    ///
    /// # Errors
    ///
    /// - `PipelineError::Workflow` if the project or manifest is invalid
    /// - `PipelineError::Generator` if the output directory cannot be reset
    ///
    /// Per-task failures are reported in the returned `GenerationReport`.
    pub fn generate(&self, project_dir: &Path) -> Result<GenerationReport, PipelineError> {
        let workflow = Workflow::load(project_dir)?;
        let mut recorder = self.recorder(workflow.tasks.len());

        let result = self.generate_workflow(&workflow, project_dir);
        if let (Some(recorder), Ok(report)) = (recorder.as_mut(), &result) {
            recorder.run.record_generation(report);
        }

        self.finish(recorder, project_dir, result)
    }

    /// Runs one worker stage over the generated components.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Stage` when the stage aborts. Failed workers
    /// are reported in the returned `StageReport`.
    pub async fn run_stage<R: WorkerRuntime + ?Sized>(
        &self,
        runtime: &R,
        stage: Stage,
        project_dir: &Path,
    ) -> Result<StageReport, PipelineError> {
        let mut recorder = self.recorder(count_tasks(project_dir));

        let result = self.stage(runtime, stage, project_dir).await;
        if let (Some(recorder), Ok(report)) = (recorder.as_mut(), &result) {
            recorder.run.record_stage(report);
        }

        self.finish(recorder, project_dir, result)
    }

    /// Runs generate, build and deploy with a pause between stages.
    ///
    /// Stops at the first aborting error. An interrupt stops the flow
    /// between stages and is reported through `BrushReport::cancelled`.
    pub async fn brush<R: WorkerRuntime + ?Sized>(
        &self,
        runtime: &R,
        project_dir: &Path,
    ) -> Result<BrushReport, PipelineError> {
        let workflow = Workflow::load(project_dir)?;
        let mut recorder = self.recorder(workflow.tasks.len());

        let result = self
            .brush_workflow(runtime, &workflow, project_dir, recorder.as_mut())
            .await;

        self.finish(recorder, project_dir, result)
    }

    async fn brush_workflow<R: WorkerRuntime + ?Sized>(
        &self,
        runtime: &R,
        workflow: &Workflow,
        project_dir: &Path,
        mut recorder: Option<&mut Recorder>,
    ) -> Result<BrushReport, PipelineError> {
        let generation = self.generate_workflow(workflow, project_dir)?;
        if let Some(recorder) = recorder.as_deref_mut() {
            recorder.run.record_generation(&generation);
        }

        let mut report = BrushReport {
            generation,
            stages: Vec::new(),
            cancelled: false,
        };

        for stage in [Stage::Build, Stage::Deploy] {
            if !self.pause().await {
                warn!(next = stage.name(), "Interrupted between stages");
                report.cancelled = true;
                break;
            }

            let stage_report = self.stage(runtime, stage, project_dir).await?;
            if let Some(recorder) = recorder.as_deref_mut() {
                recorder.run.record_stage(&stage_report);
            }

            let cancelled = stage_report.cancelled;
            report.stages.push(stage_report);
            if cancelled {
                report.cancelled = true;
                break;
            }
        }

        if report.is_success() {
            info!(project = %workflow.project_name, "Brush completed");
        } else {
            let failed_workers: usize = report.stages.iter().map(StageReport::failed).sum();
            warn!(
                project = %workflow.project_name,
                failed_tasks = report.generation.failures.len(),
                failed_workers,
                cancelled = report.cancelled,
                "Brush completed with failures"
            );
        }

        Ok(report)
    }

    fn generate_workflow(
        &self,
        workflow: &Workflow,
        project_dir: &Path,
    ) -> Result<GenerationReport, PipelineError> {
        let generator = CodeGenerator::new(self.config.templates_dir())
            .with_registry(self.config.registry_url.clone());
        Ok(generator.generate(workflow, project_dir)?)
    }

    async fn stage<R: WorkerRuntime + ?Sized>(
        &self,
        runtime: &R,
        stage: Stage,
        project_dir: &Path,
    ) -> Result<StageReport, PipelineError> {
        let spec = StageSpec::from_config(stage, &self.config);
        let runner =
            StageRunner::new(runtime, &self.config).with_cancellation(self.cancel.clone());
        Ok(runner
            .run_stage(&spec, &project_dir.join(GENERATED_DIR))
            .await?)
    }

    /// Sleeps for the configured stage pause; returns false if interrupted.
    async fn pause(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.stage_pause) => true,
        }
    }

    fn recorder(&self, n_task: usize) -> Option<Recorder> {
        if !self.config.metrics_enabled {
            return None;
        }
        let clock = MetricsRun::begin();
        let run = MetricsRun::new(&clock, n_task);
        Some(Recorder { clock, run })
    }

    /// Persists the run record, then hands back the invocation result.
    ///
    /// A metrics failure only surfaces when the invocation itself succeeded.
    fn finish<T>(
        &self,
        recorder: Option<Recorder>,
        project_dir: &Path,
        result: Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let Some(mut recorder) = recorder else {
            return result;
        };
        recorder.run.finalize(recorder.clock.elapsed());

        match (save_run(&recorder.run, project_dir), result) {
            (Ok(()), result) => result,
            (Err(e), Ok(_)) => Err(e.into()),
            (Err(e), Err(original)) => {
                warn!(error = %e, "Failed to write metrics history");
                Err(original)
            }
        }
    }
}

fn save_run(run: &MetricsRun, project_dir: &Path) -> Result<(), MetricsError> {
    let path = project_dir.join(METRICS_FILE);
    let history = MetricsHistory::load_or_default(&path)?.append(run)?;
    history.save(&path)?;
    debug!(path = %path.display(), runs = history.len(), "Metrics history updated");
    Ok(())
}

/// Number of tasks recorded for a stage-only invocation.
fn count_tasks(project_dir: &Path) -> usize {
    match Workflow::load(project_dir) {
        Ok(workflow) => workflow.tasks.len(),
        Err(e) => {
            debug!(error = %e, "Could not load manifest for task count");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::mock::{Event, MockRuntime};
    use crate::workflow::{MANIFEST_FILE, TASKS_DIR};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
project_name: demo
tasks:
  - component_name: ingest
    type: http_producer_nats
    code: ingest.go
    dest_topic: raw
  - component_name: double
    type: processor_nats
    code: double.go
    source_topic: raw
    dest_topic: doubled
"#;

    /// Assets root with the two template sets and empty worker Dockerfiles.
    fn write_assets(root: &Path) {
        for set in ["producer_nats", "processor_nats"] {
            let dir = root.join("templates").join(set);
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("wadm.yaml"),
                "spec:\n  components:\n    - name: {{ component_name }}\n      properties:\n        image: {{ registry_url }}/{{ component_name }}:0.1.0\n",
            )
            .unwrap();
        }
        fs::create_dir_all(root.join("docker")).unwrap();
    }

    fn write_project(root: &Path) {
        fs::write(root.join(MANIFEST_FILE), MANIFEST).unwrap();
        let tasks = root.join(TASKS_DIR);
        fs::create_dir_all(&tasks).unwrap();
        for name in ["ingest.go", "double.go"] {
            fs::write(tasks.join(name), "package main\n").unwrap();
        }
    }

    fn setup(metrics: bool) -> (TempDir, TempDir, Pipeline) {
        let assets = TempDir::new().unwrap();
        write_assets(assets.path());
        let project = TempDir::new().unwrap();
        write_project(project.path());

        let config = PipelineConfig::new()
            .with_assets_dir(assets.path())
            .with_registry_url("localhost:5000")
            .with_metrics(metrics)
            .with_stage_pause(Duration::ZERO);
        (assets, project, Pipeline::new(config))
    }

    fn history(project: &Path) -> MetricsHistory {
        MetricsHistory::load_or_default(&project.join(METRICS_FILE)).unwrap()
    }

    #[tokio::test]
    async fn test_brush_runs_generate_build_deploy() {
        let (_assets, project, pipeline) = setup(false);
        let runtime = MockRuntime::new();

        let report = pipeline.brush(&runtime, project.path()).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.generation.generated.len(), 2);
        let stages: Vec<_> = report.stages.iter().map(|s| s.stage).collect();
        assert_eq!(stages, vec![Stage::Build, Stage::Deploy]);

        let built = runtime
            .events()
            .iter()
            .filter(|e| matches!(e, Event::ImageBuilt(_)))
            .count();
        assert_eq!(built, 2);
        assert!(runtime.workers().is_empty());
        assert!(!project.path().join(METRICS_FILE).exists());
    }

    #[tokio::test]
    async fn test_build_without_generated_output_fails() {
        let (_assets, project, pipeline) = setup(false);
        let runtime = MockRuntime::new();

        let result = pipeline
            .run_stage(&runtime, Stage::Build, project.path())
            .await;

        assert!(matches!(
            result,
            Err(PipelineError::Stage(StageError::InvalidProject(_)))
        ));
        assert!(runtime.events().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_appended_per_invocation() {
        let (_assets, project, pipeline) = setup(true);
        let runtime = MockRuntime::new();

        pipeline.generate(project.path()).unwrap();
        assert_eq!(history(project.path()).len(), 1);

        pipeline
            .run_stage(&runtime, Stage::Build, project.path())
            .await
            .unwrap();
        let runs = history(project.path());
        assert_eq!(runs.len(), 2);

        let build: MetricsRun = serde_yaml::from_value(runs.runs[1].clone()).unwrap();
        assert_eq!(build.n_task, 2);
        assert!(build.code_gen.is_none());
        let stage = build.build.unwrap();
        assert!(stage.get("image_build_time").is_some());
        assert!(stage.get("components_build_time").is_some());
        assert!(build.time_total.is_some());
    }

    #[tokio::test]
    async fn test_metrics_written_when_stage_aborts() {
        let (_assets, project, pipeline) = setup(true);
        let runtime = MockRuntime::new();

        let result = pipeline
            .run_stage(&runtime, Stage::Deploy, project.path())
            .await;

        assert!(result.is_err());
        let runs = history(project.path());
        assert_eq!(runs.len(), 1);
        let run: MetricsRun = serde_yaml::from_value(runs.runs[0].clone()).unwrap();
        assert!(run.deploy.is_none());
        assert!(run.time_total.is_some());
    }

    #[tokio::test]
    async fn test_brush_stops_when_interrupted() {
        let (_assets, project, pipeline) = setup(false);
        let token = CancellationToken::new();
        token.cancel();
        let pipeline = pipeline.with_cancellation(token);
        let runtime = MockRuntime::new();

        let report = pipeline.brush(&runtime, project.path()).await.unwrap();

        assert!(report.cancelled);
        assert!(report.stages.is_empty());
        assert_eq!(report.generation.generated.len(), 2);
        assert!(runtime.launched().is_empty());
    }
}
