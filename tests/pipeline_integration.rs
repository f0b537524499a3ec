//! End-to-end tests of the pipeline over the bundled templates.
//!
//! Workers run against an in-memory substrate, so no Docker daemon is needed.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pelato::descriptor::DeploymentDescriptor;
use pelato::execution::{WorkerHandle, WorkerRuntime, WorkerSpec};
use pelato::generator::GENERATED_DIR;
use pelato::metrics::{MetricsHistory, METRICS_FILE};
use pelato::orchestrator::Stage;
use pelato::pipeline::{Pipeline, PipelineConfig};
use pelato::DockerError;
use tempfile::TempDir;

/// Substrate that records launched workers and fails the ones it is told to.
#[derive(Default)]
struct RecordingRuntime {
    failing: HashSet<String>,
    running: Mutex<HashSet<String>>,
    launched: Mutex<Vec<WorkerSpec>>,
}

impl RecordingRuntime {
    fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    fn launched(&self) -> Vec<WorkerSpec> {
        self.launched.lock().unwrap().clone()
    }

    fn running(&self) -> HashSet<String> {
        self.running.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerRuntime for RecordingRuntime {
    async fn image_exists(&self, _image: &str) -> bool {
        true
    }

    async fn build_image(
        &self,
        _context_dir: &Path,
        _dockerfile: &str,
        _tag: &str,
    ) -> Result<(), DockerError> {
        Ok(())
    }

    async fn remove_worker(&self, name: &str) -> Result<(), DockerError> {
        if self.running.lock().unwrap().remove(name) {
            Ok(())
        } else {
            Err(DockerError::ContainerNotFound {
                id: name.to_string(),
            })
        }
    }

    async fn launch_worker(&self, spec: &WorkerSpec) -> Result<WorkerHandle, DockerError> {
        self.running.lock().unwrap().insert(spec.name.clone());
        self.launched.lock().unwrap().push(spec.clone());
        Ok(WorkerHandle {
            id: spec.name.clone(),
            name: spec.name.clone(),
        })
    }

    async fn wait_worker(&self, handle: &WorkerHandle) -> Result<i64, DockerError> {
        Ok(if self.failing.contains(&handle.name) { 1 } else { 0 })
    }

    async fn worker_logs(&self, handle: &WorkerHandle, _tail: usize) -> Result<String, DockerError> {
        Ok(format!("{}: wash build failed\n", handle.name))
    }
}

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Copies the demo project into a fresh temporary directory.
fn demo_project() -> TempDir {
    let src = repo_root().join("demos").join("example_project");
    let dest = TempDir::new().unwrap();
    for entry in walkdir::WalkDir::new(&src) {
        let entry = entry.unwrap();
        let target = dest.path().join(entry.path().strip_prefix(&src).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
    dest
}

fn config() -> PipelineConfig {
    PipelineConfig::new()
        .with_assets_dir(repo_root())
        .with_registry_url("localhost:5000")
        .with_registry_credentials("ci", "secret")
        .with_nats("nats", 4222)
        .with_stage_pause(Duration::ZERO)
}

#[test]
fn test_generate_demo_project() {
    let project = demo_project();
    let pipeline = Pipeline::new(config());

    let report = pipeline.generate(project.path()).unwrap();
    assert!(report.is_complete(), "failures: {:?}", report.failures);
    assert_eq!(report.generated, vec!["ingest", "double", "store"]);

    let gen = project.path().join(GENERATED_DIR);
    let double = gen.join("double");
    let main_go = fs::read_to_string(double.join("main.go")).unwrap();
    assert!(main_go.contains(r#"sourceTopic = "numbers.raw""#));
    assert!(main_go.contains(r#"destTopic   = "numbers.doubled""#));
    assert!(double.join("double.go").is_file());
    assert!(double.join("wit").join("world.wit").is_file());

    let ingest = fs::read_to_string(gen.join("ingest").join("wadm.yaml")).unwrap();
    assert!(ingest.contains("address: 0.0.0.0:8000"));

    for name in ["ingest", "double", "store"] {
        let descriptor = DeploymentDescriptor::read(&gen.join(name)).unwrap();
        assert_eq!(descriptor.component_name, name);
        assert_eq!(
            descriptor.artifact_reference.as_deref(),
            Some(format!("localhost:5000/{name}:0.1.0").as_str())
        );
    }
}

#[tokio::test]
async fn test_brush_demo_project_with_failing_build() {
    let project = demo_project();
    let pipeline = Pipeline::new(config().with_detached(true).with_metrics(true));
    let runtime = RecordingRuntime::failing(&["store-build"]);

    let report = pipeline.brush(&runtime, project.path()).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.stages.len(), 2);
    let build = &report.stages[0];
    assert_eq!(build.stage, Stage::Build);
    assert_eq!(build.succeeded(), 2);
    assert_eq!(build.retained_workers(), vec!["store-build"]);
    assert_eq!(report.stages[1].succeeded(), 3);

    // Only the failed worker is left behind.
    let running: Vec<_> = runtime.running().into_iter().collect();
    assert_eq!(running, vec!["store-build".to_string()]);

    let launched = runtime.launched();
    let build_worker = launched.iter().find(|w| w.name == "double-build").unwrap();
    assert!(build_worker
        .env
        .contains(&"REGISTRY=localhost:5000/double:0.1.0".to_string()));
    assert!(build_worker.env.contains(&"WASH_REG_USER=ci".to_string()));
    let deploy_worker = launched.iter().find(|w| w.name == "double-deploy").unwrap();
    assert!(deploy_worker
        .env
        .contains(&"WASMCLOUD_CTL_HOST=nats".to_string()));

    let history = MetricsHistory::load_or_default(&project.path().join(METRICS_FILE)).unwrap();
    assert_eq!(history.len(), 1);
}
