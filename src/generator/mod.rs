//! Component code generation.
//!
//! Turns every task of a workflow into a buildable component directory
//! under `<project>/gen/<component_name>/`. The output tree is deleted and
//! recreated on every run, so it always mirrors the current manifest.
//!
//! A task that fails to generate is logged and skipped; the remaining tasks
//! are still generated.
//!
//! # Example
//!
//! ```ignore
//! use pelato::generator::CodeGenerator;
//! use pelato::workflow::Workflow;
//!
//! let workflow = Workflow::load("example_project")?;
//! let generator = CodeGenerator::new("templates").with_registry_url("localhost:5000");
//! let report = generator.generate(&workflow, "example_project".as_ref())?;
//! println!("{} generated, {} failed", report.generated.len(), report.failures.len());
//! ```

pub mod templates;

pub use templates::{copy_tree, render_in_place, TemplateSet, VERBATIM_FILES};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::error::GeneratorError;
use crate::workflow::{Task, Workflow};

/// Directory holding generated components inside a project directory.
pub const GENERATED_DIR: &str = "gen";

/// A task that could not be generated.
#[derive(Debug)]
pub struct TaskFailure {
    /// Component name of the failed task.
    pub component: String,
    /// Why generation failed.
    pub error: GeneratorError,
}

impl TaskFailure {
    /// Whether the task was skipped because its type has no template set.
    pub fn is_unsupported(&self) -> bool {
        matches!(self.error, GeneratorError::UnsupportedTaskType { .. })
    }
}

/// Outcome of generating a whole workflow.
#[derive(Debug)]
pub struct GenerationReport {
    /// Root of the generated tree.
    pub output_dir: PathBuf,
    /// Components generated successfully, in manifest order.
    pub generated: Vec<String>,
    /// Tasks that failed, in manifest order.
    pub failures: Vec<TaskFailure>,
    /// Wall time spent generating.
    pub gen_time: Duration,
}

impl GenerationReport {
    /// Returns true when every task was generated.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Generates component directories from template sets.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    templates_dir: PathBuf,
    registry_url: Option<String>,
}

impl CodeGenerator {
    /// Creates a generator reading template sets from `templates_dir`.
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            registry_url: None,
        }
    }

    /// Sets the registry URL rendered into tasks without their own.
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = Some(url.into());
        self
    }

    /// Sets or clears the default registry URL.
    pub fn with_registry(mut self, url: Option<String>) -> Self {
        self.registry_url = url;
        self
    }

    /// Generates every task of `workflow` into `<project_dir>/gen`.
    ///
    /// # Errors
    ///
    /// Only failures to reset the output directory are returned. Per-task
    /// failures are collected in the report.
    pub fn generate(
        &self,
        workflow: &Workflow,
        project_dir: &Path,
    ) -> Result<GenerationReport, GeneratorError> {
        let started = Instant::now();
        let output_dir = project_dir.join(GENERATED_DIR);

        info!(
            project = %workflow.project_name,
            tasks = workflow.tasks.len(),
            "Generating code"
        );

        if self.registry_url.is_none() && workflow.tasks.iter().any(|t| t.registry_url.is_none()) {
            warn!("No registry URL configured; artifact references will be incomplete");
        }

        if output_dir.exists() {
            fs::remove_dir_all(&output_dir)?;
        }
        fs::create_dir_all(&output_dir)?;

        let mut generated = Vec::new();
        let mut failures = Vec::new();

        for task in &workflow.tasks {
            match self.generate_task(workflow, task, project_dir, &output_dir) {
                Ok(()) => {
                    info!(component = %task.component_name, "Task generated");
                    generated.push(task.component_name.clone());
                }
                Err(e) => {
                    match &e {
                        GeneratorError::UnsupportedTaskType { .. } => {
                            warn!(component = %task.component_name, error = %e, "Skipping task");
                        }
                        _ => {
                            error!(component = %task.component_name, error = %e, "Failed to generate task");
                        }
                    }

                    // Never leave a half-rendered component behind.
                    let partial = output_dir.join(&task.component_name);
                    if partial.exists() {
                        if let Err(cleanup) = fs::remove_dir_all(&partial) {
                            warn!(
                                component = %task.component_name,
                                error = %cleanup,
                                "Failed to remove partial component directory"
                            );
                        }
                    }

                    failures.push(TaskFailure {
                        component: task.component_name.clone(),
                        error: e,
                    });
                }
            }
        }

        let gen_time = started.elapsed();
        info!(
            generated = generated.len(),
            failed = failures.len(),
            elapsed_secs = gen_time.as_secs_f64(),
            "Code generation completed"
        );

        Ok(GenerationReport {
            output_dir,
            generated,
            failures,
            gen_time,
        })
    }

    fn generate_task(
        &self,
        workflow: &Workflow,
        task: &Task,
        project_dir: &Path,
        output_dir: &Path,
    ) -> Result<(), GeneratorError> {
        let set_name =
            task.kind
                .template_set()
                .ok_or_else(|| GeneratorError::UnsupportedTaskType {
                    component: task.component_name.clone(),
                    task_type: task.kind.type_name().to_string(),
                })?;

        let set = TemplateSet::resolve(&self.templates_dir, set_name)?;
        let dest = output_dir.join(&task.component_name);
        let context =
            task.template_context(&workflow.project_name, self.registry_url.as_deref());

        set.instantiate(&dest, &context)?;

        let source = Workflow::source_path(project_dir, task);
        let target = dest.join(task.code_file_name());
        fs::copy(&source, &target).map_err(|e| GeneratorError::CopyFailed {
            from: source.display().to_string(),
            to: target.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}
