//! Workflow manifest model.
//!
//! A project directory holds a `workflow.yaml` manifest and a `tasks/`
//! directory with the user-authored source files the manifest references.
//!
//! # Example
//!
//! ```ignore
//! use pelato::workflow::Workflow;
//!
//! let workflow = Workflow::load("example_project")?;
//! for task in &workflow.tasks {
//!     println!("{} ({})", task.component_name, task.kind.type_name());
//! }
//! ```

pub mod task;

pub use task::{DbSyncFields, ProcessorFields, ProducerFields, Task, TaskKind};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::WorkflowError;

/// Manifest file name inside a project directory.
pub const MANIFEST_FILE: &str = "workflow.yaml";

/// Directory holding task source files inside a project directory.
pub const TASKS_DIR: &str = "tasks";

/// A parsed and validated workflow manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Workflow {
    /// Human readable project name.
    pub project_name: String,
    /// Tasks in manifest order.
    pub tasks: Vec<Task>,
}

impl Workflow {
    /// Loads and validates the manifest of a project directory.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::InvalidProject` if `workflow.yaml` or `tasks/` is missing
    /// - `WorkflowError::ManifestParse` if the manifest is malformed or invalid
    pub fn load<P: AsRef<Path>>(project_dir: P) -> Result<Self, WorkflowError> {
        let project_dir = project_dir.as_ref();
        let manifest_path = project_dir.join(MANIFEST_FILE);
        let tasks_dir = project_dir.join(TASKS_DIR);

        if !manifest_path.is_file() {
            return Err(WorkflowError::InvalidProject {
                path: project_dir.display().to_string(),
                reason: format!("missing {}", MANIFEST_FILE),
            });
        }

        if !tasks_dir.is_dir() {
            return Err(WorkflowError::InvalidProject {
                path: project_dir.display().to_string(),
                reason: format!("missing {}/ directory", TASKS_DIR),
            });
        }

        let content = fs::read_to_string(&manifest_path)?;
        Self::parse(&content, &manifest_path.display().to_string())
    }

    /// Parses and validates a manifest from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self, WorkflowError> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, path: &str) -> Result<Self, WorkflowError> {
        let workflow: Workflow =
            serde_yaml::from_str(content).map_err(|e| WorkflowError::ManifestParse {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        workflow
            .validate()
            .map_err(|message| WorkflowError::ManifestParse {
                path: path.to_string(),
                message,
            })?;

        Ok(workflow)
    }

    /// Checks the structural invariants of the manifest.
    fn validate(&self) -> Result<(), String> {
        if self.project_name.trim().is_empty() {
            return Err("project_name cannot be empty".to_string());
        }

        if self.tasks.is_empty() {
            return Err("tasks cannot be empty".to_string());
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !is_valid_component_name(&task.component_name) {
                return Err(format!(
                    "invalid component_name '{}': must start with an alphanumeric character and contain only alphanumerics, '-', '_' or '.'",
                    task.component_name
                ));
            }
            if !seen.insert(task.component_name.as_str()) {
                return Err(format!(
                    "duplicate component_name '{}'",
                    task.component_name
                ));
            }
        }

        Ok(())
    }

    /// Path of a task's source file inside the project.
    pub fn source_path(project_dir: &Path, task: &Task) -> PathBuf {
        project_dir.join(TASKS_DIR).join(&task.code)
    }
}

/// Component names double as directory and container names.
fn is_valid_component_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
