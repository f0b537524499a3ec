//! Error types for pelato operations.
//!
//! Defines error types for each subsystem:
//! - Workflow manifest loading and validation
//! - Code generation from template sets
//! - Deployment descriptor parsing
//! - Docker worker management
//! - Stage execution (build, deploy, remove)
//! - Metrics history persistence

use thiserror::Error;

/// Errors that can occur while loading a workflow manifest.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid project '{path}': {reason}")]
    InvalidProject { path: String, reason: String },

    #[error("Failed to parse manifest '{path}': {message}")]
    ManifestParse { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while generating a single component.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Task type '{task_type}' is not supported (component '{component}')")]
    UnsupportedTaskType { component: String, task_type: String },

    #[error("Template set '{0}' not found")]
    TemplateSetNotFound(String),

    #[error("Failed to render template '{file}': {source}")]
    Render {
        file: String,
        #[source]
        source: tera::Error,
    },

    #[error("Failed to copy '{from}' to '{to}': {reason}")]
    CopyFailed {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while reading a deployment descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Deployment descriptor not found at '{0}'")]
    NotFound(String),

    #[error("Malformed deployment descriptor '{path}': {message}")]
    Malformed { path: String, message: String },

    #[error("Deployment descriptor '{path}' has no artifact reference for component '{component}'")]
    MissingArtifact { path: String, component: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Docker build failed: {0}")]
    BuildFailed(String),

    #[error("Docker run failed: {0}")]
    RunFailed(String),

    #[error("Container '{id}' not found")]
    ContainerNotFound { id: String },

    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a whole build, deploy or remove stage.
///
/// Individual worker failures are not errors: they are reported as
/// failed outcomes in the stage report.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Invalid project: generated output '{0}' does not exist")]
    InvalidProject(String),

    #[error("Descriptor error in '{dir}': {source}")]
    Descriptor {
        dir: String,
        #[source]
        source: DescriptorError,
    },

    #[error("Failed to launch worker '{worker}': {source}")]
    WorkerLaunch {
        worker: String,
        #[source]
        source: DockerError,
    },

    #[error("Failed waiting on worker '{worker}': {source}")]
    WorkerWait {
        worker: String,
        #[source]
        source: DockerError,
    },

    #[error("Failed to build worker image '{image}': {source}")]
    ImageBuild {
        image: String,
        #[source]
        source: DockerError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while reading or writing the metrics history.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
