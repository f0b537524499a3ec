//! pelato: code generation and deployment pipeline for wasmCloud components.
//!
//! This library turns a workflow manifest into generated component sources
//! and drives the build, deploy and remove stages through Docker workers.

// Core modules
pub mod cli;
pub mod descriptor;
pub mod error;
pub mod execution;
pub mod generator;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod workflow;

// Re-export commonly used error types
pub use error::{
    DescriptorError, DockerError, GeneratorError, MetricsError, StageError, WorkflowError,
};
