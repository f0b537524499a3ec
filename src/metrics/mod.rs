//! Run metrics for pelato invocations.
//!
//! Each invocation times code generation and every worker stage it runs,
//! then appends one `MetricsRun` to the project's `metrics.yaml`.
//!
//! # Example
//!
//! ```ignore
//! use pelato::metrics::{MetricsHistory, MetricsRun, METRICS_FILE};
//!
//! let clock = MetricsRun::begin();
//! let mut run = MetricsRun::new(&clock, workflow.tasks.len());
//! run.record_generation(&report);
//! run.finalize(clock.elapsed());
//!
//! let path = project_dir.join(METRICS_FILE);
//! MetricsHistory::load_or_default(&path)?.append(&run)?.save(&path)?;
//! ```

pub mod history;
pub mod run;

pub use history::{MetricsHistory, METRICS_FILE};
pub use run::{format_secs, GenerationMetrics, MetricsRun, RunClock, StageMetrics};
