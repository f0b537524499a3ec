//! A single metrics record covering one CLI invocation.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::generator::GenerationReport;
use crate::orchestrator::{Stage, StageReport};

/// Formats a duration as seconds with three decimals.
pub fn format_secs(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

/// Start point of a timed run.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started_at: DateTime<Utc>,
    start: Instant,
}

impl RunClock {
    /// Wall-clock time the run started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time elapsed since the run started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Code generation timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetrics {
    pub gen_time: String,
}

/// Timings of one worker stage.
///
/// Keys follow the history file layout: `image_build_time` when the worker
/// image had to be built, and `components_<stage>_time`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageMetrics(BTreeMap<String, String>);

impl StageMetrics {
    pub fn from_report(report: &StageReport) -> Self {
        let mut values = BTreeMap::new();
        if let Some(image_time) = report.image_build_time {
            values.insert("image_build_time".to_string(), format_secs(image_time));
        }
        values.insert(
            format!("components_{}_time", report.stage.name()),
            format_secs(report.components_time),
        );
        Self(values)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// One appended entry of the metrics history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRun {
    pub started_at: DateTime<Utc>,
    pub n_task: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_gen: Option<GenerationMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<StageMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<StageMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<StageMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_total: Option<String>,
}

impl MetricsRun {
    /// Starts timing a run.
    pub fn begin() -> RunClock {
        RunClock {
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    /// Creates an empty run for `n_task` workflow tasks.
    pub fn new(clock: &RunClock, n_task: usize) -> Self {
        Self {
            started_at: clock.started_at(),
            n_task,
            code_gen: None,
            build: None,
            deploy: None,
            remove: None,
            time_total: None,
        }
    }

    pub fn record_generation(&mut self, report: &GenerationReport) {
        self.code_gen = Some(GenerationMetrics {
            gen_time: format_secs(report.gen_time),
        });
    }

    pub fn record_stage(&mut self, report: &StageReport) {
        let metrics = Some(StageMetrics::from_report(report));
        match report.stage {
            Stage::Build => self.build = metrics,
            Stage::Deploy => self.deploy = metrics,
            Stage::Remove => self.remove = metrics,
        }
    }

    /// Stamps the total wall time of the run.
    pub fn finalize(&mut self, total: Duration) {
        self.time_total = Some(format_secs(total));
    }
}
