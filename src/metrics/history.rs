//! Append-only run history persisted as `metrics.yaml`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::MetricsError;

use super::run::MetricsRun;

/// File name of the history inside a project directory.
pub const METRICS_FILE: &str = "metrics.yaml";

/// Every recorded run, oldest first.
///
/// Entries are kept as raw YAML so records written by older versions, or by
/// other tools, survive a rewrite unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsHistory {
    #[serde(default, deserialize_with = "runs_or_empty")]
    pub runs: Vec<serde_yaml::Value>,
}

impl MetricsHistory {
    /// Loads the history at `path`, or an empty one if the file is missing,
    /// blank or holds no runs.
    pub fn load_or_default(path: &Path) -> Result<Self, MetricsError> {
        if !path.exists() {
            debug!(path = %path.display(), "No metrics history yet");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let history: Option<Self> = serde_yaml::from_str(&content)?;
        Ok(history.unwrap_or_default())
    }

    /// Returns a new history with `run` appended.
    pub fn append(&self, run: &MetricsRun) -> Result<Self, MetricsError> {
        let mut runs = self.runs.clone();
        runs.push(serde_yaml::to_value(run)?);
        Ok(Self { runs })
    }

    /// Overwrites `path` with the whole history.
    pub fn save(&self, path: &Path) -> Result<(), MetricsError> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Treats an explicit `runs: null` like a missing key.
fn runs_or_empty<'de, D>(deserializer: D) -> Result<Vec<serde_yaml::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<serde_yaml::Value>>::deserialize(deserializer)?.unwrap_or_default())
}
