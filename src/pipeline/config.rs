//! Pipeline configuration.
//!
//! Registry credentials, control-plane address and execution flags are read
//! once at startup into a `PipelineConfig` that is passed by reference to
//! every stage.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the environment file loaded at startup.
pub const ENV_FILE: &str = ".env";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The environment file exists but could not be loaded.
    #[error("Failed to load {}: {message}", .path.display())]
    EnvFile { path: PathBuf, message: String },
}

/// Configuration for the generate/build/deploy/remove pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Registry settings
    /// OCI registry URL that generated components are pushed to.
    pub registry_url: Option<String>,
    /// Registry user handed to build workers.
    pub registry_user: Option<String>,
    /// Registry password handed to build workers.
    pub registry_password: Option<String>,

    // Control plane settings
    /// Host of the NATS control plane used by deploy/remove workers.
    pub nats_host: String,
    /// Port of the NATS control plane.
    pub nats_port: u16,

    // Execution settings
    /// Launch every worker of a stage before waiting on any.
    pub detached: bool,
    /// Append a run record to `metrics.yaml` after each invocation.
    pub metrics_enabled: bool,
    /// Timeout for Docker API calls.
    pub docker_timeout: Duration,
    /// Pause between stages of the composite `brush` command.
    pub stage_pause: Duration,

    // Asset settings
    /// Root directory holding `templates/` and `docker/`.
    pub assets_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            registry_url: None,
            registry_user: None,
            registry_password: None,

            nats_host: "127.0.0.1".to_string(),
            nats_port: 4222,

            detached: false,
            metrics_enabled: false,
            docker_timeout: Duration::from_secs(120),
            stage_pause: Duration::from_millis(1000),

            assets_dir: PathBuf::from("."),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REGISTRY_URL`: OCI registry for component artifacts
    /// - `REGISTRY_USER` / `REGISTRY_PASSWORD`: registry credentials
    /// - `NATS_HOST` / `NATS_PORT`: control plane address (default: 127.0.0.1:4222)
    /// - `PARALLEL_BUILD`: detached worker mode, `True`/`False` (default: False)
    /// - `ENABLE_METRICS`: metrics history, `True`/`False` (default: False)
    /// - `DOCKER_TIMEOUT`: Docker API timeout in seconds (default: 120)
    /// - `PELATO_STAGE_PAUSE_MS`: pause between brush stages (default: 1000)
    /// - `PELATO_ASSETS_DIR`: directory holding `templates/` and `docker/` (default: .)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Registry settings
        config.registry_url = lookup("REGISTRY_URL").filter(|v| !v.is_empty());
        config.registry_user = lookup("REGISTRY_USER").filter(|v| !v.is_empty());
        config.registry_password = lookup("REGISTRY_PASSWORD").filter(|v| !v.is_empty());

        // Control plane settings
        if let Some(val) = lookup("NATS_HOST") {
            config.nats_host = val;
        }

        if let Some(val) = lookup("NATS_PORT") {
            config.nats_port = parse_env_value(&val, "NATS_PORT")?;
        }

        // Execution settings
        if let Some(val) = lookup("PARALLEL_BUILD") {
            config.detached = parse_env_bool(&val, "PARALLEL_BUILD")?;
        }

        if let Some(val) = lookup("ENABLE_METRICS") {
            config.metrics_enabled = parse_env_bool(&val, "ENABLE_METRICS")?;
        }

        if let Some(val) = lookup("DOCKER_TIMEOUT") {
            let secs: u64 = parse_env_value(&val, "DOCKER_TIMEOUT")?;
            config.docker_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("PELATO_STAGE_PAUSE_MS") {
            let millis: u64 = parse_env_value(&val, "PELATO_STAGE_PAUSE_MS")?;
            config.stage_pause = Duration::from_millis(millis);
        }

        if let Some(val) = lookup("PELATO_ASSETS_DIR") {
            config.assets_dir = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nats_host.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "nats_host cannot be empty".to_string(),
            ));
        }

        if self.nats_port == 0 {
            return Err(ConfigError::ValidationFailed(
                "nats_port must be greater than 0".to_string(),
            ));
        }

        if self.docker_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "docker_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Directory holding one template set per supported task type.
    pub fn templates_dir(&self) -> PathBuf {
        self.assets_dir.join("templates")
    }

    /// Directory holding the worker image Dockerfiles.
    pub fn docker_dir(&self) -> PathBuf {
        self.assets_dir.join("docker")
    }

    /// Builder method to set the registry URL.
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = Some(url.into());
        self
    }

    /// Builder method to set the registry credentials.
    pub fn with_registry_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.registry_user = Some(user.into());
        self.registry_password = Some(password.into());
        self
    }

    /// Builder method to set the control plane address.
    pub fn with_nats(mut self, host: impl Into<String>, port: u16) -> Self {
        self.nats_host = host.into();
        self.nats_port = port;
        self
    }

    /// Builder method to enable or disable detached mode.
    pub fn with_detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    /// Builder method to enable or disable the metrics history.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Builder method to set the pause between brush stages.
    pub fn with_stage_pause(mut self, pause: Duration) -> Self {
        self.stage_pause = pause;
        self
    }

    /// Builder method to set the assets directory.
    pub fn with_assets_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.assets_dir = dir.as_ref().to_path_buf();
        self
    }
}

/// Loads the nearest `.env` file from `dir` or one of its ancestors.
///
/// Values in the file override variables already set in the process
/// environment. Returns the loaded path, or `None` when no file exists.
pub fn load_env_file_from(dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let Some(path) = dir
        .ancestors()
        .map(|d| d.join(ENV_FILE))
        .find(|candidate| candidate.is_file())
    else {
        return Ok(None);
    };

    dotenvy::from_path_override(&path).map_err(|e| ConfigError::EnvFile {
        path: path.clone(),
        message: e.to_string(),
    })?;
    Ok(Some(path))
}

/// Loads the nearest `.env` file starting from the working directory.
pub fn load_env_file() -> Result<Option<PathBuf>, ConfigError> {
    let dir = std::env::current_dir().map_err(|e| ConfigError::EnvFile {
        path: PathBuf::from(ENV_FILE),
        message: e.to_string(),
    })?;
    load_env_file_from(&dir)
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
///
/// Accepts the `True`/`False` spelling as well as `1`/`0`, `yes`/`no` and `on`/`off`.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
