//! Stage definitions for the worker-driven stages.

use std::path::{Path, PathBuf};

use crate::descriptor::DeploymentDescriptor;
use crate::error::DescriptorError;
use crate::pipeline::config::PipelineConfig;

/// A stage executed by launching one worker per generated component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Compile the component and push it to the registry.
    Build,
    /// Deploy the component onto the lattice.
    Deploy,
    /// Remove a deployed component from the lattice.
    Remove,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Stage {
    /// Stage name used in worker names and metric keys.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Build => "build",
            Stage::Deploy => "deploy",
            Stage::Remove => "remove",
        }
    }

    /// Default worker image tag.
    pub fn default_image(&self) -> &'static str {
        match self {
            Stage::Build => "wash-build-image:latest",
            Stage::Deploy => "wash-deploy-image:latest",
            Stage::Remove => "wash-remove-image:latest",
        }
    }

    /// Dockerfile the worker image is built from, relative to the docker dir.
    pub fn dockerfile(&self) -> &'static str {
        match self {
            Stage::Build => "build.Dockerfile",
            Stage::Deploy => "deploy.Dockerfile",
            Stage::Remove => "remove.Dockerfile",
        }
    }

    /// Environment handed to the worker of one component.
    ///
    /// # Errors
    ///
    /// The build stage fails with `DescriptorError::MissingArtifact` when the
    /// descriptor names no image to push.
    pub fn worker_env(
        &self,
        descriptor: &DeploymentDescriptor,
        config: &PipelineConfig,
        identity: HostIdentity,
    ) -> Result<Vec<String>, DescriptorError> {
        match self {
            Stage::Build => Ok(vec![
                format!("REGISTRY={}", descriptor.require_artifact()?),
                format!(
                    "WASH_REG_USER={}",
                    config.registry_user.as_deref().unwrap_or_default()
                ),
                format!(
                    "WASH_REG_PASSWORD={}",
                    config.registry_password.as_deref().unwrap_or_default()
                ),
                format!("HOST_UID={}", identity.uid),
                format!("HOST_GID={}", identity.gid),
            ]),
            Stage::Deploy | Stage::Remove => Ok(vec![
                format!("WASMCLOUD_CTL_HOST={}", config.nats_host),
                format!("WASMCLOUD_CTL_PORT={}", config.nats_port),
            ]),
        }
    }
}

/// Owner of the generated files, so build workers can hand ownership back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl HostIdentity {
    /// Reads the owning user and group of `path`.
    #[cfg(unix)]
    pub fn of(path: &Path) -> std::io::Result<Self> {
        use std::os::unix::fs::MetadataExt;

        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            uid: metadata.uid(),
            gid: metadata.gid(),
        })
    }

    #[cfg(not(unix))]
    pub fn of(path: &Path) -> std::io::Result<Self> {
        std::fs::metadata(path)?;
        Ok(Self::default())
    }
}

/// Everything the orchestrator needs to run one stage.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// Which stage this is.
    pub stage: Stage,
    /// Worker image tag.
    pub image: String,
    /// Build context used when the image is absent.
    pub context_dir: PathBuf,
    /// Dockerfile inside the build context.
    pub dockerfile: String,
    /// Launch every worker before waiting on any.
    pub detached: bool,
}

impl StageSpec {
    /// Builds the spec of `stage` from the pipeline configuration.
    pub fn from_config(stage: Stage, config: &PipelineConfig) -> Self {
        Self {
            stage,
            image: stage.default_image().to_string(),
            context_dir: config.docker_dir(),
            dockerfile: stage.dockerfile().to_string(),
            detached: config.detached,
        }
    }

    /// Overrides the detached flag.
    pub fn with_detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(image: Option<&str>) -> DeploymentDescriptor {
        DeploymentDescriptor {
            component_name: "double".to_string(),
            artifact_reference: image.map(str::to_string),
            path: "gen/double/wadm.yaml".to_string(),
        }
    }

    #[test]
    fn test_build_env() {
        let config = PipelineConfig::new().with_registry_credentials("bot", "pw");
        let identity = HostIdentity { uid: 1000, gid: 100 };
        let env = Stage::Build
            .worker_env(&descriptor(Some("localhost:5000/double:0.1.0")), &config, identity)
            .unwrap();

        assert_eq!(
            env,
            vec![
                "REGISTRY=localhost:5000/double:0.1.0",
                "WASH_REG_USER=bot",
                "WASH_REG_PASSWORD=pw",
                "HOST_UID=1000",
                "HOST_GID=100",
            ]
        );
    }

    #[test]
    fn test_build_env_requires_artifact() {
        let result = Stage::Build.worker_env(
            &descriptor(None),
            &PipelineConfig::new(),
            HostIdentity::default(),
        );
        assert!(matches!(result, Err(DescriptorError::MissingArtifact { .. })));
    }

    #[test]
    fn test_deploy_and_remove_env() {
        let config = PipelineConfig::new().with_nats("nats.local", 4223);
        for stage in [Stage::Deploy, Stage::Remove] {
            let env = stage
                .worker_env(&descriptor(None), &config, HostIdentity::default())
                .unwrap();
            assert_eq!(
                env,
                vec!["WASMCLOUD_CTL_HOST=nats.local", "WASMCLOUD_CTL_PORT=4223"]
            );
        }
    }

    #[test]
    fn test_stage_spec_from_config() {
        let config = PipelineConfig::new()
            .with_assets_dir("/opt/pelato")
            .with_detached(true);
        let spec = StageSpec::from_config(Stage::Deploy, &config);

        assert_eq!(spec.image, "wash-deploy-image:latest");
        assert_eq!(spec.dockerfile, "deploy.Dockerfile");
        assert_eq!(spec.context_dir, PathBuf::from("/opt/pelato/docker"));
        assert!(spec.detached);
        assert_eq!(Stage::Remove.to_string(), "remove");
    }
}
