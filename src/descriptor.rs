//! Deployment descriptor reader.
//!
//! Every generated component carries a wadm application manifest. The stages
//! only need the first component entry: its name drives worker naming and its
//! `properties.image` is the artifact the build worker pushes.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::DescriptorError;

/// Descriptor file name inside a generated component.
pub const DESCRIPTOR_FILE: &str = "wadm.yaml";

#[derive(Debug, Deserialize)]
struct Manifest {
    spec: ManifestSpec,
}

#[derive(Debug, Deserialize)]
struct ManifestSpec {
    #[serde(default)]
    components: Vec<ManifestComponent>,
}

#[derive(Debug, Deserialize)]
struct ManifestComponent {
    name: String,
    #[serde(default)]
    properties: Option<ComponentProperties>,
}

#[derive(Debug, Deserialize)]
struct ComponentProperties {
    #[serde(default)]
    image: Option<String>,
}

/// Name and artifact reference of a generated component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentDescriptor {
    /// Component name as declared in the descriptor.
    pub component_name: String,
    /// OCI reference of the built artifact, if declared.
    pub artifact_reference: Option<String>,
    /// Path the descriptor was read from.
    pub path: String,
}

impl DeploymentDescriptor {
    /// Reads the descriptor of the component in `component_dir`.
    pub fn read(component_dir: &Path) -> Result<Self, DescriptorError> {
        let path = component_dir.join(DESCRIPTOR_FILE);
        let path_str = path.display().to_string();

        if !path.is_file() {
            return Err(DescriptorError::NotFound(path_str));
        }

        let content = fs::read_to_string(&path)?;
        Self::parse(&content, &path_str)
    }

    /// Parses descriptor content; `path` is only used in error messages.
    pub fn parse(content: &str, path: &str) -> Result<Self, DescriptorError> {
        let manifest: Manifest =
            serde_yaml::from_str(content).map_err(|e| DescriptorError::Malformed {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        let component = manifest
            .spec
            .components
            .into_iter()
            .next()
            .ok_or_else(|| DescriptorError::Malformed {
                path: path.to_string(),
                message: "spec.components is empty".to_string(),
            })?;

        if component.name.trim().is_empty() {
            return Err(DescriptorError::Malformed {
                path: path.to_string(),
                message: "spec.components[0].name is empty".to_string(),
            });
        }

        Ok(Self {
            component_name: component.name,
            artifact_reference: component
                .properties
                .and_then(|p| p.image)
                .filter(|image| !image.trim().is_empty()),
            path: path.to_string(),
        })
    }

    /// Returns the artifact reference, which the build stage requires.
    pub fn require_artifact(&self) -> Result<&str, DescriptorError> {
        self.artifact_reference
            .as_deref()
            .ok_or_else(|| DescriptorError::MissingArtifact {
                path: self.path.clone(),
                component: self.component_name.clone(),
            })
    }
}
