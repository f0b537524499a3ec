//! Task definitions and per-type fields.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tera::Context;

/// Default HTTP port for producer components.
const DEFAULT_PRODUCER_PORT: u16 = 8080;

fn default_producer_port() -> u16 {
    DEFAULT_PRODUCER_PORT
}

/// Fields of an HTTP-triggered producer publishing to NATS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerFields {
    /// Port the HTTP server listens on.
    #[serde(default = "default_producer_port")]
    pub port: u16,
    /// Subject the task output is published to.
    pub dest_topic: String,
}

/// Fields of a NATS-to-NATS processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorFields {
    /// Subject the component subscribes to.
    pub source_topic: String,
    /// Subject the task output is published to.
    pub dest_topic: String,
}

/// Fields of a NATS-to-KV synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSyncFields {
    /// Subject the component subscribes to.
    pub source_topic: String,
    /// Key-value bucket the task output is written to.
    pub kv_bucket: String,
}

/// Task type with its type-specific fields.
///
/// Unknown manifest types are kept as `Unsupported` so the rest of the
/// workflow can still be generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Producer(ProducerFields),
    Processor(ProcessorFields),
    DbSync(DbSyncFields),
    Unsupported(String),
}

impl TaskKind {
    pub const PRODUCER: &'static str = "http_producer_nats";
    pub const PROCESSOR: &'static str = "processor_nats";
    pub const DB_SYNC: &'static str = "dbsync_nats";

    /// The `type` tag as written in the manifest.
    pub fn type_name(&self) -> &str {
        match self {
            TaskKind::Producer(_) => Self::PRODUCER,
            TaskKind::Processor(_) => Self::PROCESSOR,
            TaskKind::DbSync(_) => Self::DB_SYNC,
            TaskKind::Unsupported(name) => name,
        }
    }

    /// Name of the template set directory used to generate this kind.
    pub fn template_set(&self) -> Option<&'static str> {
        match self {
            TaskKind::Producer(_) => Some("producer_nats"),
            TaskKind::Processor(_) => Some("processor_nats"),
            TaskKind::DbSync(_) => Some("nats_to_nats-kv"),
            TaskKind::Unsupported(_) => None,
        }
    }

    fn from_tag(
        tag: &str,
        fields: BTreeMap<String, serde_yaml::Value>,
    ) -> Result<Self, serde_yaml::Error> {
        let value = serde_yaml::to_value(fields)?;
        let kind = match tag {
            Self::PRODUCER => TaskKind::Producer(serde_yaml::from_value(value)?),
            Self::PROCESSOR => TaskKind::Processor(serde_yaml::from_value(value)?),
            Self::DB_SYNC => TaskKind::DbSync(serde_yaml::from_value(value)?),
            other => TaskKind::Unsupported(other.to_string()),
        };
        Ok(kind)
    }
}

/// Raw manifest entry before the type tag is resolved.
#[derive(Debug, Deserialize)]
struct RawTask {
    component_name: String,
    #[serde(rename = "type")]
    task_type: String,
    code: PathBuf,
    #[serde(default)]
    registry_url: Option<String>,
    #[serde(flatten)]
    fields: BTreeMap<String, serde_yaml::Value>,
}

/// One unit of work declared in a workflow manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTask")]
pub struct Task {
    /// Unique component name, also the generated directory name.
    pub component_name: String,
    /// Task type and its fields.
    pub kind: TaskKind,
    /// Source file, relative to the project's `tasks/` directory.
    pub code: PathBuf,
    /// Per-task registry override.
    pub registry_url: Option<String>,
}

impl TryFrom<RawTask> for Task {
    type Error = String;

    fn try_from(raw: RawTask) -> Result<Self, Self::Error> {
        let kind = TaskKind::from_tag(&raw.task_type, raw.fields).map_err(|e| {
            format!(
                "task '{}' of type '{}': {}",
                raw.component_name, raw.task_type, e
            )
        })?;

        Ok(Self {
            component_name: raw.component_name,
            kind,
            code: raw.code,
            registry_url: raw.registry_url,
        })
    }
}

impl Task {
    /// Builds the template context for this task.
    ///
    /// The per-task registry wins over `default_registry`.
    pub fn template_context(&self, project_name: &str, default_registry: Option<&str>) -> Context {
        let mut context = Context::new();
        context.insert("project_name", project_name);
        context.insert("component_name", &self.component_name);
        context.insert("type", self.kind.type_name());
        context.insert(
            "registry_url",
            self.registry_url
                .as_deref()
                .or(default_registry)
                .unwrap_or_default(),
        );
        context.insert("code", &self.code_file_name());

        match &self.kind {
            TaskKind::Producer(fields) => {
                context.insert("port", &fields.port);
                context.insert("dest_topic", &fields.dest_topic);
            }
            TaskKind::Processor(fields) => {
                context.insert("source_topic", &fields.source_topic);
                context.insert("dest_topic", &fields.dest_topic);
            }
            TaskKind::DbSync(fields) => {
                context.insert("source_topic", &fields.source_topic);
                context.insert("kv_bucket", &fields.kv_bucket);
            }
            TaskKind::Unsupported(_) => {}
        }

        context
    }

    /// File name the source is copied to inside the generated component.
    pub fn code_file_name(&self) -> String {
        self.code
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.code.display().to_string())
    }
}
