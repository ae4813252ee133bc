//! Build specification committed in a target repository.
//!
//! The spec is re-fetched at the event's revision for every build, so none of
//! these types are cached between builds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::Event;

/// Parsed `.dockyard.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Image used to run every job.
    pub docker: ImageSpec,
    /// Job name to shell command.
    #[serde(default)]
    pub jobs: HashMap<String, String>,
    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,
    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,
}

/// Image descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Path of the Dockerfile relative to the repository root.
    pub file: String,
    /// User the container runs as.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(
        default,
        rename = "workingDir",
        alias = "workingdir",
        alias = "working_dir"
    )]
    pub working_dir: Option<String>,
}

/// A named, ordered sequence of job names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    #[serde(default)]
    pub jobs: Vec<String>,
}

/// Binds an event type and branch to a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    #[serde(default)]
    pub name: String,
    pub event: String,
    pub branch: String,
    pub pipeline: String,
    #[serde(default, rename = "envVars", alias = "envvars", alias = "env")]
    pub env_vars: BTreeMap<String, String>,
}

impl TriggerSpec {
    /// Exact match on event type and branch; no globbing.
    pub fn matches(&self, event: &Event) -> bool {
        self.event == event.event_type.as_str() && self.branch == event.branch
    }

    /// Environment in `KEY=value` form for the container.
    pub fn env_list(&self) -> Vec<String> {
        self.env_vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

impl BuildSpec {
    pub fn pipeline(&self, name: &str) -> Option<&PipelineSpec> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    pub fn job_command(&self, job: &str) -> Option<&str> {
        self.jobs.get(job).map(String::as_str)
    }
}
