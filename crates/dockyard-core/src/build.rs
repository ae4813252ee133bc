//! Persisted record of one orchestration run and its tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{BuildId, Error};

/// Lifecycle status shared by builds and tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Running,
    Success,
    Error,
}

impl BuildStatus {
    /// Terminal status for an outcome: no error means success.
    pub fn from_outcome(err: Option<&Error>) -> Self {
        match err {
            None => BuildStatus::Success,
            Some(_) => BuildStatus::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::Running)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(BuildStatus::Running),
            "success" => Ok(BuildStatus::Success),
            "error" => Ok(BuildStatus::Error),
            _ => Err(format!("Unknown build status: {}", s)),
        }
    }
}

/// One job's execution record within a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub command: String,
    pub status: BuildStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn start(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            status: BuildStatus::Running,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// The persistent record of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,
    pub organization: String,
    pub repository: String,
    pub event: String,
    pub branch: String,
    pub pipeline: String,
    pub status: BuildStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub env_vars: BTreeMap<String, String>,
    /// Ordered by insertion; a task's index is its position.
    pub tasks: Vec<Task>,
}

impl Build {
    /// A fresh `running` build starting now.
    pub fn start(
        organization: impl Into<String>,
        repository: impl Into<String>,
        event: impl Into<String>,
        branch: impl Into<String>,
        pipeline: impl Into<String>,
        env_vars: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: BuildId::new(),
            organization: organization.into(),
            repository: repository.into(),
            event: event.into(),
            branch: branch.into(),
            pipeline: pipeline.into(),
            status: BuildStatus::Running,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            env_vars,
            tasks: Vec::new(),
        }
    }

    pub fn log_path(&self) -> String {
        log_path(&self.organization, &self.repository, &self.id)
    }
}

/// Address of a build's log blob: `/<organization>/<repository>/<build-id>`.
pub fn log_path(organization: &str, repository: &str, id: &BuildId) -> String {
    format!("/{}/{}/{}", organization, repository, id)
}
