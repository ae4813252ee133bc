//! Build spec parsing.

use crate::{ConfigError, ConfigResult};
use dockyard_core::{BuildSpec, EventType};

/// Location of the build spec in a target repository.
pub const BUILD_SPEC_PATH: &str = ".dockyard.yml";

/// Parse a build spec from YAML text.
pub fn parse_spec(yaml: &str) -> ConfigResult<BuildSpec> {
    let spec: BuildSpec = serde_yaml::from_str(yaml)?;

    if spec.docker.file.trim().is_empty() {
        return Err(ConfigError::MissingField("docker.file".to_string()));
    }

    for pipeline in &spec.pipelines {
        if pipeline.name.is_empty() {
            return Err(ConfigError::MissingField("pipelines[].name".to_string()));
        }
    }

    Ok(spec)
}

/// Authoring problems that only show up when a build runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecWarning {
    UnknownJob { pipeline: String, job: String },
    UnknownPipeline { trigger: String, pipeline: String },
    UnknownEvent { trigger: String, event: String },
    DuplicateTrigger { event: String, branch: String },
}

impl std::fmt::Display for SpecWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecWarning::UnknownJob { pipeline, job } => {
                write!(f, "pipeline '{}' references unknown job '{}'", pipeline, job)
            }
            SpecWarning::UnknownPipeline { trigger, pipeline } => {
                write!(
                    f,
                    "trigger '{}' references unknown pipeline '{}'",
                    trigger, pipeline
                )
            }
            SpecWarning::UnknownEvent { trigger, event } => {
                write!(f, "trigger '{}' uses unknown event '{}'", trigger, event)
            }
            SpecWarning::DuplicateTrigger { event, branch } => {
                write!(
                    f,
                    "more than one trigger for event '{}' on branch '{}'; the first one wins",
                    event, branch
                )
            }
        }
    }
}

/// Cross-reference jobs, pipelines and triggers.
pub fn validate_spec(spec: &BuildSpec) -> Vec<SpecWarning> {
    let mut warnings = Vec::new();

    for pipeline in &spec.pipelines {
        for job in &pipeline.jobs {
            if !spec.jobs.contains_key(job) {
                warnings.push(SpecWarning::UnknownJob {
                    pipeline: pipeline.name.clone(),
                    job: job.clone(),
                });
            }
        }
    }

    let mut seen = Vec::new();
    for trigger in &spec.triggers {
        let known = [EventType::Push, EventType::Tag, EventType::Pull];
        if !known.iter().any(|e| e.as_str() == trigger.event) {
            warnings.push(SpecWarning::UnknownEvent {
                trigger: trigger.name.clone(),
                event: trigger.event.clone(),
            });
        }
        if spec.pipeline(&trigger.pipeline).is_none() {
            warnings.push(SpecWarning::UnknownPipeline {
                trigger: trigger.name.clone(),
                pipeline: trigger.pipeline.clone(),
            });
        }
        let key = (trigger.event.as_str(), trigger.branch.as_str());
        if seen.contains(&key) {
            warnings.push(SpecWarning::DuplicateTrigger {
                event: trigger.event.clone(),
                branch: trigger.branch.clone(),
            });
        } else {
            seen.push(key);
        }
    }

    warnings
}
