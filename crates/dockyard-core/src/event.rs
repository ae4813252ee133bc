//! Normalized source-control events.

use serde::{Deserialize, Serialize};

/// Kind of event that can trigger a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Push,
    Tag,
    Pull,
}

impl EventType {
    /// The name used in trigger declarations (`push`, `tag`, `pull`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Push => "push",
            EventType::Tag => "tag",
            EventType::Pull => "pull",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventType::Push),
            "tag" => Ok(EventType::Tag),
            "pull" | "pull_request" | "pull-request" => Ok(EventType::Pull),
            _ => Err(format!("Unknown event type: {}", s)),
        }
    }
}

/// Pull request details needed to check out the merge ref and report status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    /// Head commit of the pull request; commit statuses are posted here.
    pub head_sha: String,
}

/// One inbound notification, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub branch: String,
    pub organization: String,
    pub repository: String,
    pub clone_url: String,
    /// Commit SHA, or `pull/<N>/head` for pull requests.
    pub revision: String,
    pub pull_request: Option<PullRequest>,
}

impl Event {
    pub fn is_pull_request(&self) -> bool {
        self.event_type == EventType::Pull
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.organization, self.repository)
    }

    /// Commit that pull-request statuses are attached to.
    pub fn status_sha(&self) -> Option<&str> {
        if !self.is_pull_request() {
            return None;
        }
        self.pull_request.as_ref().map(|pr| pr.head_sha.as_str())
    }
}
