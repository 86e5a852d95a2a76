//! Target tracker payloads and entity handles

use crate::source::EntityKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Where a target entity or resource lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum ContainerRef {
    /// Project path, e.g. `group/project`
    Project(String),
    /// Group path, e.g. `group`
    Group(String),
}

impl ContainerRef {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Project(path) | Self::Group(path) => path,
        }
    }
}

impl std::fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project(path) => write!(f, "project {path}"),
            Self::Group(path) => write!(f, "group {path}"),
        }
    }
}

/// A target account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: String,
}

impl TargetUser {
    #[must_use]
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            name: String::new(),
        }
    }
}

/// Handle to a created epic or issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntity {
    pub kind: EntityKind,
    /// Instance-wide numeric id
    pub id: u64,
    /// Id within the container
    pub iid: u64,
    pub container: ContainerRef,
    #[serde(default)]
    pub web_url: Option<String>,
}

/// Creation payload for an epic
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewEpic {
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    pub color: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Creation payload for an issue
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    pub assignee_ids: Vec<u64>,
    pub milestone_id: Option<u64>,
    pub weight: Option<u64>,
    pub due_date: Option<NaiveDate>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Post-creation issue update
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IssueUpdate {
    /// Attach the issue to this epic (instance-wide epic id)
    pub epic_id: Option<u64>,
    pub milestone_id: Option<u64>,
}

/// A comment on an epic or issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNote {
    pub body: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of uploading a file to a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedFile {
    pub alt: String,
    /// Project-relative URL, e.g. `/uploads/<secret>/<name>`
    pub url: String,
    /// Ready-to-embed Markdown using the relative URL
    pub markdown: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLabel {
    pub name: String,
    pub color: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewMilestone {
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: u64,
    pub title: String,
    pub closed: bool,
}

/// Target link types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Blocks,
    IsBlockedBy,
    RelatesTo,
}

impl LinkType {
    /// Wire name of the link type
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::IsBlockedBy => "is_blocked_by",
            Self::RelatesTo => "relates_to",
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
