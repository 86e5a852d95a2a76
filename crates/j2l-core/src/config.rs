//! Migration configuration
//!
//! Loaded from YAML and validated once. Everything downstream receives the
//! validated [`MigrationConfig`] explicitly.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// An API token; never printed
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Base URL, e.g. `https://jira.example.com`
    pub host: String,
    /// Project key
    pub project: String,
    /// Extra filter combined with the project clause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Secret>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Base URL, e.g. `https://gitlab.example.com`
    pub host: String,
    /// Project path receiving issues, milestones and uploads
    pub issue_project: String,
    /// Group path receiving epics
    pub epic_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Secret>,
}

/// Source custom field ids
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomFields {
    /// Numeric story points, mapped to issue weight
    #[serde(default)]
    pub story_point: Option<String>,
    /// `YYYY-MM-DD` start date of an epic
    #[serde(default)]
    pub epic_start_date: Option<String>,
    /// Key of the epic an issue belongs to
    #[serde(default)]
    pub parent_epic: Option<String>,
}

/// Per-phase in-flight limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConcurrencyLimits {
    pub entities: usize,
    pub attachments: usize,
    pub comments: usize,
    pub links: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            entities: 5,
            attachments: 5,
            comments: 5,
            links: 5,
        }
    }
}

/// What to do when posting one comment fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentFailurePolicy {
    /// Fail the entity at the comments stage
    #[default]
    FailFast,
    /// Log, count the comment as skipped and continue
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommentPolicy {
    pub on_failure: CommentFailurePolicy,
}

/// Complete migration configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub custom_fields: CustomFields,
    /// Source identity to target numeric user id
    pub users: BTreeMap<String, u64>,
    #[serde(default)]
    pub concurrency: ConcurrencyLimits,
    #[serde(default)]
    pub comments: CommentPolicy,
}

const TEMPLATE: &str = r#"# j2lab migration configuration
source:
  # Base URL of the source tracker
  host: https://jira.example.com
  # Project key; upper-cased on load
  project: PROJ
  # Optional extra filter, combined with the project clause
  # query: "labels = migrate"

target:
  host: https://gitlab.example.com
  # Project receiving issues, milestones and uploads
  issue_project: group/project
  # Group receiving epics
  epic_group: group

custom_fields:
  # Numeric story points, copied to issue weight
  story_point: customfield_10016
  # Epic start date (YYYY-MM-DD)
  epic_start_date: customfield_10015
  # Key of the parent epic
  # parent_epic: customfield_10014

# Source identity -> target user id; every referenced identity must appear
users:
  jane.doe: 1

concurrency:
  entities: 5
  attachments: 5
  comments: 5
  links: 5

comments:
  # fail_fast or best_effort
  on_failure: fail_fast
"#;

impl MigrationConfig {
    /// Parse, normalize and validate a YAML document
    ///
    /// # Errors
    /// [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Read a config file
    ///
    /// # Errors
    /// [`ConfigError::Io`] plus everything [`Self::from_yaml_str`] returns.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Starter document for `config new`
    #[inline]
    #[must_use]
    pub fn template() -> &'static str {
        TEMPLATE
    }

    fn normalize(&mut self) {
        self.source.project = self.source.project.trim().to_uppercase();
        self.source.host = self.source.host.trim().trim_end_matches('/').to_string();
        self.target.host = self.target.host.trim().trim_end_matches('/').to_string();
        self.target.issue_project = self.target.issue_project.trim().trim_matches('/').to_string();
        self.target.epic_group = self.target.epic_group.trim().trim_matches('/').to_string();
    }

    /// Check every field the engine relies on
    ///
    /// # Errors
    /// The first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_host("source.host", &self.source.host)?;
        check_host("target.host", &self.target.host)?;
        check_present("source.project", &self.source.project)?;
        check_present("target.issue_project", &self.target.issue_project)?;
        check_present("target.epic_group", &self.target.epic_group)?;

        let limits = [
            ("concurrency.entities", self.concurrency.entities),
            ("concurrency.attachments", self.concurrency.attachments),
            ("concurrency.comments", self.concurrency.comments),
            ("concurrency.links", self.concurrency.links),
        ];
        if let Some((field, _)) = limits.iter().find(|(_, limit)| *limit == 0) {
            return Err(ConfigError::invalid(*field, "must be at least 1"));
        }

        if self.users.is_empty() {
            return Err(ConfigError::invalid("users", "no identities are mapped"));
        }
        if let Some(identity) = self.users.keys().find(|identity| identity.trim().is_empty()) {
            return Err(ConfigError::invalid(format!("users.{identity}"), "empty identity"));
        }

        let fields = [
            ("custom_fields.story_point", &self.custom_fields.story_point),
            ("custom_fields.epic_start_date", &self.custom_fields.epic_start_date),
            ("custom_fields.parent_epic", &self.custom_fields.parent_epic),
        ];
        for (field, value) in fields {
            if value.as_deref().is_some_and(|id| id.trim().is_empty()) {
                return Err(ConfigError::invalid(field, "is set but empty"));
            }
        }
        Ok(())
    }

    /// Browse URL of a source issue
    #[must_use]
    pub fn source_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.source.host)
    }

    /// Absolute URL of a file uploaded to the issue project
    #[must_use]
    pub fn upload_url(&self, relative: &str) -> String {
        format!("{}/{}{relative}", self.target.host, self.target.issue_project)
    }
}

fn check_present(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::invalid(field, "must not be empty"))
    } else {
        Ok(())
    }
}

fn check_host(field: &str, host: &str) -> Result<(), ConfigError> {
    check_present(field, host)?;
    let Some((scheme, rest)) = host.split_once("://") else {
        return Err(ConfigError::invalid(field, "must be an http(s) URL"));
    };
    if !matches!(scheme, "http" | "https") || rest.is_empty() {
        return Err(ConfigError::invalid(field, "must be an http(s) URL"));
    }
    Ok(())
}
