//! Source tracker snapshots
//!
//! Everything here is fetched once at discovery time and never mutated
//! afterwards. Field names follow the JSON snapshot format read by the CLI.

use crate::document::RichText;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which kind of target entity a source issue becomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Top-level grouping entity, lives in the epic group
    Epic,
    /// Unit of work, lives in the issue project
    Issue,
}

impl EntityKind {
    /// Lower-case name used in logs and reports
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Issue => "issue",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named field value with its optional description (type, status, priority, component)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl FieldValue {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A source account reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    /// Stable identity (account name or account id)
    pub identity: String,
    #[serde(default)]
    pub display_name: String,
}

impl SourceUser {
    #[must_use]
    pub fn new(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
        }
    }
}

/// One comment on a source issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceComment {
    pub id: String,
    pub author: SourceUser,
    pub body: RichText,
    pub created_at: DateTime<Utc>,
}

/// One file attached to a source issue
///
/// `filename` is unique within one issue and is how inline markup refers to
/// the attachment. The binary content is fetched separately by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttachment {
    pub id: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// A typed outward link to another source issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    /// Source link type name, e.g. `Blocks` or `Relates`
    pub link_type: String,
    /// Key of the issue on the outward end
    pub outward_key: String,
}

/// A source issue or epic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceIssue {
    pub key: String,
    pub kind: EntityKind,
    pub title: String,
    #[serde(default)]
    pub body: RichText,
    #[serde(default)]
    pub comments: Vec<SourceComment>,
    #[serde(default)]
    pub attachments: Vec<SourceAttachment>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub components: Vec<FieldValue>,
    #[serde(default)]
    pub issue_type: Option<FieldValue>,
    #[serde(default)]
    pub status: Option<FieldValue>,
    #[serde(default)]
    pub priority: Option<FieldValue>,
    #[serde(default)]
    pub assignee: Option<SourceUser>,
    #[serde(default)]
    pub reporter: Option<SourceUser>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Names of the versions this issue is fixed in
    #[serde(default)]
    pub fix_versions: Vec<String>,
    /// Key of the parent issue or epic
    #[serde(default)]
    pub parent: Option<String>,
    /// Raw custom field values keyed by field id
    #[serde(default)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub links: Vec<SourceLink>,
    /// Whether the issue carries a resolution
    #[serde(default)]
    pub resolved: bool,
}

impl SourceIssue {
    /// Create a bare issue with only identity fields set
    #[must_use]
    pub fn new(key: impl Into<String>, kind: EntityKind, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind,
            title: title.into(),
            body: RichText::default(),
            comments: Vec::new(),
            attachments: Vec::new(),
            labels: Vec::new(),
            components: Vec::new(),
            issue_type: None,
            status: None,
            priority: None,
            assignee: None,
            reporter: None,
            created_at: None,
            due_date: None,
            fix_versions: Vec::new(),
            parent: None,
            custom_fields: BTreeMap::new(),
            links: Vec::new(),
            resolved: false,
        }
    }

    /// Custom field value by id, if present and not null
    #[must_use]
    pub fn custom_field(&self, id: &str) -> Option<&serde_json::Value> {
        self.custom_fields.get(id).filter(|v| !v.is_null())
    }
}

/// A source release version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceVersion {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub released: bool,
}

impl SourceVersion {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            start_date: None,
            release_date: None,
            archived: false,
            released: false,
        }
    }

    /// Archived or released versions are complete
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.archived || self.released
    }
}

/// A source project with its versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProject {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub versions: Vec<SourceVersion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_deserializes_with_defaults() {
        let json = r#"{"key": "PROJ-1", "kind": "issue", "title": "Fix it"}"#;
        let issue: SourceIssue = serde_json::from_str(json).unwrap();

        assert_eq!(issue.key, "PROJ-1");
        assert_eq!(issue.kind, EntityKind::Issue);
        assert!(issue.comments.is_empty());
        assert!(!issue.resolved);
        assert_eq!(issue.body, RichText::default());
    }

    #[test]
    fn null_custom_field_is_absent() {
        let mut issue = SourceIssue::new("PROJ-1", EntityKind::Issue, "t");
        issue
            .custom_fields
            .insert("customfield_1".into(), serde_json::Value::Null);
        issue
            .custom_fields
            .insert("customfield_2".into(), serde_json::json!(3.5));

        assert!(issue.custom_field("customfield_1").is_none());
        assert_eq!(issue.custom_field("customfield_2"), Some(&serde_json::json!(3.5)));
    }

    #[test]
    fn version_completion() {
        let mut v = SourceVersion::new("1.0");
        assert!(!v.is_complete());
        v.archived = true;
        assert!(v.is_complete());
        v.archived = false;
        v.released = true;
        assert!(v.is_complete());
    }
}
