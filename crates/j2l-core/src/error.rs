//! Error types for the migration engine
//!
//! Every failure is classified into one of:
//! - Configuration: fatal, raised before any conversion starts
//! - Resolution: scoped to one entity or one text
//! - Remote: scoped to one operation, cancels the containing batch
//! - Conflict: an already-existing shared resource, normally swallowed
//! - Cancelled: skipped because a sibling in the batch failed remotely

use crate::convert::ConversionStage;
use j2l_markup::MarkupError;
use j2l_model::{ContainerRef, TrackerError};
use serde::Serialize;
use std::path::PathBuf;

/// Configuration loading and validation failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Resolution,
    Remote,
    Conflict,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Configuration => "configuration",
            Self::Resolution => "resolution",
            Self::Remote => "remote",
            Self::Conflict => "conflict",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Main migration error type
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A referenced identity has no entry in the configured user table
    #[error("identity `{identity}` ({display_name}) has no target account in the users table")]
    UnmappedIdentity { identity: String, display_name: String },

    /// The mapped target account cannot see the destination container
    #[error("identity `{identity}` maps to user {user_id}, who is not a member of {container}")]
    NotAMember {
        identity: String,
        user_id: u64,
        container: ContainerRef,
    },

    #[error("assignee `{0}` is not in the identity map")]
    UnresolvedAssignee(String),

    #[error("fix version `{0}` has no milestone")]
    MissingMilestone(String),

    #[error(transparent)]
    Markup(#[from] MarkupError),

    #[error("attachment `{filename}`: {source}")]
    Attachment {
        filename: String,
        #[source]
        source: TrackerError,
    },

    #[error("{operation}: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: TrackerError,
    },

    /// Failure of one entity's conversion, with where it stopped
    #[error("{key} failed at stage {stage}: {source}")]
    Entity {
        key: String,
        stage: ConversionStage,
        #[source]
        source: Box<MigrationError>,
    },

    #[error("illegal conversion transition {from} -> {to}")]
    IllegalTransition {
        from: ConversionStage,
        to: ConversionStage,
    },

    #[error("{key}: field `{field}` {reason}")]
    InvalidField {
        key: String,
        field: String,
        reason: String,
    },

    #[error("{0} was already recorded in the correlation map")]
    DuplicateCorrelation(String),

    #[error("cancelled after a sibling failed")]
    Cancelled,
}

impl MigrationError {
    /// Wrap a tracker failure with the operation that produced it
    #[must_use]
    pub fn remote(operation: &'static str, source: TrackerError) -> Self {
        Self::Remote { operation, source }
    }

    #[must_use]
    pub fn in_entity(self, key: impl Into<String>, stage: ConversionStage) -> Self {
        Self::Entity {
            key: key.into(),
            stage,
            source: Box::new(self),
        }
    }

    /// Classify the error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::UnmappedIdentity { .. } => ErrorKind::Configuration,
            Self::NotAMember { .. }
            | Self::UnresolvedAssignee(_)
            | Self::MissingMilestone(_)
            | Self::Markup(_)
            | Self::IllegalTransition { .. }
            | Self::InvalidField { .. }
            | Self::DuplicateCorrelation(_) => ErrorKind::Resolution,
            Self::Attachment { source, .. } | Self::Remote { source, .. } => {
                if source.is_already_exists() {
                    ErrorKind::Conflict
                } else {
                    ErrorKind::Remote
                }
            }
            Self::Entity { source, .. } => source.kind(),
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Remote failures cancel the not-yet-started siblings in their batch
    #[inline]
    #[must_use]
    pub fn cancels_batch(&self) -> bool {
        self.kind() == ErrorKind::Remote
    }

    /// Configuration failures abort the run
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    /// Source key of the owning entity, if attributed
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Entity { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Conversion stage the owning entity had reached
    #[must_use]
    pub fn stage(&self) -> Option<ConversionStage> {
        match self {
            Self::Entity { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, past entity attribution
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Entity { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let transport = TrackerError::transport("create issue", "connection reset");
        assert_eq!(MigrationError::remote("create issue", transport.clone()).kind(), ErrorKind::Remote);
        assert_eq!(
            MigrationError::remote("create label", TrackerError::conflict("create label")).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            MigrationError::Markup(MarkupError::UnresolvedMention("bob".into())).kind(),
            ErrorKind::Resolution
        );
        assert!(MigrationError::UnmappedIdentity {
            identity: "bob".into(),
            display_name: "Bob".into()
        }
        .is_fatal());

        let wrapped = MigrationError::remote("create issue", transport).in_entity("ISSUE-3", ConversionStage::BodyTranslated);
        assert!(wrapped.cancels_batch());
        assert_eq!(wrapped.key(), Some("ISSUE-3"));
        assert_eq!(wrapped.stage(), Some(ConversionStage::BodyTranslated));
        assert!(matches!(wrapped.root(), MigrationError::Remote { operation: "create issue", .. }));
    }

    #[test]
    fn resolution_does_not_cancel() {
        let err = MigrationError::MissingMilestone("1.0".into()).in_entity("ISSUE-1", ConversionStage::BodyTranslated);
        assert!(!err.cancels_batch());
        assert!(!err.is_fatal());
    }
}
