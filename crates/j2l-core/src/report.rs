//! Run report

use crate::convert::{ConversionStage, ConvertedEntity};
use crate::error::{ErrorKind, MigrationError};
use crate::links::LinkReport;
use crate::pool::BatchOutcome;
use serde::Serialize;
use std::fmt;

/// One entity whose conversion failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityFailure {
    pub key: String,
    /// Last stage reached before the failure
    pub stage: Option<ConversionStage>,
    pub kind: ErrorKind,
    pub message: String,
}

impl EntityFailure {
    #[must_use]
    pub fn new(key: impl Into<String>, err: &MigrationError) -> Self {
        Self {
            key: key.into(),
            stage: err.stage(),
            kind: err.kind(),
            message: err.root().to_string(),
        }
    }
}

/// Counts for one entity kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub discovered: usize,
    pub created: usize,
    pub closed: usize,
    pub failures: Vec<EntityFailure>,
    /// Keys never started because a sibling failed remotely
    pub cancelled: Vec<String>,
}

impl KindReport {
    pub(crate) fn record(&mut self, outcome: &BatchOutcome<ConvertedEntity>) {
        self.created += outcome.completed.len();
        self.closed += outcome.completed.iter().filter(|(_, c)| c.closed).count();
        self.failures
            .extend(outcome.failed.iter().map(|(key, err)| EntityFailure::new(key, err)));
        self.cancelled.extend(outcome.cancelled.iter().cloned());
        self.failures.sort_by(|a, b| a.key.cmp(&b.key));
        self.cancelled.sort();
    }

    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.cancelled.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MilestoneReport {
    pub created: usize,
    pub reused: usize,
    pub closed: usize,
}

/// Everything a run did, per kind, with every failure attributed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub epics: KindReport,
    pub issues: KindReport,
    pub milestones: MilestoneReport,
    pub links: LinkReport,
    pub skipped_comments: usize,
    pub trailing_attachments: usize,
}

impl MigrationReport {
    /// No entity failed or was cancelled and every link was created or skipped
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.epics.is_clean() && self.issues.is_clean() && self.links.is_clean()
    }

    /// Every entity failure, epics first
    pub fn failures(&self) -> impl Iterator<Item = &EntityFailure> {
        self.epics.failures.iter().chain(&self.issues.failures)
    }
}

fn kind_line(f: &mut fmt::Formatter<'_>, name: &str, kind: &KindReport) -> fmt::Result {
    writeln!(
        f,
        "{name}: {} discovered, {} created, {} closed, {} failed, {} cancelled",
        kind.discovered,
        kind.created,
        kind.closed,
        kind.failures.len(),
        kind.cancelled.len()
    )
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        kind_line(f, "epics", &self.epics)?;
        kind_line(f, "issues", &self.issues)?;
        writeln!(
            f,
            "milestones: {} created, {} reused, {} closed",
            self.milestones.created, self.milestones.reused, self.milestones.closed
        )?;
        writeln!(
            f,
            "links: {} created, {} skipped, {} failed",
            self.links.created,
            self.links.skipped,
            self.links.failed.len()
        )?;
        writeln!(
            f,
            "comments skipped: {}, trailing attachments: {}",
            self.skipped_comments, self.trailing_attachments
        )?;

        for failure in self.failures() {
            let stage = failure.stage.map_or_else(|| "-".to_string(), |s| s.to_string());
            writeln!(f, "  FAILED {} [{}] at {stage}: {}", failure.key, failure.kind, failure.message)?;
        }
        for key in self.epics.cancelled.iter().chain(&self.issues.cancelled) {
            writeln!(f, "  CANCELLED {key}")?;
        }
        for link in &self.links.failed {
            writeln!(
                f,
                "  LINK FAILED {} {} {}: {}",
                link.source_key, link.link_type, link.target_key, link.error
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::LinkFailure;

    #[test]
    fn empty_report_is_success() {
        let report = MigrationReport::default();
        assert!(report.is_success());
        assert!(report.to_string().starts_with("epics: 0 discovered"));
    }

    #[test]
    fn any_failure_fails_the_run() {
        let mut report = MigrationReport::default();
        report.issues.failures.push(EntityFailure::new(
            "PROJ-3",
            &MigrationError::MissingMilestone("1.0".into()).in_entity("PROJ-3", ConversionStage::BodyTranslated),
        ));
        assert!(!report.is_success());
        let text = report.to_string();
        assert!(text.contains("FAILED PROJ-3 [resolution] at body-translated: fix version `1.0` has no milestone"));

        let mut report = MigrationReport::default();
        report.links.failed.push(LinkFailure {
            source_key: "PROJ-1".into(),
            target_key: "PROJ-2".into(),
            link_type: "Causes".into(),
            error: "unmapped".into(),
        });
        assert!(!report.is_success());
    }

    #[test]
    fn serializes_stage_names() {
        let failure = EntityFailure::new(
            "PROJ-1",
            &MigrationError::Cancelled.in_entity("PROJ-1", ConversionStage::AttachmentsResolved),
        );
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["stage"], "attachments-resolved");
        assert_eq!(json["kind"], "cancelled");
    }
}
