//! Link reconciliation
//!
//! Runs after every conversion has finished, against the sealed
//! correlation map, in two phases:
//! 1. parent linking: an issue whose parent is an epic is attached to that
//!    epic; a parent that is another issue becomes a `blocks` link
//! 2. peer linking: typed outward links between entities of the same kind
//!
//! A failed link is reported and never stops the others.

use crate::correlation::{Correlated, SealedCorrelation};
use crate::error::MigrationError;
use crate::pool::BoundedBatch;
use j2l_model::{EntityKind, IssueUpdate, LinkType, TargetEntity, TargetTracker};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Map a source link type name to its target link type
///
/// Only the outward direction is considered; the counterpart entity owns
/// the inward end.
#[must_use]
pub fn map_link_type(name: &str) -> Option<LinkType> {
    match name {
        "Blocks" => Some(LinkType::Blocks),
        "Relates" | "Duplicate" | "Cloners" => Some(LinkType::RelatesTo),
        _ => None,
    }
}

/// A link that could not be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkFailure {
    pub source_key: String,
    pub target_key: String,
    pub link_type: String,
    pub error: String,
}

/// Outcome of reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub created: usize,
    /// Links whose target was not migrated or is of the other kind
    pub skipped: usize,
    pub failed: Vec<LinkFailure>,
}

impl LinkReport {
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkAction {
    AttachToEpic,
    Issue(LinkType),
    Epic(LinkType),
}

impl LinkAction {
    fn label(self) -> &'static str {
        match self {
            Self::AttachToEpic => "epic",
            Self::Issue(link_type) | Self::Epic(link_type) => link_type.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
struct PlannedLink {
    source_key: String,
    target_key: String,
    from: TargetEntity,
    to: TargetEntity,
    action: LinkAction,
}

impl PlannedLink {
    fn new(from: &Correlated, to: &Correlated, action: LinkAction) -> Self {
        Self {
            source_key: from.source.key.clone(),
            target_key: to.source.key.clone(),
            from: from.target.clone(),
            to: to.target.clone(),
            action,
        }
    }

    fn key(&self) -> String {
        format!("{} {} {}", self.source_key, self.action.label(), self.target_key)
    }
}

/// Creates parent and peer links on the target
pub struct LinkReconciler<'a> {
    target: &'a dyn TargetTracker,
    parent_field: Option<&'a str>,
    limit: usize,
}

impl<'a> LinkReconciler<'a> {
    #[must_use]
    pub fn new(target: &'a dyn TargetTracker, parent_field: Option<&'a str>, limit: usize) -> Self {
        Self {
            target,
            parent_field,
            limit,
        }
    }

    /// Reconcile every relationship recorded in `correlation`
    pub async fn reconcile(&self, correlation: &SealedCorrelation) -> LinkReport {
        let mut report = LinkReport::default();
        let mut seen = BTreeSet::new();

        let parents = self.plan_parents(correlation, &mut report);
        self.create_all(parents, &mut seen, &mut report).await;

        let peers = self.plan_peers(correlation, &mut report);
        self.create_all(peers, &mut seen, &mut report).await;

        tracing::info!(
            created = report.created,
            skipped = report.skipped,
            failed = report.failed.len(),
            "links reconciled"
        );
        report
    }

    fn parent_key<'c>(&self, entry: &'c Correlated) -> Option<&'c str> {
        entry.source.parent.as_deref().or_else(|| {
            self.parent_field
                .and_then(|field| entry.source.custom_field(field))
                .and_then(serde_json::Value::as_str)
        })
    }

    fn plan_parents(&self, correlation: &SealedCorrelation, report: &mut LinkReport) -> Vec<PlannedLink> {
        let mut planned = Vec::new();
        for child in correlation.iter().filter(|c| c.source.kind == EntityKind::Issue) {
            let Some(parent_key) = self.parent_key(child) else {
                continue;
            };
            match correlation.find(parent_key) {
                Some(parent) if parent.source.kind == EntityKind::Epic => {
                    planned.push(PlannedLink::new(child, parent, LinkAction::AttachToEpic));
                }
                Some(parent) => {
                    planned.push(PlannedLink::new(child, parent, LinkAction::Issue(LinkType::Blocks)));
                }
                None => {
                    tracing::warn!(key = %child.source.key, parent = parent_key, "parent was not migrated, skipping");
                    report.skipped += 1;
                }
            }
        }
        planned
    }

    fn plan_peers(&self, correlation: &SealedCorrelation, report: &mut LinkReport) -> Vec<PlannedLink> {
        let mut planned = Vec::new();
        for from in correlation.iter() {
            for link in &from.source.links {
                let Some(to) = correlation.get(from.source.kind, &link.outward_key) else {
                    let reason = if correlation.find(&link.outward_key).is_some() {
                        "cross-kind link"
                    } else {
                        "target was not migrated"
                    };
                    tracing::warn!(key = %from.source.key, to = %link.outward_key, reason, "skipping link");
                    report.skipped += 1;
                    continue;
                };
                let Some(link_type) = map_link_type(&link.link_type) else {
                    report.failed.push(LinkFailure {
                        source_key: from.source.key.clone(),
                        target_key: link.outward_key.clone(),
                        link_type: link.link_type.clone(),
                        error: format!("unmapped link type `{}`", link.link_type),
                    });
                    continue;
                };
                let action = match from.source.kind {
                    EntityKind::Epic => LinkAction::Epic(link_type),
                    EntityKind::Issue => LinkAction::Issue(link_type),
                };
                planned.push(PlannedLink::new(from, to, action));
            }
        }
        planned
    }

    /// Create `planned`, skipping any link already planned in this run
    async fn create_all(&self, planned: Vec<PlannedLink>, seen: &mut BTreeSet<String>, report: &mut LinkReport) {
        if planned.is_empty() {
            return;
        }
        let mut jobs: BTreeMap<String, PlannedLink> = BTreeMap::new();
        for link in planned {
            let key = link.key();
            if !seen.insert(key.clone()) {
                tracing::debug!(link = %key, "link already planned, skipping");
                report.skipped += 1;
                continue;
            }
            jobs.insert(key, link);
        }
        let batch = BoundedBatch::new(self.limit).without_cancellation();
        let outcome = batch
            .run(jobs.clone().into_iter().collect(), |link| self.create(link))
            .await;

        report.created += outcome.completed.len();
        for (key, err) in outcome.failed {
            let Some(link) = jobs.get(&key) else { continue };
            report.failed.push(LinkFailure {
                source_key: link.source_key.clone(),
                target_key: link.target_key.clone(),
                link_type: link.action.label().to_string(),
                error: err.to_string(),
            });
        }
    }

    async fn create(&self, link: PlannedLink) -> Result<(), MigrationError> {
        tracing::debug!(from = %link.source_key, to = %link.target_key, action = link.action.label(), "creating link");
        let result = match link.action {
            LinkAction::AttachToEpic => {
                let update = IssueUpdate {
                    epic_id: Some(link.to.id),
                    ..IssueUpdate::default()
                };
                self.target.update_issue(&link.from, &update).await
            }
            LinkAction::Issue(link_type) => self.target.create_issue_link(&link.from, &link.to, link_type).await,
            LinkAction::Epic(link_type) => self.target.create_epic_link(&link.from, &link.to, link_type).await,
        };
        result.map_err(|err| MigrationError::remote("create link", err))
    }
}
