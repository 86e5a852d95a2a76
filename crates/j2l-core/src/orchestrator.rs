//! Migration orchestrator
//!
//! Drives one run end to end:
//! 1. copy the project description, discover epics and issues
//! 2. build the identity map and provision milestones (fatal on failure)
//! 3. convert epics, then issues, each as a bounded batch
//! 4. record every conversion in the correlation map, then seal it
//! 5. reconcile parent and peer links
//! 6. close the milestones created from completed versions

use crate::config::MigrationConfig;
use crate::convert::{ConvertedEntity, EntityConverter};
use crate::correlation::CorrelationMap;
use crate::discover::discover;
use crate::error::MigrationError;
use crate::identity::IdentityResolver;
use crate::links::LinkReconciler;
use crate::pool::{BatchOutcome, BoundedBatch};
use crate::provision::{MilestoneOrigin, Provisioner};
use crate::report::{EntityFailure, KindReport, MigrationReport};
use j2l_model::{KindFilter, SourceIssue, SourceTracker, TargetTracker};
use std::collections::HashMap;
use std::sync::Arc;

/// One migration run with its injected collaborators
pub struct Migration {
    config: MigrationConfig,
    source: Arc<dyn SourceTracker>,
    target: Arc<dyn TargetTracker>,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("project", &self.config.source.project)
            .field("issue_project", &self.config.target.issue_project)
            .finish_non_exhaustive()
    }
}

impl Migration {
    #[must_use]
    pub fn new(config: MigrationConfig, source: Arc<dyn SourceTracker>, target: Arc<dyn TargetTracker>) -> Self {
        Self { config, source, target }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Run the migration
    ///
    /// Entity and link failures are collected into the report. Only
    /// failures that happen before any conversion (configuration, identity
    /// resolution, discovery, milestone provisioning) or while closing
    /// milestones are returned as errors.
    ///
    /// # Errors
    /// The first run-level failure.
    #[tracing::instrument(skip_all, fields(project = %self.config.source.project))]
    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        let config = &self.config;
        config.validate()?;
        let source = self.source.as_ref();
        let target = self.target.as_ref();

        let project = source
            .get_project(&config.source.project)
            .await
            .map_err(|err| MigrationError::remote("get project", err))?;
        if let Some(description) = project.description.as_deref().filter(|d| !d.trim().is_empty()) {
            target
                .edit_project_description(&config.target.issue_project, description)
                .await
                .map_err(|err| MigrationError::remote("edit project description", err))?;
        }

        let query = config.source.query.as_deref();
        let epics = discover(source, &config.source.project, KindFilter::EpicsOnly, query).await?;
        let issues = discover(source, &config.source.project, KindFilter::ExcludeEpics, query).await?;

        let identities = IdentityResolver::new(config, source, target)
            .build(epics.iter().chain(&issues))
            .await?;

        let provisioner = Provisioner::new(Arc::clone(&self.target), config.target.issue_project.clone());
        let milestones = provisioner.provision_milestones(&project.versions).await?;

        let mut report = MigrationReport::default();
        report.milestones.created = milestones.count(MilestoneOrigin::Created);
        report.milestones.reused = milestones.count(MilestoneOrigin::Reused);

        let converter = EntityConverter::new(config, source, target, &identities, &provisioner, &milestones);
        let correlation = CorrelationMap::new();
        let batch = BoundedBatch::new(config.concurrency.entities);

        for (kind, entities) in [(&mut report.epics, epics), (&mut report.issues, issues)] {
            kind.discovered = entities.len();
            let sources: HashMap<String, Arc<SourceIssue>> = entities
                .into_iter()
                .map(|issue| (issue.key.clone(), Arc::new(issue)))
                .collect();
            let mut jobs: Vec<(String, Arc<SourceIssue>)> =
                sources.iter().map(|(key, issue)| (key.clone(), Arc::clone(issue))).collect();
            jobs.sort_by(|a, b| a.0.cmp(&b.0));

            let converter = &converter;
            let outcome = batch
                .run(jobs, |issue| async move { converter.convert(&issue).await })
                .await;

            record_outcome(&correlation, &sources, &outcome, kind);
            report.skipped_comments += outcome.completed.iter().map(|(_, c)| c.skipped_comments).sum::<usize>();
            report.trailing_attachments += outcome.completed.iter().map(|(_, c)| c.trailing_attachments).sum::<usize>();
        }

        let correlation = correlation.seal();
        report.links = LinkReconciler::new(target, config.custom_fields.parent_epic.as_deref(), config.concurrency.links)
            .reconcile(&correlation)
            .await;

        report.milestones.closed = provisioner.close_completed(&milestones).await?;

        tracing::info!(success = report.is_success(), "migration finished");
        Ok(report)
    }
}

/// Serialized correlation writes for one finished batch
fn record_outcome(
    correlation: &CorrelationMap,
    sources: &HashMap<String, Arc<SourceIssue>>,
    outcome: &BatchOutcome<ConvertedEntity>,
    kind: &mut KindReport,
) {
    kind.record(outcome);
    for (key, converted) in &outcome.completed {
        let Some(issue) = sources.get(key) else { continue };
        if let Err(err) = correlation.record(Arc::clone(issue), converted.target.clone()) {
            kind.failures.push(EntityFailure::new(key, &err));
        }
    }
}
