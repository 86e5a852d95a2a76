//! Testing utilities for the j2lab workspace
//!
//! Shared fixtures: source entity builders, a sample configuration and a
//! target wrapper that injects failures.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use j2l_core::MigrationConfig;
use j2l_model::{
    ContainerRef, EntityKind, HostedFile, IssueUpdate, Label, LinkType, MemoryTarget, Milestone, NewEpic, NewIssue,
    NewLabel, NewMilestone, NewNote, RichText, SourceAttachment, SourceComment, SourceIssue, SourceLink,
    SourceProject, SourceSnapshot, SourceUser, SourceVersion, TargetEntity, TargetTracker, TargetUser, TrackerError,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SOURCE_HOST: &str = "https://jira.example.com";
pub const TARGET_HOST: &str = "https://gitlab.example.com";
pub const ISSUE_PROJECT: &str = "grp/proj";
pub const EPIC_GROUP: &str = "grp";
pub const PARENT_EPIC_FIELD: &str = "customfield_10014";
pub const STORY_POINT_FIELD: &str = "customfield_10016";
pub const EPIC_START_FIELD: &str = "customfield_10015";

/// Config mapping `alice` to 42 and `bob` to 7
pub fn sample_config() -> MigrationConfig {
    config_with(&[("alice", 42), ("bob", 7)], "")
}

/// Config with the given users table and extra YAML appended
pub fn config_with(users: &[(&str, u64)], extra: &str) -> MigrationConfig {
    let table: String = users.iter().map(|(identity, id)| format!("  {identity}: {id}\n")).collect();
    MigrationConfig::from_yaml_str(&format!(
        "source:\n  host: {SOURCE_HOST}\n  project: PROJ\n\
         target:\n  host: {TARGET_HOST}\n  issue_project: {ISSUE_PROJECT}\n  epic_group: {EPIC_GROUP}\n\
         custom_fields:\n  story_point: {STORY_POINT_FIELD}\n  epic_start_date: {EPIC_START_FIELD}\n  parent_epic: {PARENT_EPIC_FIELD}\n\
         users:\n{table}{extra}"
    ))
    .expect("sample config is valid")
}

/// Memory target whose members match [`sample_config`]
pub fn sample_target() -> MemoryTarget {
    MemoryTarget::new()
        .with_member(TargetUser::new(42, "alice.target"))
        .with_member(TargetUser::new(7, "bob.target"))
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 9, day, hour, 0, 0).unwrap()
}

pub fn user(identity: &str) -> SourceUser {
    SourceUser::new(identity, format!("{identity} Display"))
}

pub fn issue(key: &str, title: &str) -> SourceIssue {
    let mut issue = SourceIssue::new(key, EntityKind::Issue, title);
    issue.created_at = Some(at(1, 9));
    issue
}

pub fn epic(key: &str, title: &str) -> SourceIssue {
    let mut epic = SourceIssue::new(key, EntityKind::Epic, title);
    epic.created_at = Some(at(1, 8));
    epic
}

pub fn with_body(mut issue: SourceIssue, wiki: &str) -> SourceIssue {
    issue.body = RichText::wiki(wiki);
    issue
}

pub fn with_parent(mut issue: SourceIssue, parent: &str) -> SourceIssue {
    issue.parent = Some(parent.to_string());
    issue
}

pub fn with_link(mut issue: SourceIssue, link_type: &str, outward_key: &str) -> SourceIssue {
    issue.links.push(SourceLink {
        link_type: link_type.to_string(),
        outward_key: outward_key.to_string(),
    });
    issue
}

pub fn comment(id: &str, author: &str, wiki: &str) -> SourceComment {
    SourceComment {
        id: id.to_string(),
        author: user(author),
        body: RichText::wiki(wiki),
        created_at: at(2, 10),
    }
}

pub fn attachment(id: &str, filename: &str, hour: u32) -> SourceAttachment {
    SourceAttachment {
        id: id.to_string(),
        filename: filename.to_string(),
        created_at: at(3, hour),
        mime_type: None,
    }
}

pub fn project(versions: Vec<SourceVersion>) -> SourceProject {
    SourceProject {
        key: "PROJ".into(),
        name: "Project".into(),
        description: Some("Migrated project".into()),
        versions,
    }
}

/// Snapshot whose attachment contents are `bytes of <id>`
pub fn snapshot(issues: Vec<SourceIssue>, versions: Vec<SourceVersion>) -> SourceSnapshot {
    let attachments: BTreeMap<String, String> = issues
        .iter()
        .flat_map(|issue| issue.attachments.iter())
        .map(|a| (a.id.clone(), format!("bytes of {}", a.id)))
        .collect();
    let users = issues
        .iter()
        .flat_map(|issue| issue.assignee.iter().chain(issue.reporter.iter()))
        .cloned()
        .collect();
    SourceSnapshot {
        project: project(versions),
        issues,
        attachments,
        users,
    }
}

/// One injected failure
#[derive(Debug, Clone)]
struct Fault {
    operation: &'static str,
    /// Only calls whose title or body contains this
    matching: Option<String>,
    error: TrackerError,
}

/// Memory target that fails selected calls
#[derive(Debug)]
pub struct FaultyTarget {
    inner: MemoryTarget,
    faults: Mutex<Vec<Fault>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FaultyTarget {
    pub fn new(inner: MemoryTarget) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            latency: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail every call of `operation`, e.g. `"create_note"`
    #[must_use]
    pub fn failing(self, operation: &'static str, error: TrackerError) -> Self {
        self.faults.lock().push(Fault {
            operation,
            matching: None,
            error,
        });
        self
    }

    /// Fail calls of `operation` whose title or body contains `text`
    #[must_use]
    pub fn failing_matching(self, operation: &'static str, text: &str, error: TrackerError) -> Self {
        self.faults.lock().push(Fault {
            operation,
            matching: Some(text.to_string()),
            error,
        });
        self
    }

    /// Delay every entity creation
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn inner(&self) -> &MemoryTarget {
        &self.inner
    }

    /// Most entity creations observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &'static str, text: &str) -> Result<(), TrackerError> {
        let faults = self.faults.lock();
        let hit = faults
            .iter()
            .find(|f| f.operation == operation && f.matching.as_deref().map_or(true, |m| text.contains(m)));
        match hit {
            Some(fault) => Err(fault.error.clone()),
            None => Ok(()),
        }
    }

    async fn creating<T, F>(&self, operation: &'static str, title: &str, create: F) -> Result<T, TrackerError>
    where
        F: std::future::Future<Output = Result<T, TrackerError>>,
    {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let result = match self.check(operation, title) {
            Ok(()) => create.await,
            Err(err) => Err(err),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl TargetTracker for FaultyTarget {
    async fn create_epic(&self, group: &str, epic: &NewEpic) -> Result<TargetEntity, TrackerError> {
        self.creating("create_epic", &epic.title, self.inner.create_epic(group, epic))
            .await
    }

    async fn close_epic(&self, epic: &TargetEntity) -> Result<(), TrackerError> {
        self.check("close_epic", "")?;
        self.inner.close_epic(epic).await
    }

    async fn create_issue(&self, project: &str, issue: &NewIssue) -> Result<TargetEntity, TrackerError> {
        self.creating("create_issue", &issue.title, self.inner.create_issue(project, issue))
            .await
    }

    async fn update_issue(&self, issue: &TargetEntity, update: &IssueUpdate) -> Result<(), TrackerError> {
        self.check("update_issue", "")?;
        self.inner.update_issue(issue, update).await
    }

    async fn close_issue(&self, issue: &TargetEntity) -> Result<(), TrackerError> {
        self.check("close_issue", "")?;
        self.inner.close_issue(issue).await
    }

    async fn create_note(&self, entity: &TargetEntity, note: &NewNote) -> Result<(), TrackerError> {
        self.check("create_note", &note.body)?;
        self.inner.create_note(entity, note).await
    }

    async fn get_project_label(&self, project: &str, name: &str) -> Result<Option<Label>, TrackerError> {
        self.check("get_label", name)?;
        self.inner.get_project_label(project, name).await
    }

    async fn create_project_label(&self, project: &str, label: &NewLabel) -> Result<Label, TrackerError> {
        self.check("create_label", &label.name)?;
        self.inner.create_project_label(project, label).await
    }

    async fn get_group_label(&self, group: &str, name: &str) -> Result<Option<Label>, TrackerError> {
        self.check("get_label", name)?;
        self.inner.get_group_label(group, name).await
    }

    async fn create_group_label(&self, group: &str, label: &NewLabel) -> Result<Label, TrackerError> {
        self.check("create_label", &label.name)?;
        self.inner.create_group_label(group, label).await
    }

    async fn find_milestone(&self, project: &str, title: &str) -> Result<Option<Milestone>, TrackerError> {
        self.check("find_milestone", title)?;
        self.inner.find_milestone(project, title).await
    }

    async fn create_milestone(&self, project: &str, milestone: &NewMilestone) -> Result<Milestone, TrackerError> {
        self.check("create_milestone", &milestone.title)?;
        self.inner.create_milestone(project, milestone).await
    }

    async fn close_milestone(&self, project: &str, milestone_id: u64) -> Result<(), TrackerError> {
        self.check("close_milestone", "")?;
        self.inner.close_milestone(project, milestone_id).await
    }

    async fn upload_file(&self, project: &str, filename: &str, content: Vec<u8>) -> Result<HostedFile, TrackerError> {
        self.check("upload_file", filename)?;
        self.inner.upload_file(project, filename, content).await
    }

    async fn create_issue_link(
        &self,
        issue: &TargetEntity,
        target: &TargetEntity,
        link_type: LinkType,
    ) -> Result<(), TrackerError> {
        self.check("create_issue_link", link_type.as_str())?;
        self.inner.create_issue_link(issue, target, link_type).await
    }

    async fn create_epic_link(
        &self,
        epic: &TargetEntity,
        target: &TargetEntity,
        link_type: LinkType,
    ) -> Result<(), TrackerError> {
        self.check("create_epic_link", link_type.as_str())?;
        self.inner.create_epic_link(epic, target, link_type).await
    }

    async fn list_members(&self, container: &ContainerRef) -> Result<Vec<TargetUser>, TrackerError> {
        self.check("list_members", container.path())?;
        self.inner.list_members(container).await
    }

    async fn get_user(&self, id: u64) -> Result<TargetUser, TrackerError> {
        self.check("get_user", "")?;
        self.inner.get_user(id).await
    }

    async fn edit_project_description(&self, project: &str, description: &str) -> Result<(), TrackerError> {
        self.check("edit_project_description", description)?;
        self.inner.edit_project_description(project, description).await
    }
}

/// Shareable handles for one test run
pub fn shared(target: FaultyTarget) -> (Arc<FaultyTarget>, Arc<dyn TargetTracker>) {
    let target = Arc::new(target);
    let dynamic: Arc<dyn TargetTracker> = target.clone();
    (target, dynamic)
}

/// A JSON copy of a snapshot, as the command line reads it
pub fn snapshot_json(snapshot: &SourceSnapshot) -> String {
    serde_json::to_string_pretty(snapshot).expect("snapshot serializes")
}
