//! In-memory trackers
//!
//! [`SnapshotSource`] serves a source snapshot loaded from JSON.
//! [`MemoryTarget`] records every write so a run can be inspected
//! afterwards (dry runs, tests).

use crate::error::TrackerError;
use crate::source::{EntityKind, SourceIssue, SourceProject, SourceUser};
use crate::target::{
    ContainerRef, HostedFile, IssueUpdate, Label, LinkType, Milestone, NewEpic, NewIssue,
    NewLabel, NewMilestone, NewNote, TargetEntity, TargetUser,
};
use crate::tracker::{SearchPage, SearchRequest, SourceTracker, TargetTracker};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A complete source export: one project, its issues and attachment contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub project: SourceProject,
    #[serde(default)]
    pub issues: Vec<SourceIssue>,
    /// Attachment id -> content
    #[serde(default)]
    pub attachments: BTreeMap<String, String>,
    #[serde(default)]
    pub users: Vec<SourceUser>,
}

/// Source tracker backed by a [`SourceSnapshot`]
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    snapshot: SourceSnapshot,
}

impl SnapshotSource {
    #[must_use]
    pub fn new(snapshot: SourceSnapshot) -> Self {
        Self { snapshot }
    }

    #[must_use]
    pub fn snapshot(&self) -> &SourceSnapshot {
        &self.snapshot
    }
}

#[async_trait::async_trait]
impl SourceTracker for SnapshotSource {
    async fn search_issues(&self, request: &SearchRequest) -> Result<SearchPage, TrackerError> {
        if request.filter.is_some() {
            tracing::debug!(query = %request.query(), "snapshot source ignores the free-form filter");
        }
        let prefix = format!("{}-", request.project);
        let matching: Vec<&SourceIssue> = self
            .snapshot
            .issues
            .iter()
            .filter(|issue| issue.key.starts_with(&prefix) && request.kind.accepts(issue.kind))
            .collect();

        let issues = matching
            .iter()
            .skip(request.start_at)
            .take(request.max_results)
            .map(|issue| (*issue).clone())
            .collect();

        Ok(SearchPage {
            issues,
            start_at: request.start_at,
            total: matching.len(),
        })
    }

    async fn get_project(&self, key: &str) -> Result<SourceProject, TrackerError> {
        if self.snapshot.project.key == key {
            Ok(self.snapshot.project.clone())
        } else {
            Err(TrackerError::not_found(format!("get project {key}")))
        }
    }

    async fn download_attachment(&self, id: &str) -> Result<Vec<u8>, TrackerError> {
        self.snapshot
            .attachments
            .get(id)
            .map(|content| content.as_bytes().to_vec())
            .ok_or_else(|| TrackerError::not_found(format!("download attachment {id}")))
    }

    async fn get_user(&self, identity: &str) -> Result<SourceUser, TrackerError> {
        self.snapshot
            .users
            .iter()
            .find(|user| user.identity == identity)
            .cloned()
            .ok_or_else(|| TrackerError::not_found(format!("get user {identity}")))
    }
}

/// An epic or issue as recorded by [`MemoryTarget`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEntity {
    pub entity: TargetEntity,
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    pub assignee_ids: Vec<u64>,
    pub milestone_id: Option<u64>,
    pub weight: Option<u64>,
    pub epic_id: Option<u64>,
    pub closed: bool,
}

/// A note as recorded by [`MemoryTarget`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedNote {
    pub entity: TargetEntity,
    pub body: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// A link as recorded by [`MemoryTarget`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedLink {
    pub kind: EntityKind,
    pub from_iid: u64,
    pub to_iid: u64,
    pub link_type: LinkType,
}

#[derive(Debug, Default)]
struct TargetState {
    next_id: u64,
    entities: Vec<RecordedEntity>,
    notes: Vec<RecordedNote>,
    labels: BTreeMap<(String, String), Label>,
    milestones: Vec<(String, Milestone)>,
    uploads: Vec<(String, String, usize)>,
    links: Vec<RecordedLink>,
    members: Vec<TargetUser>,
    users: HashMap<u64, TargetUser>,
    descriptions: BTreeMap<String, String>,
    calls: BTreeMap<&'static str, usize>,
}

impl TargetState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn count(&mut self, operation: &'static str) {
        *self.calls.entry(operation).or_default() += 1;
    }

    fn next_iid(&self, kind: EntityKind, container: &ContainerRef) -> u64 {
        let existing = self
            .entities
            .iter()
            .filter(|r| r.entity.kind == kind && &r.entity.container == container)
            .count();
        existing as u64 + 1
    }

    fn entity_mut(&mut self, entity: &TargetEntity, operation: &str) -> Result<&mut RecordedEntity, TrackerError> {
        self.entities
            .iter_mut()
            .find(|r| r.entity.kind == entity.kind && r.entity.id == entity.id)
            .ok_or_else(|| TrackerError::not_found(format!("{operation} {}", entity.id)))
    }
}

/// Target tracker that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemoryTarget {
    state: Mutex<TargetState>,
}

impl MemoryTarget {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user that is also a member of every container
    #[must_use]
    pub fn with_member(self, user: TargetUser) -> Self {
        {
            let mut state = self.state.lock();
            state.users.insert(user.id, user.clone());
            state.members.push(user);
        }
        self
    }

    /// Add a user that is not a member
    #[must_use]
    pub fn with_user(self, user: TargetUser) -> Self {
        self.state.lock().users.insert(user.id, user);
        self
    }

    /// Seed an existing project milestone
    #[must_use]
    pub fn with_milestone(self, project: &str, title: &str) -> Self {
        {
            let mut state = self.state.lock();
            let id = state.next_id();
            state.milestones.push((
                project.to_string(),
                Milestone {
                    id,
                    title: title.to_string(),
                    closed: false,
                },
            ));
        }
        self
    }

    /// Snapshot of recorded epics
    #[must_use]
    pub fn epics(&self) -> Vec<RecordedEntity> {
        self.recorded(EntityKind::Epic)
    }

    /// Snapshot of recorded issues
    #[must_use]
    pub fn issues(&self) -> Vec<RecordedEntity> {
        self.recorded(EntityKind::Issue)
    }

    fn recorded(&self, kind: EntityKind) -> Vec<RecordedEntity> {
        self.state
            .lock()
            .entities
            .iter()
            .filter(|r| r.entity.kind == kind)
            .cloned()
            .collect()
    }

    /// Recorded entity of the given kind with the given title
    #[must_use]
    pub fn find(&self, kind: EntityKind, title: &str) -> Option<RecordedEntity> {
        self.state
            .lock()
            .entities
            .iter()
            .find(|r| r.entity.kind == kind && r.title == title)
            .cloned()
    }

    /// Notes on one entity, in posting order
    #[must_use]
    pub fn notes_for(&self, entity: &TargetEntity) -> Vec<RecordedNote> {
        self.state
            .lock()
            .notes
            .iter()
            .filter(|n| n.entity.kind == entity.kind && n.entity.id == entity.id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn notes(&self) -> Vec<RecordedNote> {
        self.state.lock().notes.clone()
    }

    /// All labels as `(container path, name)` pairs
    #[must_use]
    pub fn labels(&self) -> Vec<(String, String)> {
        self.state.lock().labels.keys().cloned().collect()
    }

    #[must_use]
    pub fn milestones(&self) -> Vec<Milestone> {
        self.state
            .lock()
            .milestones
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    #[must_use]
    pub fn links(&self) -> Vec<RecordedLink> {
        self.state.lock().links.clone()
    }

    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.state.lock().uploads.len()
    }

    #[must_use]
    pub fn project_description(&self, project: &str) -> Option<String> {
        self.state.lock().descriptions.get(project).cloned()
    }

    /// How many times an operation was called, e.g. `"get_user"`
    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    fn create_entity(
        &self,
        kind: EntityKind,
        container: ContainerRef,
        title: &str,
        description: &str,
        labels: &[String],
    ) -> RecordedEntity {
        let mut state = self.state.lock();
        let id = state.next_id();
        let iid = state.next_iid(kind, &container);
        let record = RecordedEntity {
            entity: TargetEntity {
                kind,
                id,
                iid,
                web_url: Some(format!("memory://{}/{}/{iid}", container.path(), kind.as_str())),
                container,
            },
            title: title.to_string(),
            description: description.to_string(),
            labels: labels.to_vec(),
            assignee_ids: Vec::new(),
            milestone_id: None,
            weight: None,
            epic_id: None,
            closed: false,
        };
        state.entities.push(record.clone());
        record
    }

    fn get_label(&self, path: &str, name: &str) -> Option<Label> {
        let mut state = self.state.lock();
        state.count("get_label");
        state.labels.get(&(path.to_string(), name.to_string())).cloned()
    }

    fn create_label(&self, path: &str, label: &NewLabel) -> Result<Label, TrackerError> {
        let mut state = self.state.lock();
        state.count("create_label");
        let key = (path.to_string(), label.name.clone());
        if state.labels.contains_key(&key) {
            return Err(TrackerError::conflict(format!("create label {}", label.name)));
        }
        let id = state.next_id();
        let created = Label {
            id,
            name: label.name.clone(),
        };
        state.labels.insert(key, created.clone());
        Ok(created)
    }
}

fn is_image(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    ["png", "jpg", "jpeg", "gif", "svg", "webp", "bmp"]
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

#[async_trait::async_trait]
impl TargetTracker for MemoryTarget {
    async fn create_epic(&self, group: &str, epic: &NewEpic) -> Result<TargetEntity, TrackerError> {
        let record = self.create_entity(
            EntityKind::Epic,
            ContainerRef::Group(group.to_string()),
            &epic.title,
            &epic.description,
            &epic.labels,
        );
        Ok(record.entity)
    }

    async fn close_epic(&self, epic: &TargetEntity) -> Result<(), TrackerError> {
        self.state.lock().entity_mut(epic, "close epic")?.closed = true;
        Ok(())
    }

    async fn create_issue(&self, project: &str, issue: &NewIssue) -> Result<TargetEntity, TrackerError> {
        let record = self.create_entity(
            EntityKind::Issue,
            ContainerRef::Project(project.to_string()),
            &issue.title,
            &issue.description,
            &issue.labels,
        );
        let mut state = self.state.lock();
        let stored = state.entity_mut(&record.entity, "create issue")?;
        stored.assignee_ids.clone_from(&issue.assignee_ids);
        stored.milestone_id = issue.milestone_id;
        stored.weight = issue.weight;
        Ok(record.entity)
    }

    async fn update_issue(&self, issue: &TargetEntity, update: &IssueUpdate) -> Result<(), TrackerError> {
        let mut state = self.state.lock();
        let stored = state.entity_mut(issue, "update issue")?;
        if let Some(epic_id) = update.epic_id {
            stored.epic_id = Some(epic_id);
        }
        if let Some(milestone_id) = update.milestone_id {
            stored.milestone_id = Some(milestone_id);
        }
        Ok(())
    }

    async fn close_issue(&self, issue: &TargetEntity) -> Result<(), TrackerError> {
        self.state.lock().entity_mut(issue, "close issue")?.closed = true;
        Ok(())
    }

    async fn create_note(&self, entity: &TargetEntity, note: &NewNote) -> Result<(), TrackerError> {
        let mut state = self.state.lock();
        state.count("create_note");
        state.notes.push(RecordedNote {
            entity: entity.clone(),
            body: note.body.clone(),
            created_at: note.created_at,
        });
        Ok(())
    }

    async fn get_project_label(&self, project: &str, name: &str) -> Result<Option<Label>, TrackerError> {
        Ok(self.get_label(project, name))
    }

    async fn create_project_label(&self, project: &str, label: &NewLabel) -> Result<Label, TrackerError> {
        self.create_label(project, label)
    }

    async fn get_group_label(&self, group: &str, name: &str) -> Result<Option<Label>, TrackerError> {
        Ok(self.get_label(group, name))
    }

    async fn create_group_label(&self, group: &str, label: &NewLabel) -> Result<Label, TrackerError> {
        self.create_label(group, label)
    }

    async fn find_milestone(&self, project: &str, title: &str) -> Result<Option<Milestone>, TrackerError> {
        let mut state = self.state.lock();
        state.count("find_milestone");
        Ok(state
            .milestones
            .iter()
            .find(|(p, m)| p == project && m.title == title)
            .map(|(_, m)| m.clone()))
    }

    async fn create_milestone(&self, project: &str, milestone: &NewMilestone) -> Result<Milestone, TrackerError> {
        let mut state = self.state.lock();
        state.count("create_milestone");
        if state
            .milestones
            .iter()
            .any(|(p, m)| p == project && m.title == milestone.title)
        {
            return Err(TrackerError::conflict(format!("create milestone {}", milestone.title)));
        }
        let id = state.next_id();
        let created = Milestone {
            id,
            title: milestone.title.clone(),
            closed: false,
        };
        state.milestones.push((project.to_string(), created.clone()));
        Ok(created)
    }

    async fn close_milestone(&self, project: &str, milestone_id: u64) -> Result<(), TrackerError> {
        let mut state = self.state.lock();
        let (_, milestone) = state
            .milestones
            .iter_mut()
            .find(|(p, m)| p == project && m.id == milestone_id)
            .ok_or_else(|| TrackerError::not_found(format!("close milestone {milestone_id}")))?;
        milestone.closed = true;
        Ok(())
    }

    async fn upload_file(&self, project: &str, filename: &str, content: Vec<u8>) -> Result<HostedFile, TrackerError> {
        let mut state = self.state.lock();
        state.count("upload_file");
        let secret = state.next_id();
        state
            .uploads
            .push((project.to_string(), filename.to_string(), content.len()));
        let url = format!("/uploads/{secret:08x}/{filename}");
        let markdown = if is_image(filename) {
            format!("![{filename}]({url})")
        } else {
            format!("[{filename}]({url})")
        };
        Ok(HostedFile {
            alt: filename.to_string(),
            url,
            markdown,
        })
    }

    async fn create_issue_link(
        &self,
        issue: &TargetEntity,
        target: &TargetEntity,
        link_type: LinkType,
    ) -> Result<(), TrackerError> {
        self.state.lock().links.push(RecordedLink {
            kind: EntityKind::Issue,
            from_iid: issue.iid,
            to_iid: target.iid,
            link_type,
        });
        Ok(())
    }

    async fn create_epic_link(
        &self,
        epic: &TargetEntity,
        target: &TargetEntity,
        link_type: LinkType,
    ) -> Result<(), TrackerError> {
        self.state.lock().links.push(RecordedLink {
            kind: EntityKind::Epic,
            from_iid: epic.iid,
            to_iid: target.iid,
            link_type,
        });
        Ok(())
    }

    async fn list_members(&self, _container: &ContainerRef) -> Result<Vec<TargetUser>, TrackerError> {
        let mut state = self.state.lock();
        state.count("list_members");
        Ok(state.members.clone())
    }

    async fn get_user(&self, id: u64) -> Result<TargetUser, TrackerError> {
        let mut state = self.state.lock();
        state.count("get_user");
        state
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| TrackerError::not_found(format!("get user {id}")))
    }

    async fn edit_project_description(&self, project: &str, description: &str) -> Result<(), TrackerError> {
        self.state
            .lock()
            .descriptions
            .insert(project.to_string(), description.to_string());
        Ok(())
    }
}
