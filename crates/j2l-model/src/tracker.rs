//! Tracker client seams
//!
//! The migration engine only talks to the two trackers through these traits.
//! Transport, authentication and pagination tokens are the implementor's
//! concern; every operation returns a result or a typed [`TrackerError`].

use crate::error::TrackerError;
use crate::source::{EntityKind, SourceIssue, SourceProject, SourceUser};
use crate::target::{
    ContainerRef, HostedFile, IssueUpdate, Label, LinkType, Milestone, NewEpic, NewIssue,
    NewLabel, NewMilestone, NewNote, TargetEntity, TargetUser,
};

/// Which kinds a search should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    EpicsOnly,
    ExcludeEpics,
}

impl KindFilter {
    #[must_use]
    pub fn accepts(self, kind: EntityKind) -> bool {
        match self {
            Self::EpicsOnly => kind == EntityKind::Epic,
            Self::ExcludeEpics => kind != EntityKind::Epic,
        }
    }
}

/// One page of an issue search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub project: String,
    pub kind: KindFilter,
    /// Additional user filter, combined with the project and kind clauses
    pub filter: Option<String>,
    pub start_at: usize,
    pub max_results: usize,
}

impl SearchRequest {
    /// Render the request as a query-language string
    #[must_use]
    pub fn query(&self) -> String {
        let kind = match self.kind {
            KindFilter::EpicsOnly => "type = Epic",
            KindFilter::ExcludeEpics => "type != Epic",
        };
        let scope = format!("project = {} AND {kind} ORDER BY key ASC", self.project);
        match self.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            Some(filter) => format!("({filter}) AND {scope}"),
            None => scope,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub issues: Vec<SourceIssue>,
    pub start_at: usize,
    pub total: usize,
}

/// Read-only access to the source tracker
#[async_trait::async_trait]
pub trait SourceTracker: Send + Sync {
    /// Paginated issue search
    async fn search_issues(&self, request: &SearchRequest) -> Result<SearchPage, TrackerError>;

    /// Project metadata including versions
    async fn get_project(&self, key: &str) -> Result<SourceProject, TrackerError>;

    /// Binary content of an attachment
    async fn download_attachment(&self, id: &str) -> Result<Vec<u8>, TrackerError>;

    /// Account details for an identity
    async fn get_user(&self, identity: &str) -> Result<SourceUser, TrackerError>;
}

/// Write access to the target tracker
#[async_trait::async_trait]
pub trait TargetTracker: Send + Sync {
    async fn create_epic(&self, group: &str, epic: &NewEpic) -> Result<TargetEntity, TrackerError>;

    async fn close_epic(&self, epic: &TargetEntity) -> Result<(), TrackerError>;

    async fn create_issue(&self, project: &str, issue: &NewIssue) -> Result<TargetEntity, TrackerError>;

    async fn update_issue(&self, issue: &TargetEntity, update: &IssueUpdate) -> Result<(), TrackerError>;

    async fn close_issue(&self, issue: &TargetEntity) -> Result<(), TrackerError>;

    /// Comment on an epic or issue
    async fn create_note(&self, entity: &TargetEntity, note: &NewNote) -> Result<(), TrackerError>;

    async fn get_project_label(&self, project: &str, name: &str) -> Result<Option<Label>, TrackerError>;

    async fn create_project_label(&self, project: &str, label: &NewLabel) -> Result<Label, TrackerError>;

    async fn get_group_label(&self, group: &str, name: &str) -> Result<Option<Label>, TrackerError>;

    async fn create_group_label(&self, group: &str, label: &NewLabel) -> Result<Label, TrackerError>;

    async fn find_milestone(&self, project: &str, title: &str) -> Result<Option<Milestone>, TrackerError>;

    async fn create_milestone(&self, project: &str, milestone: &NewMilestone) -> Result<Milestone, TrackerError>;

    async fn close_milestone(&self, project: &str, milestone_id: u64) -> Result<(), TrackerError>;

    async fn upload_file(&self, project: &str, filename: &str, content: Vec<u8>) -> Result<HostedFile, TrackerError>;

    async fn create_issue_link(
        &self,
        issue: &TargetEntity,
        target: &TargetEntity,
        link_type: LinkType,
    ) -> Result<(), TrackerError>;

    async fn create_epic_link(
        &self,
        epic: &TargetEntity,
        target: &TargetEntity,
        link_type: LinkType,
    ) -> Result<(), TrackerError>;

    async fn list_members(&self, container: &ContainerRef) -> Result<Vec<TargetUser>, TrackerError>;

    async fn get_user(&self, id: u64) -> Result<TargetUser, TrackerError>;

    async fn edit_project_description(&self, project: &str, description: &str) -> Result<(), TrackerError>;
}

/// Where labels are looked up and created
///
/// Issue labels live in the issue project, epic labels in the epic group.
/// The variant is chosen once per call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LabelContainer {
    Project(String),
    Group(String),
}

impl LabelContainer {
    /// Look a label up by name
    pub async fn get(&self, target: &dyn TargetTracker, name: &str) -> Result<Option<Label>, TrackerError> {
        match self {
            Self::Project(project) => target.get_project_label(project, name).await,
            Self::Group(group) => target.get_group_label(group, name).await,
        }
    }

    /// Create a label
    pub async fn create(&self, target: &dyn TargetTracker, label: &NewLabel) -> Result<Label, TrackerError> {
        match self {
            Self::Project(project) => target.create_project_label(project, label).await,
            Self::Group(group) => target.create_group_label(group, label).await,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Project(path) | Self::Group(path) => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_without_filter() {
        let request = SearchRequest {
            project: "PROJ".into(),
            kind: KindFilter::EpicsOnly,
            filter: None,
            start_at: 0,
            max_results: 100,
        };
        assert_eq!(request.query(), "project = PROJ AND type = Epic ORDER BY key ASC");
    }

    #[test]
    fn query_wraps_filter() {
        let request = SearchRequest {
            project: "PROJ".into(),
            kind: KindFilter::ExcludeEpics,
            filter: Some("labels = backend".into()),
            start_at: 0,
            max_results: 100,
        };
        assert_eq!(
            request.query(),
            "(labels = backend) AND project = PROJ AND type != Epic ORDER BY key ASC"
        );
    }

    #[test]
    fn blank_filter_is_ignored() {
        let request = SearchRequest {
            project: "PROJ".into(),
            kind: KindFilter::ExcludeEpics,
            filter: Some("   ".into()),
            start_at: 0,
            max_results: 100,
        };
        assert!(request.query().starts_with("project = PROJ"));
    }

    #[test]
    fn kind_filter() {
        assert!(KindFilter::EpicsOnly.accepts(EntityKind::Epic));
        assert!(!KindFilter::EpicsOnly.accepts(EntityKind::Issue));
        assert!(KindFilter::ExcludeEpics.accepts(EntityKind::Issue));
    }
}
