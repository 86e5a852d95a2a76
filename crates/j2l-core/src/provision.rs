//! Shared resource provisioning
//!
//! Labels and milestones are keyed by name and shared across entities:
//! - each name gets one `OnceCell` slot, so concurrent callers in this process
//!   share a single lookup-then-create
//! - an "already exists" response from the target (another process won the
//!   race) is resolved by looking the resource up again, never reported
//! - an existing milestone is reused untouched

use crate::error::MigrationError;
use dashmap::DashMap;
use futures::future::try_join_all;
use j2l_model::{
    FieldValue, Label, LabelContainer, Milestone, NewLabel, NewMilestone, SourceIssue, SourceVersion, TargetTracker,
    TrackerError,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Random `#rrggbb` colour
#[must_use]
pub fn random_color() -> String {
    format!("#{:06x}", rand::random::<u32>() & 0x00FF_FFFF)
}

fn label(name: String, description: Option<&str>) -> NewLabel {
    NewLabel {
        name,
        color: random_color(),
        description: description.map(str::to_string),
    }
}

fn scoped(prefix: &str, field: &FieldValue) -> NewLabel {
    label(format!("{prefix}{}", field.name), field.description.as_deref())
}

/// Labels derived from one source entity, in a stable order
///
/// Component labels use a single colon: a `::` label is scoped in the target
/// and an issue can only carry one label per scope.
#[must_use]
pub fn derive_labels(issue: &SourceIssue) -> Vec<NewLabel> {
    let mut labels: Vec<NewLabel> = issue.labels.iter().map(|name| label(name.clone(), None)).collect();
    labels.extend(issue.issue_type.iter().map(|t| scoped("type::", t)));
    labels.extend(issue.components.iter().map(|c| scoped("component:", c)));
    labels.extend(issue.status.iter().map(|s| scoped("status::", s)));
    labels.extend(issue.priority.iter().map(|p| scoped("priority::", p)));

    let mut seen = std::collections::HashSet::new();
    labels.retain(|l| seen.insert(l.name.clone()));
    labels
}

/// Whether this run created a milestone or found it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneOrigin {
    Created,
    Reused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedMilestone {
    pub id: u64,
    pub title: String,
    pub origin: MilestoneOrigin,
    /// Created by this run from an archived or released version
    pub close_when_done: bool,
}

impl ProvisionedMilestone {
    fn reused(milestone: Milestone) -> Self {
        Self {
            id: milestone.id,
            title: milestone.title,
            origin: MilestoneOrigin::Reused,
            close_when_done: false,
        }
    }
}

/// Milestones by source version name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MilestoneBook {
    milestones: BTreeMap<String, ProvisionedMilestone>,
}

impl MilestoneBook {
    #[must_use]
    pub fn get(&self, version: &str) -> Option<&ProvisionedMilestone> {
        self.milestones.get(version)
    }

    pub fn insert(&mut self, version: impl Into<String>, milestone: ProvisionedMilestone) {
        self.milestones.insert(version.into(), milestone);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProvisionedMilestone> {
        self.milestones.values()
    }

    #[must_use]
    pub fn count(&self, origin: MilestoneOrigin) -> usize {
        self.iter().filter(|m| m.origin == origin).count()
    }
}

type Slot<T> = Arc<OnceCell<T>>;

/// Get-or-create for labels and milestones
pub struct Provisioner {
    target: Arc<dyn TargetTracker>,
    milestone_project: String,
    labels: DashMap<(LabelContainer, String), Slot<Label>>,
    milestones: DashMap<String, Slot<ProvisionedMilestone>>,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("milestone_project", &self.milestone_project)
            .field("labels", &self.labels.len())
            .field("milestones", &self.milestones.len())
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    #[must_use]
    pub fn new(target: Arc<dyn TargetTracker>, milestone_project: impl Into<String>) -> Self {
        Self {
            target,
            milestone_project: milestone_project.into(),
            labels: DashMap::new(),
            milestones: DashMap::new(),
        }
    }

    /// Ensure one label exists in `container`
    ///
    /// # Errors
    /// A remote failure other than "already exists".
    pub async fn ensure_label(&self, container: &LabelContainer, new: &NewLabel) -> Result<Label, MigrationError> {
        let slot = self
            .labels
            .entry((container.clone(), new.name.clone()))
            .or_default()
            .clone();
        slot.get_or_try_init(|| self.get_or_create_label(container, new))
            .await
            .cloned()
    }

    /// Ensure every label exists; returns the names in input order
    ///
    /// # Errors
    /// The first label that could not be ensured.
    pub async fn ensure_labels(&self, container: &LabelContainer, labels: &[NewLabel]) -> Result<Vec<String>, MigrationError> {
        let ensured = try_join_all(labels.iter().map(|new| self.ensure_label(container, new))).await?;
        Ok(ensured.into_iter().map(|label| label.name).collect())
    }

    async fn get_or_create_label(&self, container: &LabelContainer, new: &NewLabel) -> Result<Label, MigrationError> {
        let target = self.target.as_ref();
        let remote = |operation: &'static str| move |err: TrackerError| MigrationError::remote(operation, err);

        if let Some(existing) = container.get(target, &new.name).await.map_err(remote("get label"))? {
            return Ok(existing);
        }
        match container.create(target, new).await {
            Ok(created) => {
                tracing::debug!(label = %new.name, container = container.path(), "label created");
                Ok(created)
            }
            Err(err) if err.is_already_exists() => {
                tracing::debug!(label = %new.name, "label created concurrently, looking it up");
                container
                    .get(target, &new.name)
                    .await
                    .map_err(remote("get label"))?
                    .ok_or_else(|| MigrationError::remote("create label", err))
            }
            Err(err) => Err(MigrationError::remote("create label", err)),
        }
    }

    /// Ensure the milestone for one source version exists
    ///
    /// # Errors
    /// A remote failure other than "already exists".
    pub async fn ensure_milestone(&self, version: &SourceVersion) -> Result<ProvisionedMilestone, MigrationError> {
        let slot = self.milestones.entry(version.name.clone()).or_default().clone();
        slot.get_or_try_init(|| self.get_or_create_milestone(version))
            .await
            .cloned()
    }

    async fn get_or_create_milestone(&self, version: &SourceVersion) -> Result<ProvisionedMilestone, MigrationError> {
        let project = self.milestone_project.as_str();
        let find = || async {
            self.target
                .find_milestone(project, &version.name)
                .await
                .map_err(|err| MigrationError::remote("find milestone", err))
        };

        if let Some(existing) = find().await? {
            tracing::debug!(milestone = %existing.title, "reusing existing milestone");
            return Ok(ProvisionedMilestone::reused(existing));
        }

        let new = NewMilestone {
            title: version.name.clone(),
            description: version.description.clone(),
            start_date: version.start_date,
            due_date: version.release_date,
        };
        match self.target.create_milestone(project, &new).await {
            Ok(created) => Ok(ProvisionedMilestone {
                id: created.id,
                title: created.title,
                origin: MilestoneOrigin::Created,
                close_when_done: version.is_complete(),
            }),
            Err(err) if err.is_already_exists() => match find().await? {
                Some(existing) => Ok(ProvisionedMilestone::reused(existing)),
                None => Err(MigrationError::remote("create milestone", err)),
            },
            Err(err) => Err(MigrationError::remote("create milestone", err)),
        }
    }

    /// Ensure a milestone for every version
    ///
    /// # Errors
    /// The first version whose milestone could not be ensured.
    pub async fn provision_milestones(&self, versions: &[SourceVersion]) -> Result<MilestoneBook, MigrationError> {
        let ensured = try_join_all(versions.iter().map(|version| async move {
            self.ensure_milestone(version).await.map(|m| (version.name.clone(), m))
        }))
        .await?;

        let mut book = MilestoneBook::default();
        for (name, milestone) in ensured {
            book.insert(name, milestone);
        }
        tracing::info!(
            created = book.count(MilestoneOrigin::Created),
            reused = book.count(MilestoneOrigin::Reused),
            "milestones provisioned"
        );
        Ok(book)
    }

    /// Close the milestones this run created from completed versions
    ///
    /// # Errors
    /// The first milestone that could not be closed.
    pub async fn close_completed(&self, book: &MilestoneBook) -> Result<usize, MigrationError> {
        let mut closed = 0;
        for milestone in book.iter().filter(|m| m.close_when_done) {
            self.target
                .close_milestone(&self.milestone_project, milestone.id)
                .await
                .map_err(|err| MigrationError::remote("close milestone", err))?;
            closed += 1;
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use j2l_model::{EntityKind, MemoryTarget};
    use pretty_assertions::assert_eq;

    fn issue() -> SourceIssue {
        let mut issue = SourceIssue::new("PROJ-1", EntityKind::Issue, "x");
        issue.labels = vec!["backend".into(), "backend".into()];
        issue.issue_type = Some(FieldValue::new("Bug").with_description("A problem"));
        issue.components = vec![FieldValue::new("API")];
        issue.status = Some(FieldValue::new("In Progress"));
        issue.priority = Some(FieldValue::new("High"));
        issue
    }

    #[test]
    fn labels_are_derived_deterministically() {
        let names: Vec<String> = derive_labels(&issue()).into_iter().map(|l| l.name).collect();
        assert_eq!(
            names,
            vec!["backend", "type::Bug", "component:API", "status::In Progress", "priority::High"]
        );
        let bug = derive_labels(&issue()).into_iter().find(|l| l.name == "type::Bug").unwrap();
        assert_eq!(bug.description.as_deref(), Some("A problem"));
        assert_eq!(bug.color.len(), 7);
    }

    #[tokio::test]
    async fn concurrent_label_callers_share_one_creation() {
        let target = Arc::new(MemoryTarget::new());
        let provisioner = Provisioner::new(target.clone(), "grp/proj");
        let container = LabelContainer::Project("grp/proj".into());
        let new = label("type::Bug".into(), None);

        let results = futures::future::join_all((0..16).map(|_| provisioner.ensure_label(&container, &new))).await;

        let ids: std::collections::HashSet<u64> = results.into_iter().map(|r| r.unwrap().id).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(target.call_count("create_label"), 1);
        assert_eq!(target.labels(), vec![("grp/proj".to_string(), "type::Bug".to_string())]);
    }

    #[tokio::test]
    async fn racing_provisioners_converge_on_one_label() {
        let target = Arc::new(MemoryTarget::new());
        let first = Provisioner::new(target.clone(), "grp/proj");
        let second = Provisioner::new(target.clone(), "grp/proj");
        let container = LabelContainer::Group("grp".into());
        let new = label("status::Done".into(), None);

        let (a, b) = tokio::join!(first.ensure_label(&container, &new), second.ensure_label(&container, &new));
        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(target.labels().len(), 1);
    }

    #[tokio::test]
    async fn existing_milestones_are_reused_and_new_ones_created() {
        let target = Arc::new(MemoryTarget::new().with_milestone("grp/proj", "1.0"));
        let provisioner = Provisioner::new(target.clone(), "grp/proj");
        let mut released = SourceVersion::new("2.0");
        released.released = true;
        let mut archived_existing = SourceVersion::new("1.0");
        archived_existing.archived = true;

        let book = provisioner
            .provision_milestones(&[archived_existing, released, SourceVersion::new("3.0")])
            .await
            .unwrap();

        assert_eq!(book.count(MilestoneOrigin::Reused), 1);
        assert_eq!(book.count(MilestoneOrigin::Created), 2);
        assert!(!book.get("1.0").unwrap().close_when_done);
        assert!(book.get("2.0").unwrap().close_when_done);

        assert_eq!(provisioner.close_completed(&book).await.unwrap(), 1);
        let closed: Vec<String> = target.milestones().into_iter().filter(|m| m.closed).map(|m| m.title).collect();
        assert_eq!(closed, vec!["2.0"]);
    }

    #[tokio::test]
    async fn concurrent_milestone_callers_share_one_creation() {
        let target = Arc::new(MemoryTarget::new());
        let provisioner = Provisioner::new(target.clone(), "grp/proj");
        let version = SourceVersion::new("4.0");

        let all = futures::future::join_all((0..8).map(|_| provisioner.ensure_milestone(&version))).await;
        assert!(all.iter().all(|r| matches!(r, Ok(m) if m.origin == MilestoneOrigin::Created)));
        assert_eq!(target.call_count("create_milestone"), 1);
    }
}
