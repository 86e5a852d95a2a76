//! Identity resolution
//!
//! Builds the immutable source-identity to target-account map once per run:
//! - collects every identity named as assignee, reporter, or inline mention
//! - maps each through the configured users table
//! - fetches each distinct target account exactly once
//! - verifies membership of the issue project
//!
//! An unmapped identity or a failed lookup is fatal for the run; nothing has
//! been converted yet. A mapped identity that is not a member of the issue
//! project is kept out of the map and fails only the entities that use it.

use crate::config::MigrationConfig;
use crate::error::MigrationError;
use futures::stream::{self, StreamExt, TryStreamExt};
use j2l_markup::{referenced_mentions, MentionResolver};
use j2l_model::{ContainerRef, SourceIssue, SourceTracker, TargetTracker, TargetUser};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A mapped target account outside the issue project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonMember {
    pub user_id: u64,
    pub container: ContainerRef,
}

/// Resolved source identity to target account correspondence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    users: HashMap<String, TargetUser>,
    non_members: HashMap<String, NonMember>,
}

impl IdentityMap {
    #[must_use]
    pub fn new(users: HashMap<String, TargetUser>) -> Self {
        Self {
            users,
            non_members: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_non_members(mut self, non_members: HashMap<String, NonMember>) -> Self {
        self.non_members = non_members;
        self
    }

    #[inline]
    #[must_use]
    pub fn non_member(&self, identity: &str) -> Option<&NonMember> {
        self.non_members.get(identity)
    }

    /// Check that every identity `issue` assigns or mentions is a member
    ///
    /// # Errors
    /// [`MigrationError::NotAMember`] for the first identity that is not.
    pub fn require_members(&self, issue: &SourceIssue) -> Result<(), MigrationError> {
        let mentions = std::iter::once(&issue.body)
            .chain(issue.comments.iter().map(|comment| &comment.body))
            .flat_map(referenced_mentions);
        let assignee = issue.assignee.iter().map(|user| user.identity.clone());

        for identity in assignee.chain(mentions) {
            if let Some(outsider) = self.non_members.get(&identity) {
                return Err(MigrationError::NotAMember {
                    identity,
                    user_id: outsider.user_id,
                    container: outsider.container.clone(),
                });
            }
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&TargetUser> {
        self.users.get(identity)
    }

    #[inline]
    #[must_use]
    pub fn user_id(&self, identity: &str) -> Option<u64> {
        self.get(identity).map(|user| user.id)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl MentionResolver for IdentityMap {
    fn username(&self, identity: &str) -> Option<&str> {
        self.users.get(identity).map(|user| user.username.as_str())
    }
}

/// An identity referenced by the migrated data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencedIdentity {
    pub identity: String,
    /// Display name when the reference carried one
    pub display_name: Option<String>,
}

/// Every identity referenced by `issues`, in first-reference order
#[must_use]
pub fn referenced_identities<'i>(issues: impl IntoIterator<Item = &'i SourceIssue>) -> Vec<ReferencedIdentity> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    let mut note = |identity: &str, display_name: Option<&str>| {
        if seen.insert(identity.to_string()) {
            found.push(ReferencedIdentity {
                identity: identity.to_string(),
                display_name: display_name.map(str::to_string),
            });
        }
    };

    for issue in issues {
        for user in issue.assignee.iter().chain(issue.reporter.iter()) {
            note(&user.identity, Some(user.display_name.as_str()));
        }
        for identity in referenced_mentions(&issue.body) {
            note(&identity, None);
        }
        for comment in &issue.comments {
            for identity in referenced_mentions(&comment.body) {
                note(&identity, None);
            }
        }
    }
    found
}

/// Builds the [`IdentityMap`] for one run
pub struct IdentityResolver<'a> {
    config: &'a MigrationConfig,
    source: &'a dyn SourceTracker,
    target: &'a dyn TargetTracker,
}

impl<'a> IdentityResolver<'a> {
    #[must_use]
    pub fn new(config: &'a MigrationConfig, source: &'a dyn SourceTracker, target: &'a dyn TargetTracker) -> Self {
        Self { config, source, target }
    }

    /// Resolve every identity referenced by `issues`
    ///
    /// # Errors
    /// The first unmapped identity or a failed remote lookup.
    pub async fn build<'i>(
        &self,
        issues: impl IntoIterator<Item = &'i SourceIssue>,
    ) -> Result<IdentityMap, MigrationError> {
        let referenced = referenced_identities(issues);

        let mut mapped = Vec::with_capacity(referenced.len());
        for reference in &referenced {
            match self.config.users.get(&reference.identity) {
                Some(&user_id) => mapped.push((reference.identity.as_str(), user_id)),
                None => return Err(self.unmapped(reference).await),
            }
        }

        let container = ContainerRef::Project(self.config.target.issue_project.clone());
        let members: HashSet<u64> = self
            .target
            .list_members(&container)
            .await
            .map_err(|err| MigrationError::remote("list members", err))?
            .into_iter()
            .map(|member| member.id)
            .collect();

        let mut distinct: Vec<u64> = mapped.iter().map(|(_, id)| *id).collect();
        distinct.sort_unstable();
        distinct.dedup();

        let accounts: BTreeMap<u64, TargetUser> = stream::iter(distinct)
            .map(|id| async move {
                self.target
                    .get_user(id)
                    .await
                    .map(|user| (id, user))
                    .map_err(|err| MigrationError::remote("get user", err))
            })
            .buffer_unordered(self.config.concurrency.entities)
            .try_collect()
            .await?;

        let mut users = HashMap::with_capacity(mapped.len());
        let mut non_members = HashMap::new();
        for (identity, user_id) in mapped {
            if !members.contains(&user_id) {
                tracing::warn!(%identity, user_id, %container, "identity is not a project member");
                non_members.insert(
                    identity.to_string(),
                    NonMember {
                        user_id,
                        container: container.clone(),
                    },
                );
                continue;
            }
            if let Some(account) = accounts.get(&user_id) {
                users.insert(identity.to_string(), account.clone());
            }
        }

        tracing::info!(identities = users.len(), non_members = non_members.len(), "identity map built");
        Ok(IdentityMap::new(users).with_non_members(non_members))
    }

    async fn unmapped(&self, reference: &ReferencedIdentity) -> MigrationError {
        let display_name = match &reference.display_name {
            Some(name) => name.clone(),
            None => match self.source.get_user(&reference.identity).await {
                Ok(user) => user.display_name,
                Err(err) => {
                    tracing::debug!(identity = %reference.identity, error = %err, "display name lookup failed");
                    reference.identity.clone()
                }
            },
        };
        MigrationError::UnmappedIdentity {
            identity: reference.identity.clone(),
            display_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use j2l_model::{EntityKind, MemoryTarget, RichText, SnapshotSource, SourceComment, SourceProject, SourceSnapshot, SourceUser};
    use pretty_assertions::assert_eq;

    fn config(users: &[(&str, u64)]) -> MigrationConfig {
        let table: String = users.iter().map(|(identity, id)| format!("  {identity}: {id}\n")).collect();
        MigrationConfig::from_yaml_str(&format!(
            "source:\n  host: https://jira.example.com\n  project: PROJ\n\
             target:\n  host: https://gitlab.example.com\n  issue_project: grp/proj\n  epic_group: grp\n\
             users:\n{table}"
        ))
        .unwrap()
    }

    fn source() -> SnapshotSource {
        SnapshotSource::new(SourceSnapshot {
            project: SourceProject {
                key: "PROJ".into(),
                name: "Project".into(),
                description: None,
                versions: Vec::new(),
            },
            issues: Vec::new(),
            attachments: BTreeMap::new(),
            users: vec![SourceUser::new("carol", "Carol C")],
        })
    }

    fn issues() -> Vec<SourceIssue> {
        let mut first = SourceIssue::new("PROJ-1", EntityKind::Issue, "first");
        first.assignee = Some(SourceUser::new("alice", "Alice A"));
        first.reporter = Some(SourceUser::new("bob", "Bob B"));
        first.body = RichText::wiki("cc [~alice] and [~carol]");

        let mut second = SourceIssue::new("PROJ-2", EntityKind::Issue, "second");
        second.comments.push(SourceComment {
            id: "1".into(),
            author: SourceUser::new("zed", "Zed"),
            body: RichText::wiki("thanks [~bob]"),
            created_at: chrono::Utc::now(),
        });
        vec![first, second]
    }

    #[test]
    fn referenced_identities_are_deduplicated_in_order() {
        let found: Vec<String> = referenced_identities(&issues()).into_iter().map(|r| r.identity).collect();
        assert_eq!(found, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn each_target_account_is_fetched_once() {
        let config = config(&[("alice", 42), ("bob", 7), ("carol", 42)]);
        let target = MemoryTarget::new()
            .with_member(TargetUser::new(42, "alice.target"))
            .with_member(TargetUser::new(7, "bob.target"));
        let source = source();

        let map = IdentityResolver::new(&config, &source, &target).build(&issues()).await.unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map.username("carol"), Some("alice.target"));
        assert_eq!(map.user_id("bob"), Some(7));
        assert_eq!(target.call_count("get_user"), 2);
        assert_eq!(target.call_count("list_members"), 1);
    }

    #[tokio::test]
    async fn unmapped_identity_is_fatal_and_named() {
        let config = config(&[("alice", 42), ("bob", 7)]);
        let target = MemoryTarget::new().with_member(TargetUser::new(42, "a")).with_member(TargetUser::new(7, "b"));
        let source = source();

        let err = IdentityResolver::new(&config, &source, &target).build(&issues()).await.unwrap_err();
        assert!(err.is_fatal());
        match err {
            MigrationError::UnmappedIdentity { identity, display_name } => {
                assert_eq!(identity, "carol");
                assert_eq!(display_name, "Carol C");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[tokio::test]
    async fn non_member_is_kept_out_of_the_map() {
        let config = config(&[("alice", 42), ("bob", 7), ("carol", 9)]);
        let target = MemoryTarget::new()
            .with_member(TargetUser::new(42, "a"))
            .with_member(TargetUser::new(7, "b"))
            .with_user(TargetUser::new(9, "outsider"));
        let source = source();

        let map = IdentityResolver::new(&config, &source, &target).build(&issues()).await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.username("carol"), None);
        assert_eq!(map.non_member("carol").map(|outsider| outsider.user_id), Some(9));

        let issues = issues();
        let err = map.require_members(&issues[0]).unwrap_err();
        assert!(matches!(err, MigrationError::NotAMember { ref identity, user_id: 9, .. } if identity == "carol"));
        assert!(!err.is_fatal());
        map.require_members(&issues[1]).unwrap();
    }
}
