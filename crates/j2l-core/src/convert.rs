//! Entity conversion
//!
//! One source epic or issue becomes one target entity. Each conversion walks
//! a fixed state machine:
//!
//! ```text
//! discovered -> attachments-resolved -> body-translated -> created
//!            -> comments-attached -> closed | left-open
//! ```
//!
//! Every piece of text (body and comments) is translated before the entity
//! is created, so a bad mention or table fails the entity without leaving a
//! half-populated target behind. A failure is reported with the source key
//! and the last stage reached.

use crate::attachments::AttachmentResolver;
use crate::config::{CommentFailurePolicy, MigrationConfig};
use crate::error::MigrationError;
use crate::identity::IdentityMap;
use crate::provision::{derive_labels, random_color, MilestoneBook, Provisioner};
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use j2l_markup::{translate, AttachmentTable};
use j2l_model::{
    EntityKind, LabelContainer, NewEpic, NewIssue, NewNote, SourceComment, SourceIssue, SourceTracker, TargetEntity,
    TargetTracker,
};
use serde::Serialize;

/// Conversion progress of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionStage {
    Discovered,
    AttachmentsResolved,
    BodyTranslated,
    Created,
    CommentsAttached,
    Closed,
    LeftOpen,
}

impl ConversionStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::AttachmentsResolved => "attachments-resolved",
            Self::BodyTranslated => "body-translated",
            Self::Created => "created",
            Self::CommentsAttached => "comments-attached",
            Self::Closed => "closed",
            Self::LeftOpen => "left-open",
        }
    }

    /// Terminal stages end a conversion
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::LeftOpen)
    }
}

impl std::fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: ConversionStage) -> Vec<ConversionStage> {
    use ConversionStage::{AttachmentsResolved, BodyTranslated, Closed, CommentsAttached, Created, Discovered, LeftOpen};
    match from {
        Discovered => vec![AttachmentsResolved],
        AttachmentsResolved => vec![BodyTranslated],
        BodyTranslated => vec![Created],
        Created => vec![CommentsAttached],
        CommentsAttached => vec![Closed, LeftOpen],
        Closed | LeftOpen => vec![],
    }
}

/// # Errors
/// [`MigrationError::IllegalTransition`] if `to` is not reachable from `from` in one step.
pub fn validate_transition(from: ConversionStage, to: ConversionStage) -> Result<(), MigrationError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(MigrationError::IllegalTransition { from, to })
    }
}

struct Progress {
    stage: ConversionStage,
}

impl Progress {
    fn advance(&mut self, to: ConversionStage) -> Result<(), MigrationError> {
        validate_transition(self.stage, to)?;
        tracing::trace!(from = %self.stage, %to, "conversion stage");
        self.stage = to;
        Ok(())
    }
}

/// Outcome of one successful conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedEntity {
    pub key: String,
    pub target: TargetEntity,
    /// Comments not posted under the best-effort policy
    pub skipped_comments: usize,
    /// Trailing notes posted for attachments never referenced inline
    pub trailing_attachments: usize,
    pub closed: bool,
}

/// Translated text of one entity, ready to post
struct TranslatedEntity {
    body: String,
    comments: Vec<NewNote>,
    consumed: Vec<String>,
}

/// `<Month DD, YYYY at H:MM AM>` as shown in comment footers
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%B %d, %Y at %-I:%M %p").to_string()
}

/// Converts source entities with the run's shared state
pub struct EntityConverter<'a> {
    config: &'a MigrationConfig,
    target: &'a dyn TargetTracker,
    identities: &'a IdentityMap,
    provisioner: &'a Provisioner,
    milestones: &'a MilestoneBook,
    attachments: AttachmentResolver<'a>,
}

impl<'a> EntityConverter<'a> {
    #[must_use]
    pub fn new(
        config: &'a MigrationConfig,
        source: &'a dyn SourceTracker,
        target: &'a dyn TargetTracker,
        identities: &'a IdentityMap,
        provisioner: &'a Provisioner,
        milestones: &'a MilestoneBook,
    ) -> Self {
        Self {
            config,
            target,
            identities,
            provisioner,
            milestones,
            attachments: AttachmentResolver::new(config, source, target),
        }
    }

    /// Convert one source entity
    ///
    /// # Errors
    /// [`MigrationError::Entity`] carrying the key and the last stage reached.
    #[tracing::instrument(skip_all, fields(key = %issue.key, kind = %issue.kind))]
    pub async fn convert(&self, issue: &SourceIssue) -> Result<ConvertedEntity, MigrationError> {
        let mut progress = Progress {
            stage: ConversionStage::Discovered,
        };
        match self.run(issue, &mut progress).await {
            Ok(converted) => {
                tracing::debug!(iid = converted.target.iid, closed = converted.closed, "converted");
                Ok(converted)
            }
            Err(err) => {
                tracing::warn!(stage = %progress.stage, error = %err, "conversion failed");
                Err(err.in_entity(&issue.key, progress.stage))
            }
        }
    }

    async fn run(&self, issue: &SourceIssue, progress: &mut Progress) -> Result<ConvertedEntity, MigrationError> {
        let table = self.attachments.resolve(&issue.attachments).await?;
        progress.advance(ConversionStage::AttachmentsResolved)?;

        let text = self.translate_all(issue, &table)?;
        progress.advance(ConversionStage::BodyTranslated)?;

        let target = match issue.kind {
            EntityKind::Epic => self.create_epic(issue, text.body).await?,
            EntityKind::Issue => self.create_issue(issue, text.body).await?,
        };
        progress.advance(ConversionStage::Created)?;

        let skipped_comments = self.post_comments(&target, text.comments).await?;
        let trailing_attachments = self.attachments.post_unconsumed(&target, &table, &text.consumed).await?;
        progress.advance(ConversionStage::CommentsAttached)?;

        if issue.resolved {
            let closed = match issue.kind {
                EntityKind::Epic => self.target.close_epic(&target).await,
                EntityKind::Issue => self.target.close_issue(&target).await,
            };
            closed.map_err(|err| MigrationError::remote("close entity", err))?;
            progress.advance(ConversionStage::Closed)?;
        } else {
            progress.advance(ConversionStage::LeftOpen)?;
        }

        Ok(ConvertedEntity {
            key: issue.key.clone(),
            target,
            skipped_comments,
            trailing_attachments,
            closed: issue.resolved,
        })
    }

    fn translate_all(&self, issue: &SourceIssue, table: &AttachmentTable) -> Result<TranslatedEntity, MigrationError> {
        let source_url = self.config.source_url(&issue.key);
        let footer = format!("Imported from Jira [{}]({source_url})", issue.key);
        self.identities.require_members(issue)?;

        let body = translate(&issue.body, table, self.identities)?;
        let mut consumed = body.consumed;
        let body = if body.markdown.trim().is_empty() {
            footer
        } else {
            format!("{}\n\n{footer}", body.markdown)
        };

        let mut comments = Vec::with_capacity(issue.comments.len());
        for comment in &issue.comments {
            let translated = translate(&comment.body, table, self.identities)?;
            for name in translated.consumed {
                if !consumed.contains(&name) {
                    consumed.push(name);
                }
            }
            comments.push(NewNote {
                body: format!("{}\n\n{}", translated.markdown, comment_footer(comment, &source_url)),
                created_at: Some(comment.created_at),
            });
        }

        Ok(TranslatedEntity { body, comments, consumed })
    }

    fn label_container(&self, kind: EntityKind) -> LabelContainer {
        match kind {
            EntityKind::Epic => LabelContainer::Group(self.config.target.epic_group.clone()),
            EntityKind::Issue => LabelContainer::Project(self.config.target.issue_project.clone()),
        }
    }

    async fn create_epic(&self, issue: &SourceIssue, description: String) -> Result<TargetEntity, MigrationError> {
        let start_date = match &self.config.custom_fields.epic_start_date {
            Some(field) => date_field(issue, field)?,
            None => None,
        };
        let labels = self
            .provisioner
            .ensure_labels(&self.label_container(EntityKind::Epic), &derive_labels(issue))
            .await?;

        let epic = NewEpic {
            title: issue.title.clone(),
            description,
            labels,
            color: Some(random_color()),
            start_date,
            due_date: issue.due_date,
            created_at: issue.created_at,
        };
        self.target
            .create_epic(&self.config.target.epic_group, &epic)
            .await
            .map_err(|err| MigrationError::remote("create epic", err))
    }

    async fn create_issue(&self, issue: &SourceIssue, description: String) -> Result<TargetEntity, MigrationError> {
        let assignee_ids = match &issue.assignee {
            Some(user) => vec![self
                .identities
                .user_id(&user.identity)
                .ok_or_else(|| MigrationError::UnresolvedAssignee(user.identity.clone()))?],
            None => Vec::new(),
        };
        let milestone_id = match issue.fix_versions.first() {
            Some(version) => Some(
                self.milestones
                    .get(version)
                    .ok_or_else(|| MigrationError::MissingMilestone(version.clone()))?
                    .id,
            ),
            None => None,
        };
        let weight = match &self.config.custom_fields.story_point {
            Some(field) => weight_field(issue, field)?,
            None => None,
        };
        let labels = self
            .provisioner
            .ensure_labels(&self.label_container(EntityKind::Issue), &derive_labels(issue))
            .await?;

        let new = NewIssue {
            title: issue.title.clone(),
            description,
            labels,
            assignee_ids,
            milestone_id,
            weight,
            due_date: issue.due_date,
            created_at: issue.created_at,
        };
        self.target
            .create_issue(&self.config.target.issue_project, &new)
            .await
            .map_err(|err| MigrationError::remote("create issue", err))
    }

    /// Post translated comments; returns how many were skipped
    async fn post_comments(&self, target: &TargetEntity, comments: Vec<NewNote>) -> Result<usize, MigrationError> {
        if comments.is_empty() {
            return Ok(0);
        }
        let mut posted = std::pin::pin!(stream::iter(comments)
            .map(|note| async move { self.target.create_note(target, &note).await })
            .buffered(self.config.concurrency.comments));

        let mut skipped = 0;
        while let Some(result) = posted.next().await {
            let Err(err) = result else { continue };
            match self.config.comments.on_failure {
                // dropping the stream stops every note not yet sent
                CommentFailurePolicy::FailFast => return Err(MigrationError::remote("create note", err)),
                CommentFailurePolicy::BestEffort => {
                    tracing::warn!(error = %err, "comment not posted, skipping");
                    skipped += 1;
                }
            }
        }
        Ok(skipped)
    }
}

fn comment_footer(comment: &SourceComment, source_url: &str) -> String {
    format!(
        "{} by {} [[Original]({source_url}?focusedCommentId={})]",
        format_timestamp(comment.created_at),
        comment.author.display_name,
        comment.id
    )
}

fn date_field(issue: &SourceIssue, field: &str) -> Result<Option<NaiveDate>, MigrationError> {
    let Some(value) = issue.custom_field(field) else {
        return Ok(None);
    };
    let invalid = |reason: &str| MigrationError::InvalidField {
        key: issue.key.clone(),
        field: field.to_string(),
        reason: reason.to_string(),
    };
    let text = value.as_str().ok_or_else(|| invalid("is not a date string"))?;
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| invalid("is not a YYYY-MM-DD date"))
}

fn weight_field(issue: &SourceIssue, field: &str) -> Result<Option<u64>, MigrationError> {
    let Some(value) = issue.custom_field(field) else {
        return Ok(None);
    };
    let points = value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .filter(|points| points.is_finite() && *points >= 0.0)
        .ok_or_else(|| MigrationError::InvalidField {
            key: issue.key.clone(),
            field: field.to_string(),
            reason: "is not a non-negative number".to_string(),
        })?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let weight = points.trunc() as u64;
    Ok(Some(weight))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use j2l_model::SourceUser;
    use proptest::prelude::*;

    const ALL: [ConversionStage; 7] = [
        ConversionStage::Discovered,
        ConversionStage::AttachmentsResolved,
        ConversionStage::BodyTranslated,
        ConversionStage::Created,
        ConversionStage::CommentsAttached,
        ConversionStage::Closed,
        ConversionStage::LeftOpen,
    ];

    #[test]
    fn stages_only_move_forward_one_step() {
        assert!(validate_transition(ConversionStage::Discovered, ConversionStage::AttachmentsResolved).is_ok());
        assert!(validate_transition(ConversionStage::CommentsAttached, ConversionStage::LeftOpen).is_ok());

        assert!(validate_transition(ConversionStage::Discovered, ConversionStage::Created).is_err());
        assert!(validate_transition(ConversionStage::Created, ConversionStage::BodyTranslated).is_err());
        assert!(validate_transition(ConversionStage::Closed, ConversionStage::LeftOpen).is_err());
    }

    #[test]
    fn only_final_stages_are_terminal() {
        for stage in ALL {
            assert_eq!(stage.is_terminal(), allowed_transitions(stage).is_empty(), "{stage}");
        }
    }

    fn stage() -> impl Strategy<Value = ConversionStage> {
        proptest::sample::select(ALL.to_vec())
    }

    proptest! {
        #[test]
        fn accepted_walks_visit_stages_in_order(steps in proptest::collection::vec(stage(), 0..10)) {
            let mut current = ConversionStage::Discovered;
            let mut walked = vec![current];
            for next in steps {
                if validate_transition(current, next).is_ok() {
                    current = next;
                    walked.push(next);
                }
            }
            let positions: Vec<usize> = walked
                .iter()
                .map(|s| ALL.iter().position(|a| a == s).unwrap())
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(walked.iter().filter(|s| s.is_terminal()).count() <= 1);
        }
    }

    #[test]
    fn comment_footer_format() {
        let comment = SourceComment {
            id: "10010".into(),
            author: SourceUser::new("jeff", "Jeff Kim"),
            body: "hi".into(),
            created_at: Utc.with_ymd_and_hms(2023, 9, 6, 21, 5, 0).unwrap(),
        };
        assert_eq!(
            comment_footer(&comment, "https://jira.example.com/browse/PROJ-1"),
            "September 06, 2023 at 9:05 PM by Jeff Kim \
             [[Original](https://jira.example.com/browse/PROJ-1?focusedCommentId=10010)]"
        );
    }

    #[test]
    fn custom_fields_are_parsed() {
        let mut issue = SourceIssue::new("PROJ-1", EntityKind::Issue, "x");
        issue.custom_fields.insert("points".into(), serde_json::json!(3.7));
        issue.custom_fields.insert("start".into(), serde_json::json!("2024-02-29"));
        issue.custom_fields.insert("bad".into(), serde_json::json!("soon"));

        assert_eq!(weight_field(&issue, "points").unwrap(), Some(3));
        assert_eq!(weight_field(&issue, "missing").unwrap(), None);
        assert_eq!(date_field(&issue, "start").unwrap(), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert!(matches!(date_field(&issue, "bad"), Err(MigrationError::InvalidField { .. })));
        assert!(matches!(weight_field(&issue, "bad"), Err(MigrationError::InvalidField { .. })));
    }
}
