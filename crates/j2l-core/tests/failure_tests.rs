//! Failure scoping across a migration run.
//!
//! Core guarantees exercised here:
//! - Configuration failures abort the run before any entity is created.
//! - A resolution failure fails only its own entity, including an identity
//!   that is mapped but not a project member.
//! - A remote failure cancels the conversions of its batch that have not
//!   started yet; conversions already running complete.
//! - Every failure names the source key and the stage it reached.

use j2l_core::{ConversionStage, ErrorKind, Migration, MigrationConfig, MigrationError, MigrationReport};
use j2l_model::{EntityKind, SnapshotSource, SourceIssue, SourceSnapshot, TargetUser, TrackerError};
use j2l_test_utils::{
    attachment, comment, config_with, epic, issue, sample_config, sample_target, shared, snapshot, user, with_body,
    FaultyTarget, EPIC_START_FIELD,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn bad_gateway(operation: &str) -> TrackerError {
    TrackerError::status(operation, 502, "bad gateway")
}

fn five_issues() -> Vec<SourceIssue> {
    (1..=5).map(|i| issue(&format!("PROJ-{i}"), &format!("issue {i}"))).collect()
}

async fn run(
    config: MigrationConfig,
    snapshot: SourceSnapshot,
    target: FaultyTarget,
) -> (Arc<FaultyTarget>, Result<MigrationReport, MigrationError>) {
    let (target, dynamic) = shared(target);
    let result = Migration::new(config, Arc::new(SnapshotSource::new(snapshot)), dynamic)
        .run()
        .await;
    (target, result)
}

/// Tenet: a remote failure in a batch of five is attributed to its key and
/// does not undo the four conversions already in flight.
#[tokio::test]
async fn remote_failure_in_full_batch_spares_started_siblings() {
    let target = FaultyTarget::new(sample_target())
        .failing_matching("create_issue", "issue 3", bad_gateway("create issue"))
        .with_latency(Duration::from_millis(20));

    let (target, result) = run(sample_config(), snapshot(five_issues(), Vec::new()), target).await;
    let report = result.unwrap();

    assert_eq!(report.issues.failures.len(), 1);
    let failure = &report.issues.failures[0];
    assert_eq!(failure.key, "PROJ-3");
    assert_eq!(failure.kind, ErrorKind::Remote);
    assert_eq!(failure.stage, Some(ConversionStage::BodyTranslated));
    assert_eq!(report.issues.created, 4);
    assert!(report.issues.cancelled.is_empty());
    assert_eq!(target.inner().issues().len(), 4);
    assert!(target.peak_in_flight() <= 5);
    assert!(!report.is_success());
}

/// Tenet: with one conversion at a time, the entities queued behind a
/// remote failure are cancelled rather than attempted.
#[tokio::test]
async fn remote_failure_cancels_unstarted_conversions() {
    let config = config_with(&[("alice", 42)], "concurrency:\n  entities: 1\n");
    let target = FaultyTarget::new(sample_target()).failing_matching(
        "create_issue",
        "issue 3",
        bad_gateway("create issue"),
    );

    let (target, result) = run(config, snapshot(five_issues(), Vec::new()), target).await;
    let report = result.unwrap();

    assert_eq!(report.issues.created, 2);
    assert_eq!(report.issues.cancelled, vec!["PROJ-4", "PROJ-5"]);
    assert_eq!(target.peak_in_flight(), 1);
    assert!(report.to_string().contains("CANCELLED PROJ-4"));
}

/// Tenet: a resolution failure stays local to its entity.
#[tokio::test]
async fn missing_milestone_fails_only_that_issue() {
    let mut orphan = issue("PROJ-2", "issue 2");
    orphan.fix_versions = vec!["9.9".into()];
    let mut issues = five_issues();
    issues[1] = orphan;
    let config = config_with(&[("alice", 42)], "concurrency:\n  entities: 1\n");

    let (target, result) = run(config, snapshot(issues, Vec::new()), FaultyTarget::new(sample_target())).await;
    let report = result.unwrap();

    assert_eq!(report.issues.created, 4);
    assert!(report.issues.cancelled.is_empty());
    let failure = &report.issues.failures[0];
    assert_eq!(failure.key, "PROJ-2");
    assert_eq!(failure.kind, ErrorKind::Resolution);
    assert!(failure.message.contains("9.9"), "{}", failure.message);
    assert!(target.inner().find(EntityKind::Issue, "issue 2").is_none());
}

/// Tenet: an identity missing from the users table aborts the run before
/// anything is created.
#[tokio::test]
async fn unmapped_identity_is_fatal() {
    let mut assigned = issue("PROJ-1", "assigned");
    assigned.assignee = Some(user("mallory"));

    let (target, result) = run(sample_config(), snapshot(vec![assigned], Vec::new()), FaultyTarget::new(sample_target())).await;

    let err = result.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        MigrationError::UnmappedIdentity { ref identity, ref display_name }
            if identity == "mallory" && display_name == "mallory Display"
    ));
    assert!(target.inner().issues().is_empty());
}

/// Tenet: under fail-fast a failed comment fails the entity after creation.
#[tokio::test]
async fn comment_failure_fails_entity_by_default() {
    let mut chatty = issue("PROJ-1", "chatty");
    chatty.comments = vec![comment("1", "alice", "fine"), comment("2", "alice", "flaky remark")];
    let target = FaultyTarget::new(sample_target()).failing_matching("create_note", "flaky", bad_gateway("create note"));

    let (target, result) = run(sample_config(), snapshot(vec![chatty], Vec::new()), target).await;
    let report = result.unwrap();

    let failure = &report.issues.failures[0];
    assert_eq!(failure.key, "PROJ-1");
    assert_eq!(failure.stage, Some(ConversionStage::Created));
    // created before the comments were posted, never rolled back
    assert!(target.inner().find(EntityKind::Issue, "chatty").is_some());
}

/// Tenet: under best-effort a failed comment is skipped and counted.
#[tokio::test]
async fn comment_failure_is_skipped_under_best_effort() {
    let mut chatty = issue("PROJ-1", "chatty");
    chatty.comments = vec![comment("1", "alice", "fine"), comment("2", "alice", "flaky remark")];
    let config = config_with(&[("alice", 42)], "comments:\n  on_failure: best_effort\n");
    let target = FaultyTarget::new(sample_target()).failing_matching("create_note", "flaky", bad_gateway("create note"));

    let (target, result) = run(config, snapshot(vec![chatty], Vec::new()), target).await;
    let report = result.unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(report.skipped_comments, 1);
    let recorded = target.inner().find(EntityKind::Issue, "chatty").unwrap();
    assert_eq!(target.inner().notes_for(&recorded.entity).len(), 1);
}

/// Tenet: under fail-fast no note is sent after the first failed one.
#[tokio::test]
async fn fail_fast_stops_posting_after_the_first_failure() {
    let mut chatty = issue("PROJ-1", "chatty");
    chatty.comments = vec![
        comment("1", "alice", "fine"),
        comment("2", "alice", "flaky remark"),
        comment("3", "alice", "never sent"),
    ];
    let config = config_with(&[("alice", 42)], "concurrency:\n  comments: 1\n");
    let target = FaultyTarget::new(sample_target()).failing_matching("create_note", "flaky", bad_gateway("create note"));

    let (target, result) = run(config, snapshot(vec![chatty], Vec::new()), target).await;
    let report = result.unwrap();

    assert_eq!(report.issues.failures.len(), 1);
    let notes = target.inner().notes();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].body.starts_with("fine"), "{}", notes[0].body);
}

/// Tenet: a mention inside code is literal text and needs no account.
#[tokio::test]
async fn mention_inside_code_needs_no_mapping() {
    let sample = with_body(issue("PROJ-1", "sample"), "{code}\nlet x = \"[~ghost]\";\n{code}");
    let source = snapshot(vec![sample, issue("PROJ-2", "plain")], Vec::new());

    let (target, result) = run(sample_config(), source, FaultyTarget::new(sample_target())).await;
    let report = result.unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(report.issues.created, 2);
    let created = target.inner().find(EntityKind::Issue, "sample").unwrap();
    assert!(created.description.contains("[~ghost]"), "{}", created.description);
}

/// Tenet: an identity outside the issue project fails only the entities
/// that assign or mention it.
#[tokio::test]
async fn non_member_fails_only_its_entity() {
    let mentioning = with_body(issue("PROJ-1", "mentions carol"), "ping [~carol]");
    let source = snapshot(vec![mentioning, issue("PROJ-2", "two"), issue("PROJ-3", "three")], Vec::new());
    let config = config_with(&[("alice", 42), ("carol", 9)], "");
    let target = FaultyTarget::new(sample_target().with_user(TargetUser::new(9, "carol.target")));

    let (target, result) = run(config, source, target).await;
    let report = result.unwrap();

    assert_eq!(report.issues.created, 2);
    let failure = &report.issues.failures[0];
    assert_eq!(failure.key, "PROJ-1");
    assert_eq!(failure.kind, ErrorKind::Resolution);
    assert_eq!(failure.stage, Some(ConversionStage::AttachmentsResolved));
    assert!(failure.message.contains("not a member"), "{}", failure.message);
    assert!(target.inner().find(EntityKind::Issue, "mentions carol").is_none());
}

/// Tenet: an attachment that cannot be uploaded is named in the failure.
#[tokio::test]
async fn attachment_failure_names_the_file() {
    let mut with_file = issue("PROJ-1", "with file");
    with_file.attachments = vec![attachment("1", "big.zip", 9)];
    let target = FaultyTarget::new(sample_target()).failing("upload_file", bad_gateway("upload file"));

    let (_, result) = run(sample_config(), snapshot(vec![with_file], Vec::new()), target).await;
    let report = result.unwrap();

    let failure = &report.issues.failures[0];
    assert_eq!(failure.stage, Some(ConversionStage::Discovered));
    assert!(failure.message.contains("big.zip"), "{}", failure.message);
}

/// Tenet: a malformed epic start date fails the epic, not the run.
#[tokio::test]
async fn invalid_epic_start_date_fails_the_epic() {
    let mut dated = epic("PROJ-1", "dated");
    dated.custom_fields.insert(EPIC_START_FIELD.into(), serde_json::json!("next week"));
    let source = snapshot(vec![dated, issue("PROJ-2", "plain")], Vec::new());

    let (_, result) = run(sample_config(), source, FaultyTarget::new(sample_target())).await;
    let report = result.unwrap();

    assert_eq!(report.epics.failures.len(), 1);
    assert_eq!(report.epics.failures[0].kind, ErrorKind::Resolution);
    assert_eq!(report.issues.created, 1);
}

/// Tenet: a malformed table fails its entity with the row named.
#[tokio::test]
async fn table_column_mismatch_fails_the_entity() {
    let mut tabled = issue("PROJ-1", "tabled");
    tabled.body = j2l_model::RichText::wiki("||H1||H2||\n|a|b|\n|c|");

    let (target, result) = run(sample_config(), snapshot(vec![tabled], Vec::new()), FaultyTarget::new(sample_target())).await;
    let report = result.unwrap();

    let failure = &report.issues.failures[0];
    assert_eq!(failure.stage, Some(ConversionStage::AttachmentsResolved));
    assert_eq!(failure.kind, ErrorKind::Resolution);
    assert!(target.inner().issues().is_empty());
}
