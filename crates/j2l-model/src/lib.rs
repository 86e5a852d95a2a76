//! j2lab Model - entities on both sides of a migration
//!
//! Provides:
//! - Read-only source snapshots (issues, epics, comments, attachments, versions)
//! - The structured rich-text document tree
//! - Target-side creation payloads and entity handles
//! - The tracker client seams ([`SourceTracker`], [`TargetTracker`]) and their typed failures
//! - In-memory tracker implementations used for dry runs and tests

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod document;
pub mod error;
pub mod memory;
pub mod source;
pub mod target;
pub mod tracker;

pub use document::{DocMark, DocNode, RichText};
pub use error::TrackerError;
pub use memory::{
    MemoryTarget, RecordedEntity, RecordedLink, RecordedNote, SnapshotSource, SourceSnapshot,
};
pub use source::{
    EntityKind, FieldValue, SourceAttachment, SourceComment, SourceIssue, SourceLink,
    SourceProject, SourceUser, SourceVersion,
};
pub use target::{
    ContainerRef, HostedFile, IssueUpdate, Label, LinkType, Milestone, NewEpic, NewIssue,
    NewLabel, NewMilestone, NewNote, TargetEntity, TargetUser,
};
pub use tracker::{KindFilter, LabelContainer, SearchPage, SearchRequest, SourceTracker, TargetTracker};
