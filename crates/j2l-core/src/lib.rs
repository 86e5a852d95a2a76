//! j2lab Core - issue tracker migration engine
//!
//! Moves one source project into a target tracker:
//! - Discovers epics and issues page by page
//! - Resolves identities, attachments, labels and milestones once per run
//! - Converts every entity through a checked state machine under bounded concurrency
//! - Reconciles parent and peer links after every conversion has finished
//! - Reports every failure against the source key and stage it happened at
//!
//! # Example
//!
//! ```rust,ignore
//! use j2l_core::{Migration, MigrationConfig};
//! use std::sync::Arc;
//!
//! # async fn example(source: Arc<dyn j2l_model::SourceTracker>, target: Arc<dyn j2l_model::TargetTracker>)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let config = MigrationConfig::from_path("j2lab.yaml")?;
//! let report = Migration::new(config, source, target).run().await?;
//!
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Run-scoped building blocks
pub mod attachments;
pub mod config;
pub mod correlation;
pub mod discover;
pub mod error;
pub mod identity;
pub mod pool;
pub mod provision;

// Conversion and reconciliation
pub mod convert;
pub mod links;
pub mod orchestrator;
pub mod report;

// Re-exports for convenience
pub use attachments::AttachmentResolver;
pub use config::{
    CommentFailurePolicy, CommentPolicy, ConcurrencyLimits, CustomFields, MigrationConfig, Secret, SourceConfig,
    TargetConfig,
};
pub use convert::{allowed_transitions, validate_transition, ConversionStage, ConvertedEntity, EntityConverter};
pub use correlation::{Correlated, CorrelationMap, SealedCorrelation};
pub use discover::{discover, PAGE_SIZE};
pub use error::{ConfigError, ErrorKind, MigrationError};
pub use identity::{referenced_identities, IdentityMap, IdentityResolver, NonMember, ReferencedIdentity};
pub use links::{map_link_type, LinkFailure, LinkReconciler, LinkReport};
pub use orchestrator::Migration;
pub use pool::{BatchOutcome, BoundedBatch};
pub use provision::{derive_labels, MilestoneBook, MilestoneOrigin, ProvisionedMilestone, Provisioner};
pub use report::{EntityFailure, KindReport, MigrationReport, MilestoneReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
