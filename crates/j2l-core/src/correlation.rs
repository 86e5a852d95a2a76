//! Source key to target entity correlation
//!
//! Filled by the conversion batches, each key written exactly once, then
//! sealed into a read-only view for link reconciliation.

use crate::error::MigrationError;
use j2l_model::{EntityKind, SourceIssue, TargetEntity};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One converted entity: its source record and its target handle
#[derive(Debug, Clone)]
pub struct Correlated {
    pub source: Arc<SourceIssue>,
    pub target: TargetEntity,
}

type Table = BTreeMap<String, Correlated>;

/// Write-once correlation table shared by concurrent conversions
#[derive(Debug, Default)]
pub struct CorrelationMap {
    epics: RwLock<Table>,
    issues: RwLock<Table>,
}

impl CorrelationMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: EntityKind) -> &RwLock<Table> {
        match kind {
            EntityKind::Epic => &self.epics,
            EntityKind::Issue => &self.issues,
        }
    }

    /// Record a converted entity
    ///
    /// # Errors
    /// [`MigrationError::DuplicateCorrelation`] if the key is already recorded.
    pub fn record(&self, source: Arc<SourceIssue>, target: TargetEntity) -> Result<(), MigrationError> {
        let mut table = self.table(source.kind).write();
        if table.contains_key(&source.key) {
            return Err(MigrationError::DuplicateCorrelation(source.key.clone()));
        }
        table.insert(source.key.clone(), Correlated { source, target });
        Ok(())
    }

    #[must_use]
    pub fn len(&self, kind: EntityKind) -> usize {
        self.table(kind).read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epics.read().is_empty() && self.issues.read().is_empty()
    }

    /// Freeze the map; no further records are accepted
    #[must_use]
    pub fn seal(self) -> SealedCorrelation {
        SealedCorrelation {
            epics: self.epics.into_inner(),
            issues: self.issues.into_inner(),
        }
    }
}

/// Read-only correlation view used once every conversion has finished
#[derive(Debug, Clone, Default)]
pub struct SealedCorrelation {
    epics: Table,
    issues: Table,
}

impl SealedCorrelation {
    #[must_use]
    pub fn get(&self, kind: EntityKind, key: &str) -> Option<&Correlated> {
        match kind {
            EntityKind::Epic => self.epics.get(key),
            EntityKind::Issue => self.issues.get(key),
        }
    }

    /// Look up a key in either table
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&Correlated> {
        self.epics.get(key).or_else(|| self.issues.get(key))
    }

    /// Every correlated entity, epics first, each table in key order
    pub fn iter(&self) -> impl Iterator<Item = &Correlated> {
        self.epics.values().chain(self.issues.values())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.epics.len() + self.issues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
