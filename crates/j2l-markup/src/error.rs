//! Translation failures

/// A rule rejected its input; translation of the owning text stops
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkupError {
    /// `[~identity]` or a mention node with no target account
    #[error("unresolved mention `{0}`")]
    UnresolvedMention(String),

    /// A table body row does not have as many cells as the header
    #[error("malformed table: row {row} has {found} columns, header has {expected}")]
    TableColumnMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
}

impl MarkupError {
    /// Identity named by an unresolved mention
    #[must_use]
    pub fn unresolved_identity(&self) -> Option<&str> {
        match self {
            Self::UnresolvedMention(identity) => Some(identity),
            Self::TableColumnMismatch { .. } => None,
        }
    }
}
