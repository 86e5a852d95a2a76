//! Typed failures returned by tracker clients

/// A failed tracker operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// The resource already exists (name conflict)
    #[error("{operation}: already exists")]
    Conflict { operation: String },

    /// The addressed resource does not exist
    #[error("{operation}: not found")]
    NotFound { operation: String },

    /// Unexpected HTTP status
    #[error("{operation}: unexpected status {status}: {message}")]
    Status {
        operation: String,
        status: u16,
        message: String,
    },

    /// Network or protocol failure before a status was received
    #[error("{operation}: transport failure: {message}")]
    Transport { operation: String, message: String },
}

impl TrackerError {
    #[must_use]
    pub fn conflict(operation: impl Into<String>) -> Self {
        Self::Conflict {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn not_found(operation: impl Into<String>) -> Self {
        Self::NotFound {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn status(operation: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether this failure means the resource is already there.
    ///
    /// The target answers a duplicate label or milestone with either 409 or
    /// 400 depending on the endpoint.
    #[inline]
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Status { status: 400 | 409, .. }
        )
    }

    /// Name of the failed operation
    #[must_use]
    pub fn operation(&self) -> &str {
        match self {
            Self::Conflict { operation }
            | Self::NotFound { operation }
            | Self::Status { operation, .. }
            | Self::Transport { operation, .. } => operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_statuses_count_as_existing() {
        assert!(TrackerError::conflict("create label").is_already_exists());
        assert!(TrackerError::status("create label", 409, "taken").is_already_exists());
        assert!(TrackerError::status("create label", 400, "has already been taken").is_already_exists());
        assert!(!TrackerError::status("create label", 500, "boom").is_already_exists());
        assert!(!TrackerError::transport("create label", "reset").is_already_exists());
    }

    #[test]
    fn display_names_operation() {
        let err = TrackerError::status("create issue", 502, "bad gateway");
        assert_eq!(err.to_string(), "create issue: unexpected status 502: bad gateway");
        assert_eq!(err.operation(), "create issue");
    }
}
