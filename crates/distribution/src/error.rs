use thiserror::Error;

/// Failure reaching an external collaborator (settings, attendance, analytics,
/// workload, task management).
///
/// These errors are caught at the narrowest point and degraded to neutral
/// defaults; they never leak into scoring arithmetic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("{collaborator} did not answer within {timeout_ms} ms")]
    Timeout {
        collaborator: &'static str,
        timeout_ms: u64,
    },

    #[error("{collaborator} returned malformed data: {reason}")]
    Malformed {
        collaborator: &'static str,
        reason: String,
    },

    /// The collaborator answered but refused the request (unknown record, wrong state).
    #[error("{collaborator} rejected the request: {reason}")]
    Rejected {
        collaborator: &'static str,
        reason: String,
    },
}

impl CollaboratorError {
    pub fn unavailable(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator,
            reason: reason.into(),
        }
    }

    pub fn malformed(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            collaborator,
            reason: reason.into(),
        }
    }

    pub fn rejected(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            collaborator,
            reason: reason.into(),
        }
    }

    pub fn collaborator(&self) -> &'static str {
        match self {
            Self::Unavailable { collaborator, .. }
            | Self::Timeout { collaborator, .. }
            | Self::Malformed { collaborator, .. }
            | Self::Rejected { collaborator, .. } => collaborator,
        }
    }
}

/// Engine-level error.
///
/// "No eligible candidate" and "unknown event type" are expected branches and are
/// never reported through this type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DistributionError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
