//! What happened to a generated task.

use serde::{Deserialize, Serialize};

use taskforge_core::UserId;

use crate::engine::AssignmentDecision;
use crate::error::DistributionError;

/// Lifecycle of one task definition inside a single event's pipeline.
///
/// `Generated → Scored → {AutoAssigned | PendingApproval}`, or `Unassigned` from
/// either of the first two states.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    Generated,
    Scored,
    AutoAssigned,
    PendingApproval,
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnassignedReason {
    /// Nobody was under the utilization maximum.
    NoCandidates,
    /// Scoring could not run (e.g. the roster was unreachable).
    AssignmentFailed { error: String },
}

/// Terminal result for one task definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    AutoAssigned { decision: AssignmentDecision },
    PendingApproval { decision: AssignmentDecision },
    Unassigned { reason: UnassignedReason },
}

impl AssignmentOutcome {
    /// Map the engine's selection result onto a terminal outcome.
    pub fn from_selection(selection: Result<Option<AssignmentDecision>, DistributionError>) -> Self {
        match selection {
            Ok(Some(decision)) if decision.auto_assign => Self::AutoAssigned { decision },
            Ok(Some(decision)) => Self::PendingApproval { decision },
            Ok(None) => Self::Unassigned {
                reason: UnassignedReason::NoCandidates,
            },
            Err(err) => Self::Unassigned {
                reason: UnassignedReason::AssignmentFailed {
                    error: err.to_string(),
                },
            },
        }
    }

    pub fn state(&self) -> AssignmentState {
        match self {
            Self::AutoAssigned { .. } => AssignmentState::AutoAssigned,
            Self::PendingApproval { .. } => AssignmentState::PendingApproval,
            Self::Unassigned { .. } => AssignmentState::Unassigned,
        }
    }

    pub fn decision(&self) -> Option<&AssignmentDecision> {
        match self {
            Self::AutoAssigned { decision } | Self::PendingApproval { decision } => Some(decision),
            Self::Unassigned { .. } => None,
        }
    }

    /// Suggested or actual assignee.
    pub fn assignee(&self) -> Option<UserId> {
        self.decision().map(|d| d.user_id)
    }
}
