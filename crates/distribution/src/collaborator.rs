//! Contracts of the external systems the engine consumes.
//!
//! The engine only reads from these (plus the settings write on config update and
//! the final hand-off to task management). Every call is bounded with
//! [`bounded`] so a stalled collaborator cannot stall event handling.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use taskforge_core::{TaskId, UserId};

use crate::error::CollaboratorError;
use crate::outcome::AssignmentOutcome;
use crate::task::{CompletedTask, OpenTask, SkillProfile, TaskDefinition, TaskKind};

/// Default upper bound for a single collaborator call.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Key/value settings persistence.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, CollaboratorError>;

    async fn set(&self, key: &str, value: JsonValue) -> Result<(), CollaboratorError>;
}

/// Attendance point query.
#[async_trait]
pub trait AttendanceSource: Send + Sync {
    /// Does the user have a presence record for `date`?
    async fn has_presence(&self, user_id: UserId, date: NaiveDate) -> Result<bool, CollaboratorError>;
}

/// Skill and history analytics. The engine consumes these values and feeds back
/// completion outcomes, but never derives scores from raw activity logs itself.
#[async_trait]
pub trait SkillAnalytics: Send + Sync {
    /// Recorded proficiencies (0–100). Skills without a record are simply absent.
    async fn proficiencies(&self, user_id: UserId) -> Result<SkillProfile, CollaboratorError>;

    /// Historical performance (0–1) on a task kind, `None` without history.
    async fn history_score(
        &self,
        user_id: UserId,
        task_kind: TaskKind,
    ) -> Result<Option<f64>, CollaboratorError>;

    /// Fold one finished task into the user's history for its kind.
    async fn record_completion(
        &self,
        user_id: UserId,
        task_kind: TaskKind,
        on_time: bool,
    ) -> Result<(), CollaboratorError>;
}

/// Roster and current load of employees.
#[async_trait]
pub trait WorkloadSource: Send + Sync {
    /// Active users, in the source's own order.
    async fn active_users(&self) -> Result<Vec<UserId>, CollaboratorError>;

    /// Fraction of the user's capacity consumed by open work (may exceed 1).
    async fn utilization(&self, user_id: UserId) -> Result<f64, CollaboratorError>;
}

/// Receives generated work and owns the persisted task lifecycle.
#[async_trait]
pub trait TaskManagement: Send + Sync {
    /// Persist a generated task. Returns the created task id when a task was created
    /// immediately (auto-assigned); approvals and unassigned work are queued by the
    /// collaborator and yield `None`.
    async fn submit(
        &self,
        definition: &TaskDefinition,
        outcome: &AssignmentOutcome,
    ) -> Result<Option<TaskId>, CollaboratorError>;

    /// Open (not completed) tasks currently assigned to a user.
    async fn open_tasks(&self, user_id: UserId) -> Result<Vec<OpenTask>, CollaboratorError>;

    async fn reassign(&self, task_id: TaskId, to: UserId) -> Result<(), CollaboratorError>;

    /// Close an open task at `completed_at` and report whether it met its due time.
    async fn complete(
        &self,
        task_id: TaskId,
        completed_at: DateTime<Utc>,
    ) -> Result<CompletedTask, CollaboratorError>;
}

/// Run a collaborator call with an upper time bound.
pub async fn bounded<T, F>(
    collaborator: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            collaborator,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
