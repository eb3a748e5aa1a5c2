//! In-memory task management: the receiving end of the engine.
//!
//! The board owns the employee roster, every created task, the manager approval
//! queue and the distribution log. Utilization is the open workload of a user
//! measured against a fixed daily capacity.
//!
//! Tasks and unassigned definitions are kept for the life of the process; the
//! board backs tests, replays and single-process runs, not long-lived services.
//! Only the distribution log is bounded (see [`DEFAULT_LOG_CAPACITY`]).

pub mod approvals;
pub mod log;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use taskforge_core::{ApprovalId, DomainError, DomainResult, TaskId, UserId};
use taskforge_distribution::{
    AssignmentOutcome, CollaboratorError, CompletedTask, OpenTask, TaskDefinition, TaskManagement, WorkloadSource,
};

pub use approvals::{ApprovalQueue, ApprovalRequest, ApprovalStatus};
pub use log::{AssignmentMethod, DEFAULT_LOG_CAPACITY, DistributionLog, LogEntry};

const BOARD: &str = "task board";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardTask {
    pub task_id: TaskId,
    pub definition: TaskDefinition,
    pub assigned_to: UserId,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Creation time plus the estimated duration.
    pub due_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BoardTask {
    fn is_open_for(&self, user_id: UserId) -> bool {
        self.status == TaskStatus::Open && self.assigned_to == user_id
    }

    /// Completed no later than `due_at`. Open tasks are not on time yet.
    pub fn on_time(&self) -> bool {
        self.completed_at.is_some_and(|at| at <= self.due_at)
    }
}

#[derive(Debug, Default)]
struct BoardState {
    roster: Vec<UserId>,
    tasks: Vec<BoardTask>,
    unassigned: Vec<TaskDefinition>,
}

#[derive(Debug)]
pub struct InMemoryTaskBoard {
    capacity_minutes: u32,
    state: RwLock<BoardState>,
    approvals: ApprovalQueue,
    log: DistributionLog,
}

impl InMemoryTaskBoard {
    /// `capacity_minutes` is one employee's daily capacity (minimum 1).
    pub fn new(capacity_minutes: u32) -> Self {
        Self {
            capacity_minutes: capacity_minutes.max(1),
            state: RwLock::new(BoardState::default()),
            approvals: ApprovalQueue::default(),
            log: DistributionLog::default(),
        }
    }

    pub fn with_users(self, users: impl IntoIterator<Item = UserId>) -> Self {
        for user_id in users {
            self.add_user(user_id);
        }
        self
    }

    pub fn add_user(&self, user_id: UserId) {
        let mut state = self.write();
        if !state.roster.contains(&user_id) {
            state.roster.push(user_id);
        }
    }

    /// Take a user off the roster; their tasks stay where they are.
    pub fn deactivate_user(&self, user_id: UserId) {
        self.write().roster.retain(|u| *u != user_id);
    }

    pub fn roster(&self) -> Vec<UserId> {
        self.read().roster.clone()
    }

    pub fn task(&self, task_id: TaskId) -> Option<BoardTask> {
        self.read().tasks.iter().find(|t| t.task_id == task_id).cloned()
    }

    /// All tasks in creation order.
    pub fn tasks(&self) -> Vec<BoardTask> {
        self.read().tasks.clone()
    }

    /// Definitions nobody could take.
    pub fn unassigned(&self) -> Vec<TaskDefinition> {
        self.read().unassigned.clone()
    }

    /// Minutes of open work currently carried by a user.
    pub fn open_minutes(&self, user_id: UserId) -> u64 {
        self.read()
            .tasks
            .iter()
            .filter(|t| t.is_open_for(user_id))
            .map(|t| u64::from(t.definition.estimated_minutes))
            .sum()
    }

    /// Mark a task done now, releasing the assignee's workload.
    pub fn complete_task(&self, task_id: TaskId) -> DomainResult<BoardTask> {
        self.complete_task_at(task_id, Utc::now())
    }

    pub fn complete_task_at(&self, task_id: TaskId, completed_at: DateTime<Utc>) -> DomainResult<BoardTask> {
        let mut state = self.write();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.task_id == task_id)
            .ok_or_else(DomainError::not_found)?;

        if task.status == TaskStatus::Completed {
            return Err(DomainError::conflict(format!("task {task_id} already completed")));
        }

        task.status = TaskStatus::Completed;
        task.completed_at = Some(completed_at);
        debug!(task_id = %task_id, user_id = %task.assigned_to, on_time = task.on_time(), "task completed");
        Ok(task.clone())
    }

    pub fn pending_approvals(&self) -> Vec<ApprovalRequest> {
        self.approvals.pending()
    }

    pub fn approval(&self, id: ApprovalId) -> Option<ApprovalRequest> {
        self.approvals.get(id)
    }

    /// Create the task behind a pending approval for the suggested user, or for
    /// `override_user` when given.
    pub fn approve(
        &self,
        id: ApprovalId,
        manager: UserId,
        override_user: Option<UserId>,
    ) -> DomainResult<TaskId> {
        let (task_id, assignee) = self.approvals.approve(id, manager, override_user, |definition, assignee| {
            self.create_task(definition, assignee, AssignmentMethod::Approval)
        })?;

        info!(approval_id = %id, task_id = %task_id, user_id = %assignee, manager = %manager, "approval granted");
        Ok(task_id)
    }

    pub fn reject(&self, id: ApprovalId, manager: UserId) -> DomainResult<()> {
        self.approvals.reject(id, manager)?;
        info!(approval_id = %id, manager = %manager, "approval rejected");
        Ok(())
    }

    /// Newest assignments first.
    pub fn distribution_log(&self, limit: usize) -> Vec<LogEntry> {
        self.log.recent(limit)
    }

    fn create_task(&self, definition: &TaskDefinition, assignee: UserId, method: AssignmentMethod) -> TaskId {
        let created_at = Utc::now();
        let task = BoardTask {
            task_id: TaskId::new(),
            definition: definition.clone(),
            assigned_to: assignee,
            status: TaskStatus::Open,
            created_at,
            due_at: created_at + Duration::minutes(i64::from(definition.estimated_minutes)),
            completed_at: None,
        };
        let task_id = task.task_id;

        self.write().tasks.push(task);
        self.log.record(task_id, assignee, method);
        task_id
    }

    fn read(&self) -> RwLockReadGuard<'_, BoardState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BoardState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TaskManagement for InMemoryTaskBoard {
    async fn submit(
        &self,
        definition: &TaskDefinition,
        outcome: &AssignmentOutcome,
    ) -> Result<Option<TaskId>, CollaboratorError> {
        match outcome {
            AssignmentOutcome::AutoAssigned { decision } => Ok(Some(self.create_task(
                definition,
                decision.user_id,
                AssignmentMethod::Auto,
            ))),
            AssignmentOutcome::PendingApproval { decision } => {
                let approval_id = self.approvals.enqueue(definition, decision);
                debug!(approval_id = %approval_id, suggested = %decision.user_id, "queued for approval");
                Ok(None)
            }
            AssignmentOutcome::Unassigned { .. } => {
                self.write().unassigned.push(definition.clone());
                Ok(None)
            }
        }
    }

    async fn open_tasks(&self, user_id: UserId) -> Result<Vec<OpenTask>, CollaboratorError> {
        Ok(self
            .read()
            .tasks
            .iter()
            .filter(|t| t.is_open_for(user_id))
            .map(|t| OpenTask {
                task_id: t.task_id,
                task_kind: t.definition.task_kind,
                title: t.definition.title.clone(),
                priority: t.definition.priority,
                estimated_minutes: t.definition.estimated_minutes,
            })
            .collect())
    }

    async fn reassign(&self, task_id: TaskId, to: UserId) -> Result<(), CollaboratorError> {
        {
            let mut state = self.write();
            let task = state
                .tasks
                .iter_mut()
                .find(|t| t.task_id == task_id)
                .ok_or_else(|| CollaboratorError::rejected(BOARD, format!("unknown task {task_id}")))?;

            if task.status != TaskStatus::Open {
                return Err(CollaboratorError::rejected(BOARD, format!("task {task_id} is not open")));
            }
            task.assigned_to = to;
        }

        self.log.record(task_id, to, AssignmentMethod::Reassign);
        Ok(())
    }

    async fn complete(
        &self,
        task_id: TaskId,
        completed_at: DateTime<Utc>,
    ) -> Result<CompletedTask, CollaboratorError> {
        let task = self
            .complete_task_at(task_id, completed_at)
            .map_err(|err| CollaboratorError::rejected(BOARD, format!("task {task_id}: {err}")))?;

        Ok(CompletedTask {
            task_id,
            user_id: task.assigned_to,
            task_kind: task.definition.task_kind,
            on_time: task.on_time(),
        })
    }
}

#[async_trait]
impl WorkloadSource for InMemoryTaskBoard {
    async fn active_users(&self) -> Result<Vec<UserId>, CollaboratorError> {
        Ok(self.roster())
    }

    async fn utilization(&self, user_id: UserId) -> Result<f64, CollaboratorError> {
        Ok(self.open_minutes(user_id) as f64 / f64::from(self.capacity_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_distribution::{AssignmentDecision, ScoreBreakdown, TaskKind, UnassignedReason};

    fn decision(user_id: UserId, auto_assign: bool) -> AssignmentDecision {
        AssignmentDecision {
            user_id,
            score: 0.9,
            auto_assign,
            breakdown: ScoreBreakdown {
                skill: 1.0,
                workload: 1.0,
                history: 0.5,
                availability: 1.0,
            },
            alternatives: Vec::new(),
        }
    }

    fn cleaning(minutes: u32) -> TaskDefinition {
        TaskDefinition::new(TaskKind::Cleaning, "Clean", "تنظيف").with_estimated_minutes(minutes)
    }

    #[tokio::test]
    async fn auto_assigned_work_counts_towards_utilization() {
        let u = UserId::new();
        let board = InMemoryTaskBoard::new(480).with_users([u]);

        let outcome = AssignmentOutcome::AutoAssigned { decision: decision(u, true) };
        let task_id = board.submit(&cleaning(120), &outcome).await.unwrap().unwrap();

        assert_eq!(board.utilization(u).await.unwrap(), 0.25);
        assert_eq!(board.open_tasks(u).await.unwrap()[0].task_id, task_id);
        assert_eq!(board.distribution_log(10)[0].method, AssignmentMethod::Auto);

        board.complete_task(task_id).unwrap();
        assert_eq!(board.utilization(u).await.unwrap(), 0.0);
        assert!(matches!(board.complete_task(task_id), Err(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn pending_and_unassigned_outcomes_create_no_task() {
        let u = UserId::new();
        let board = InMemoryTaskBoard::new(480).with_users([u]);

        let pending = AssignmentOutcome::PendingApproval { decision: decision(u, false) };
        let nobody = AssignmentOutcome::Unassigned {
            reason: UnassignedReason::NoCandidates,
        };

        assert_eq!(board.submit(&cleaning(30), &pending).await.unwrap(), None);
        assert_eq!(board.submit(&cleaning(30), &nobody).await.unwrap(), None);

        assert!(board.tasks().is_empty());
        assert_eq!(board.pending_approvals().len(), 1);
        assert_eq!(board.unassigned().len(), 1);
    }

    #[tokio::test]
    async fn approval_creates_the_task_for_the_override_user() {
        let (suggested, chosen, manager) = (UserId::new(), UserId::new(), UserId::new());
        let board = InMemoryTaskBoard::new(480).with_users([suggested, chosen]);

        let pending = AssignmentOutcome::PendingApproval {
            decision: decision(suggested, false),
        };
        board.submit(&cleaning(60), &pending).await.unwrap();
        let approval = board.pending_approvals()[0].id;

        let task_id = board.approve(approval, manager, Some(chosen)).unwrap();

        assert_eq!(board.task(task_id).unwrap().assigned_to, chosen);
        assert_eq!(board.distribution_log(1)[0].method, AssignmentMethod::Approval);
        assert_eq!(board.approval(approval).unwrap().status, ApprovalStatus::Approved);
        assert!(matches!(
            board.approve(approval, manager, None),
            Err(DomainError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn reassign_moves_open_work_and_logs_it() {
        let (from, to) = (UserId::new(), UserId::new());
        let board = InMemoryTaskBoard::new(100).with_users([from, to]);
        let outcome = AssignmentOutcome::AutoAssigned { decision: decision(from, true) };
        let task_id = board.submit(&cleaning(50), &outcome).await.unwrap().unwrap();

        board.reassign(task_id, to).await.unwrap();

        assert_eq!(board.utilization(from).await.unwrap(), 0.0);
        assert_eq!(board.utilization(to).await.unwrap(), 0.5);
        assert_eq!(board.distribution_log(1)[0].method, AssignmentMethod::Reassign);

        let missing = board.reassign(TaskId::new(), to).await.unwrap_err();
        assert!(matches!(missing, CollaboratorError::Rejected { .. }));
    }

    #[tokio::test]
    async fn completion_is_on_time_until_the_estimate_runs_out() {
        let u = UserId::new();
        let board = InMemoryTaskBoard::new(480).with_users([u]);
        let outcome = AssignmentOutcome::AutoAssigned { decision: decision(u, true) };
        let quick = board.submit(&cleaning(30), &outcome).await.unwrap().unwrap();
        let slow = board.submit(&cleaning(30), &outcome).await.unwrap().unwrap();

        let due = board.task(quick).unwrap().due_at;
        assert_eq!(due - board.task(quick).unwrap().created_at, Duration::minutes(30));

        let done = board.complete(quick, due).await.unwrap();
        assert!(done.on_time);
        assert_eq!(done.user_id, u);
        assert_eq!(done.task_kind, TaskKind::Cleaning);

        let late = board.complete(slow, due + Duration::hours(2)).await.unwrap();
        assert!(!late.on_time);

        let again = board.complete(quick, due).await.unwrap_err();
        assert!(matches!(again, CollaboratorError::Rejected { .. }));
    }

    #[test]
    fn roster_ignores_duplicates_and_supports_deactivation() {
        let (a, b) = (UserId::new(), UserId::new());
        let board = InMemoryTaskBoard::new(480).with_users([a, b, a]);

        assert_eq!(board.roster(), vec![a, b]);
        board.deactivate_user(a);
        assert_eq!(board.roster(), vec![b]);
    }
}
