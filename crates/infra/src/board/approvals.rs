//! Manager approval queue for work the engine may not auto-assign.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskforge_core::{ApprovalId, DomainError, DomainResult, TaskId, UserId};
use taskforge_distribution::{AssignmentDecision, TaskDefinition};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub definition: TaskDefinition,
    pub suggested_user: UserId,
    pub suggested_score: f64,
    pub status: ApprovalStatus,
    pub decided_by: Option<UserId>,
    pub created_task: Option<TaskId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ApprovalQueue {
    requests: RwLock<Vec<ApprovalRequest>>,
}

impl ApprovalQueue {
    pub fn enqueue(&self, definition: &TaskDefinition, decision: &AssignmentDecision) -> ApprovalId {
        let request = ApprovalRequest {
            id: ApprovalId::new(),
            definition: definition.clone(),
            suggested_user: decision.user_id,
            suggested_score: decision.score,
            status: ApprovalStatus::Pending,
            decided_by: None,
            created_task: None,
            created_at: Utc::now(),
        };
        let id = request.id;

        let mut requests = self.requests.write().unwrap_or_else(PoisonError::into_inner);
        requests.push(request);
        id
    }

    pub fn get(&self, id: ApprovalId) -> Option<ApprovalRequest> {
        let requests = self.requests.read().unwrap_or_else(PoisonError::into_inner);
        requests.iter().find(|r| r.id == id).cloned()
    }

    /// Pending requests, newest first.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let requests = self.requests.read().unwrap_or_else(PoisonError::into_inner);
        requests
            .iter()
            .rev()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .cloned()
            .collect()
    }

    /// Approve a pending request. `create` receives the definition and the final
    /// assignee (override or suggestion) and must return the created task.
    ///
    /// The queue stays locked while `create` runs, so a request is approved at
    /// most once.
    pub fn approve(
        &self,
        id: ApprovalId,
        manager: UserId,
        override_user: Option<UserId>,
        create: impl FnOnce(&TaskDefinition, UserId) -> TaskId,
    ) -> DomainResult<(TaskId, UserId)> {
        let mut requests = self.requests.write().unwrap_or_else(PoisonError::into_inner);
        let request = pending_mut(&mut requests, id)?;

        let assignee = override_user.unwrap_or(request.suggested_user);
        let task_id = create(&request.definition, assignee);

        request.status = ApprovalStatus::Approved;
        request.decided_by = Some(manager);
        request.created_task = Some(task_id);
        Ok((task_id, assignee))
    }

    pub fn reject(&self, id: ApprovalId, manager: UserId) -> DomainResult<()> {
        let mut requests = self.requests.write().unwrap_or_else(PoisonError::into_inner);
        let request = pending_mut(&mut requests, id)?;

        request.status = ApprovalStatus::Rejected;
        request.decided_by = Some(manager);
        Ok(())
    }
}

fn pending_mut(requests: &mut [ApprovalRequest], id: ApprovalId) -> DomainResult<&mut ApprovalRequest> {
    let request = requests
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(DomainError::not_found)?;

    if request.status != ApprovalStatus::Pending {
        return Err(DomainError::conflict(format!(
            "approval {id} already {:?}",
            request.status
        )));
    }
    Ok(request)
}
