use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskforge_core::{TaskId, UserId};

/// Entries kept by [`DistributionLog::default`].
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

/// How a task reached its assignee.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    Auto,
    Approval,
    Reassign,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub task_id: TaskId,
    pub assigned_to: UserId,
    pub method: AssignmentMethod,
    pub at: DateTime<Utc>,
}

/// Append-only record of the most recent assignments made through the board.
/// Once `capacity` entries are held, each new entry evicts the oldest.
#[derive(Debug)]
pub struct DistributionLog {
    capacity: usize,
    entries: RwLock<VecDeque<LogEntry>>,
}

impl Default for DistributionLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl DistributionLog {
    /// `capacity` is at least 1.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, task_id: TaskId, assigned_to: UserId, method: AssignmentMethod) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            task_id,
            assigned_to,
            method,
            at: Utc::now(),
        });
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
