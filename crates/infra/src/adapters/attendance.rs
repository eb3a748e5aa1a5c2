use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use taskforge_core::UserId;
use taskforge_distribution::{AttendanceSource, CollaboratorError};

/// Status of one attendance record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    /// Late still counts as being at work.
    pub fn is_presence(&self) -> bool {
        !matches!(self, AttendanceStatus::Absent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Absent => "absent",
        }
    }
}

/// In-memory attendance sheet, one record per (user, date).
#[derive(Debug, Default)]
pub struct InMemoryAttendance {
    records: RwLock<HashMap<(UserId, NaiveDate), AttendanceStatus>>,
}

impl InMemoryAttendance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the record for `date`.
    pub fn record(&self, user_id: UserId, date: NaiveDate, status: AttendanceStatus) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert((user_id, date), status);
    }

    pub fn status_on(&self, user_id: UserId, date: NaiveDate) -> Option<AttendanceStatus> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(&(user_id, date)).copied()
    }

    /// Users explicitly marked absent on `date`, sorted by id.
    pub fn absent_on(&self, date: NaiveDate) -> Vec<UserId> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut absent: Vec<UserId> = records
            .iter()
            .filter(|((_, d), status)| *d == date && **status == AttendanceStatus::Absent)
            .map(|((user_id, _), _)| *user_id)
            .collect();
        absent.sort();
        absent
    }
}

#[async_trait]
impl AttendanceSource for InMemoryAttendance {
    async fn has_presence(&self, user_id: UserId, date: NaiveDate) -> Result<bool, CollaboratorError> {
        Ok(self
            .status_on(user_id, date)
            .is_some_and(|status| status.is_presence()))
    }
}
