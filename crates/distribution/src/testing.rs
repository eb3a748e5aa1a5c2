//! In-crate test doubles for the collaborator traits.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use taskforge_core::UserId;

use crate::collaborator::{AttendanceSource, SettingsStore, SkillAnalytics, WorkloadSource};
use crate::config::DistributionConfigStore;
use crate::error::CollaboratorError;
use crate::task::{Skill, SkillProfile, TaskKind};

pub fn user(n: u128) -> UserId {
    UserId::from_uuid(Uuid::from_u128(n))
}

#[derive(Default)]
pub struct FakeSettings {
    values: Mutex<HashMap<String, JsonValue>>,
}

#[async_trait]
impl SettingsStore for FakeSettings {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, CollaboratorError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: JsonValue) -> Result<(), CollaboratorError> {
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

pub fn config_store() -> Arc<DistributionConfigStore> {
    Arc::new(DistributionConfigStore::new(Arc::new(FakeSettings::default())))
}

#[derive(Default)]
pub struct FakeAnalytics {
    profiles: HashMap<UserId, SkillProfile>,
    history: HashMap<(UserId, TaskKind), f64>,
    failing: HashSet<UserId>,
    panicking: HashSet<UserId>,
    pub completions: Mutex<Vec<(UserId, TaskKind, bool)>>,
}

impl FakeAnalytics {
    pub fn skill(mut self, user_id: UserId, skill: Skill, proficiency: u8) -> Self {
        self.profiles.entry(user_id).or_default().insert(skill, proficiency);
        self
    }

    pub fn history(mut self, user_id: UserId, kind: TaskKind, score: f64) -> Self {
        self.history.insert((user_id, kind), score);
        self
    }

    pub fn failing_for(mut self, user_id: UserId) -> Self {
        self.failing.insert(user_id);
        self
    }

    pub fn panicking_for(mut self, user_id: UserId) -> Self {
        self.panicking.insert(user_id);
        self
    }
}

#[async_trait]
impl SkillAnalytics for FakeAnalytics {
    async fn proficiencies(&self, user_id: UserId) -> Result<SkillProfile, CollaboratorError> {
        if self.panicking.contains(&user_id) {
            panic!("skill analytics blew up for {user_id}");
        }
        if self.failing.contains(&user_id) {
            return Err(CollaboratorError::unavailable("skill analytics", "down"));
        }
        Ok(self.profiles.get(&user_id).cloned().unwrap_or_default())
    }

    async fn history_score(
        &self,
        user_id: UserId,
        task_kind: TaskKind,
    ) -> Result<Option<f64>, CollaboratorError> {
        if self.failing.contains(&user_id) {
            return Err(CollaboratorError::unavailable("skill analytics", "down"));
        }
        Ok(self.history.get(&(user_id, task_kind)).copied())
    }

    async fn record_completion(
        &self,
        user_id: UserId,
        task_kind: TaskKind,
        on_time: bool,
    ) -> Result<(), CollaboratorError> {
        if self.failing.contains(&user_id) {
            return Err(CollaboratorError::unavailable("skill analytics", "down"));
        }
        self.completions.lock().unwrap().push((user_id, task_kind, on_time));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeWorkload {
    users: Vec<UserId>,
    utilization: HashMap<UserId, f64>,
    failing: HashSet<UserId>,
    roster_down: bool,
}

impl FakeWorkload {
    pub fn user(mut self, user_id: UserId, utilization: f64) -> Self {
        self.users.push(user_id);
        self.utilization.insert(user_id, utilization);
        self
    }

    pub fn failing_for(mut self, user_id: UserId) -> Self {
        self.users.push(user_id);
        self.failing.insert(user_id);
        self
    }

    pub fn roster_down(mut self) -> Self {
        self.roster_down = true;
        self
    }
}

#[async_trait]
impl WorkloadSource for FakeWorkload {
    async fn active_users(&self) -> Result<Vec<UserId>, CollaboratorError> {
        if self.roster_down {
            return Err(CollaboratorError::unavailable("workload", "down"));
        }
        Ok(self.users.clone())
    }

    async fn utilization(&self, user_id: UserId) -> Result<f64, CollaboratorError> {
        if self.failing.contains(&user_id) {
            return Err(CollaboratorError::unavailable("workload", "down"));
        }
        Ok(self.utilization.get(&user_id).copied().unwrap_or(0.0))
    }
}

#[derive(Default)]
pub struct FakeAttendance {
    present: HashSet<(UserId, NaiveDate)>,
    failing: bool,
    stall: Option<Duration>,
}

impl FakeAttendance {
    pub fn present(mut self, user_id: UserId, date: NaiveDate) -> Self {
        self.present.insert((user_id, date));
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn stalling(mut self, stall: Duration) -> Self {
        self.stall = Some(stall);
        self
    }
}

#[async_trait]
impl AttendanceSource for FakeAttendance {
    async fn has_presence(&self, user_id: UserId, date: NaiveDate) -> Result<bool, CollaboratorError> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        if self.failing {
            return Err(CollaboratorError::unavailable("attendance", "down"));
        }
        Ok(self.present.contains(&(user_id, date)))
    }
}
