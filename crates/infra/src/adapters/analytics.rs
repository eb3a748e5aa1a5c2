use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use taskforge_core::UserId;
use taskforge_distribution::{CollaboratorError, Skill, SkillAnalytics, SkillProfile, TaskKind};

/// Completion counters for one (user, task kind).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionStats {
    pub total: u32,
    pub on_time: u32,
}

impl CompletionStats {
    /// Laplace-smoothed on-time rate: no history gives exactly 0.5.
    pub fn score(&self) -> f64 {
        (f64::from(self.on_time) + 1.0) / (f64::from(self.total) + 2.0)
    }
}

/// In-memory skill analytics fed by manual ratings and completion feedback.
#[derive(Debug, Default)]
pub struct InMemorySkillAnalytics {
    profiles: RwLock<HashMap<UserId, SkillProfile>>,
    completions: RwLock<HashMap<(UserId, TaskKind), CompletionStats>>,
}

impl InMemorySkillAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rate a user on a skill; values above 100 are capped.
    pub fn set_proficiency(&self, user_id: UserId, skill: Skill, proficiency: u8) {
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        profiles
            .entry(user_id)
            .or_default()
            .insert(skill, proficiency.min(100));
    }

    pub fn completion_stats(&self, user_id: UserId, task_kind: TaskKind) -> CompletionStats {
        let completions = self.completions.read().unwrap_or_else(PoisonError::into_inner);
        completions.get(&(user_id, task_kind)).copied().unwrap_or_default()
    }
}

#[async_trait]
impl SkillAnalytics for InMemorySkillAnalytics {
    async fn proficiencies(&self, user_id: UserId) -> Result<SkillProfile, CollaboratorError> {
        let profiles = self.profiles.read().unwrap_or_else(PoisonError::into_inner);
        Ok(profiles.get(&user_id).cloned().unwrap_or_default())
    }

    async fn history_score(
        &self,
        user_id: UserId,
        task_kind: TaskKind,
    ) -> Result<Option<f64>, CollaboratorError> {
        let completions = self.completions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(completions.get(&(user_id, task_kind)).map(CompletionStats::score))
    }

    async fn record_completion(
        &self,
        user_id: UserId,
        task_kind: TaskKind,
        on_time: bool,
    ) -> Result<(), CollaboratorError> {
        let mut completions = self.completions.write().unwrap_or_else(PoisonError::into_inner);
        let stats = completions.entry((user_id, task_kind)).or_default();
        stats.total = stats.total.saturating_add(1);
        if on_time {
            stats.on_time = stats.on_time.saturating_add(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn history_tracks_on_time_completions() {
        let analytics = InMemorySkillAnalytics::new();
        let u = UserId::new();

        assert_eq!(analytics.history_score(u, TaskKind::Delivery).await.unwrap(), None);

        analytics.record_completion(u, TaskKind::Delivery, true).await.unwrap();
        analytics.record_completion(u, TaskKind::Delivery, true).await.unwrap();
        analytics.record_completion(u, TaskKind::Delivery, false).await.unwrap();

        // (2 + 1) / (3 + 2)
        assert_eq!(analytics.history_score(u, TaskKind::Delivery).await.unwrap(), Some(0.6));
        assert_eq!(analytics.history_score(u, TaskKind::Cleaning).await.unwrap(), None);
        assert_eq!(
            analytics.completion_stats(u, TaskKind::Delivery),
            CompletionStats { total: 3, on_time: 2 }
        );
    }

    #[tokio::test]
    async fn proficiency_is_capped() {
        let analytics = InMemorySkillAnalytics::new();
        let u = UserId::new();

        analytics.set_proficiency(u, Skill::Sales, 180);
        let profile = analytics.proficiencies(u).await.unwrap();

        assert_eq!(profile[&Skill::Sales], 100);
        assert!(!profile.contains_key(&Skill::Delivery));
    }

    proptest! {
        #[test]
        fn completion_score_stays_strictly_inside_unit_range(outcomes in prop::collection::vec(any::<bool>(), 0..64)) {
            let mut stats = CompletionStats::default();
            for on_time in outcomes {
                stats.total += 1;
                stats.on_time += u32::from(on_time);
            }

            let score = stats.score();
            prop_assert!(score > 0.0 && score < 1.0);
        }
    }
}
