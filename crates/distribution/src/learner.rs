//! Skill fit and historical performance lookups.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use taskforge_core::UserId;

use crate::collaborator::{DEFAULT_LOOKUP_TIMEOUT, SkillAnalytics, bounded};
use crate::error::CollaboratorError;
use crate::task::{DEFAULT_PROFICIENCY, Skill, SkillProfile, TaskKind};

/// History score for users or task kinds without any record. Neutral rather than
/// zero so new hires are not starved of work.
pub const NEUTRAL_HISTORY_SCORE: f64 = 0.5;

/// Reads proficiency and history signals from the analytics collaborator.
pub struct SkillHistoryLearner {
    analytics: Arc<dyn SkillAnalytics>,
    timeout: Duration,
}

impl SkillHistoryLearner {
    pub fn new(analytics: Arc<dyn SkillAnalytics>) -> Self {
        Self {
            analytics,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Mean of `proficiency / 100` over `required`. Unknown skills count as
    /// [`DEFAULT_PROFICIENCY`]; no required skills is a perfect 1.0.
    pub async fn skill_match_score(&self, user_id: UserId, required: &BTreeSet<Skill>) -> f64 {
        if required.is_empty() {
            return 1.0;
        }

        let profile = self.profile_or_empty(user_id).await;
        skill_match(&profile, required)
    }

    /// Past performance (0–1) of the user on this kind of task.
    pub async fn history_score(&self, user_id: UserId, task_kind: TaskKind) -> f64 {
        let lookup = bounded(
            "skill analytics",
            self.timeout,
            self.analytics.history_score(user_id, task_kind),
        )
        .await;

        match lookup {
            Ok(Some(score)) if score.is_finite() => score.clamp(0.0, 1.0),
            Ok(Some(score)) => {
                warn!(user_id = %user_id, task_kind = task_kind.as_str(), score, "non-finite history score ignored");
                NEUTRAL_HISTORY_SCORE
            }
            Ok(None) => NEUTRAL_HISTORY_SCORE,
            Err(err) => {
                warn!(user_id = %user_id, task_kind = task_kind.as_str(), error = %err, "history lookup failed; using neutral score");
                NEUTRAL_HISTORY_SCORE
            }
        }
    }

    /// Feed a finished task back into the user's history for its kind, so later
    /// rankings see it.
    pub async fn record_completion(
        &self,
        user_id: UserId,
        task_kind: TaskKind,
        on_time: bool,
    ) -> Result<(), CollaboratorError> {
        bounded(
            "skill analytics",
            self.timeout,
            self.analytics.record_completion(user_id, task_kind, on_time),
        )
        .await?;
        debug!(user_id = %user_id, task_kind = task_kind.as_str(), on_time, "completion recorded");
        Ok(())
    }

    /// Full profile with every skill present (defaults filled in).
    pub async fn skill_profile(&self, user_id: UserId) -> SkillProfile {
        let recorded = self.profile_or_empty(user_id).await;
        Skill::ALL
            .into_iter()
            .map(|skill| (skill, proficiency(&recorded, skill)))
            .collect()
    }

    async fn profile_or_empty(&self, user_id: UserId) -> SkillProfile {
        match bounded("skill analytics", self.timeout, self.analytics.proficiencies(user_id)).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "proficiency lookup failed; using default proficiency");
                SkillProfile::new()
            }
        }
    }
}

fn proficiency(profile: &SkillProfile, skill: Skill) -> u8 {
    profile.get(&skill).copied().unwrap_or(DEFAULT_PROFICIENCY).min(100)
}

/// Pure skill-fit computation over an already fetched profile.
pub fn skill_match(profile: &SkillProfile, required: &BTreeSet<Skill>) -> f64 {
    if required.is_empty() {
        return 1.0;
    }

    let total: f64 = required
        .iter()
        .map(|skill| f64::from(proficiency(profile, *skill)) / 100.0)
        .sum();
    total / required.len() as f64
}
