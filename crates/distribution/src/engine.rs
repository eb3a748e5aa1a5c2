//! Candidate scoring and assignee selection.
//!
//! Each candidate's score is a weighted sum of four component signals, all in
//! `[0, 1]`:
//!
//! ```text
//! score = w_skill·skill + w_workload·workload + w_history·history + w_availability·availability
//! ```
//!
//! Weights are used as configured (not normalized), so a total score may exceed 1
//! when the weights sum above 1.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use taskforge_core::UserId;

use crate::availability::AvailabilityResolver;
use crate::config::{DistributionConfigStore, EffectiveWeights};
use crate::error::DistributionError;
use crate::learner::SkillHistoryLearner;
use crate::task::TaskDefinition;
use crate::workload::WorkloadBalancer;

/// Runner-up candidates kept on a decision.
pub const MAX_ALTERNATIVES: usize = 3;

/// Component signals behind one candidate's score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub skill: f64,
    pub workload: f64,
    pub history: f64,
    pub availability: f64,
}

impl ScoreBreakdown {
    /// Every component at its fail-open value.
    pub const NEUTRAL: ScoreBreakdown = ScoreBreakdown {
        skill: 0.5,
        workload: 0.5,
        history: 0.5,
        availability: 0.5,
    };

    /// Weighted total, rounded to three decimals.
    pub fn weighted_total(&self, weights: &EffectiveWeights) -> f64 {
        round3(
            weights.skill * self.skill
                + weights.workload * self.workload
                + weights.history * self.history
                + weights.availability * self.availability,
        )
    }

    fn clamped(self) -> Self {
        Self {
            skill: self.skill.clamp(0.0, 1.0),
            workload: self.workload.clamp(0.0, 1.0),
            history: self.history.clamp(0.0, 1.0),
            availability: self.availability.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub user_id: UserId,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Chosen assignee for one task plus the runners-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentDecision {
    pub user_id: UserId,
    pub score: f64,
    pub auto_assign: bool,
    pub breakdown: ScoreBreakdown,
    /// Next best candidates in rank order, at most [`MAX_ALTERNATIVES`].
    pub alternatives: Vec<CandidateScore>,
}

impl AssignmentDecision {
    /// Build a decision from an already ranked candidate list; `None` when the list
    /// is empty.
    pub fn from_ranking(definition: &TaskDefinition, ranked: Vec<CandidateScore>) -> Option<Self> {
        let mut ranked = ranked.into_iter();
        let best = ranked.next()?;

        Some(Self {
            user_id: best.user_id,
            score: best.score,
            auto_assign: definition.auto_assignable(),
            breakdown: best.breakdown,
            alternatives: ranked.take(MAX_ALTERNATIVES).collect(),
        })
    }
}

/// Scores candidates for task definitions and picks the assignee.
pub struct AssignmentEngine {
    config: Arc<DistributionConfigStore>,
    learner: SkillHistoryLearner,
    workload: WorkloadBalancer,
    availability: AvailabilityResolver,
}

impl AssignmentEngine {
    pub fn new(
        config: Arc<DistributionConfigStore>,
        learner: SkillHistoryLearner,
        workload: WorkloadBalancer,
        availability: AvailabilityResolver,
    ) -> Self {
        Self {
            config,
            learner,
            workload,
            availability,
        }
    }

    pub fn config(&self) -> &Arc<DistributionConfigStore> {
        &self.config
    }

    pub fn learner(&self) -> &SkillHistoryLearner {
        &self.learner
    }

    pub fn workload(&self) -> &WorkloadBalancer {
        &self.workload
    }

    pub fn availability(&self) -> &AvailabilityResolver {
        &self.availability
    }

    /// Score one user for one task with the current weights.
    pub async fn score_candidate(&self, user_id: UserId, definition: &TaskDefinition) -> CandidateScore {
        let weights = self.config.effective_weights().await;
        self.score_with(user_id, definition, &weights).await
    }

    /// Score and rank candidates, best first. Ties keep the candidate order they
    /// came in.
    ///
    /// With `candidates = None` the pool is the workload balancer's eligible users.
    /// An empty pool yields an empty list.
    #[instrument(skip_all, fields(task_kind = definition.task_kind.as_str()))]
    pub async fn candidate_scores(
        &self,
        definition: &TaskDefinition,
        candidates: Option<&[UserId]>,
    ) -> Result<Vec<CandidateScore>, DistributionError> {
        let pool = match candidates {
            Some(users) => users.to_vec(),
            None => self.workload.eligible_user_ids().await?,
        };
        if pool.is_empty() {
            debug!("no candidates to score");
            return Ok(Vec::new());
        }

        // One snapshot of the weights for the whole ranking.
        let weights = self.config.effective_weights().await;
        let scored = join_all(
            pool.iter()
                .map(|user_id| self.score_isolated(*user_id, definition, &weights)),
        )
        .await;

        Ok(rank(scored))
    }

    /// Best candidate among the eligible pool, `None` when nobody is eligible.
    pub async fn select_assignee(
        &self,
        definition: &TaskDefinition,
    ) -> Result<Option<AssignmentDecision>, DistributionError> {
        let ranked = self.candidate_scores(definition, None).await?;
        Ok(AssignmentDecision::from_ranking(definition, ranked))
    }

    /// `score_with`, except that a panicking lookup yields neutral components for
    /// that one candidate instead of unwinding through the whole ranking.
    async fn score_isolated(
        &self,
        user_id: UserId,
        definition: &TaskDefinition,
        weights: &EffectiveWeights,
    ) -> CandidateScore {
        match AssertUnwindSafe(self.score_with(user_id, definition, weights))
            .catch_unwind()
            .await
        {
            Ok(scored) => scored,
            Err(_) => {
                error!(user_id = %user_id, "candidate scoring panicked; using neutral components");
                CandidateScore {
                    user_id,
                    score: ScoreBreakdown::NEUTRAL.weighted_total(weights),
                    breakdown: ScoreBreakdown::NEUTRAL,
                }
            }
        }
    }

    async fn score_with(
        &self,
        user_id: UserId,
        definition: &TaskDefinition,
        weights: &EffectiveWeights,
    ) -> CandidateScore {
        let (skill, workload, history, availability) = futures::join!(
            self.learner
                .skill_match_score(user_id, &definition.required_skills),
            self.workload.workload_score(user_id),
            self.learner.history_score(user_id, definition.task_kind),
            self.availability.availability_score(user_id),
        );

        let breakdown = ScoreBreakdown {
            skill,
            workload,
            history,
            availability,
        }
        .clamped();

        CandidateScore {
            user_id,
            score: breakdown.weighted_total(weights),
            breakdown,
        }
    }
}

/// Sort by score descending; equal scores keep their input order.
pub fn rank(scored: Vec<CandidateScore>) -> Vec<CandidateScore> {
    let mut indexed: Vec<(usize, CandidateScore)> = scored.into_iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| b.score.total_cmp(&a.score).then(ia.cmp(ib)));
    indexed.into_iter().map(|(_, candidate)| candidate).collect()
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigPatch, WeightSettings};
    use crate::task::{Priority, Skill, TaskKind};
    use crate::testing::{FakeAnalytics, FakeAttendance, FakeWorkload, config_store, user};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn engine(
        analytics: FakeAnalytics,
        workload: FakeWorkload,
        attendance: FakeAttendance,
    ) -> AssignmentEngine {
        let config = config_store();
        AssignmentEngine::new(
            config.clone(),
            SkillHistoryLearner::new(Arc::new(analytics)),
            WorkloadBalancer::new(Arc::new(workload), config),
            AvailabilityResolver::new(Arc::new(attendance)).with_clock(today),
        )
    }

    fn delivery() -> TaskDefinition {
        TaskDefinition::new(TaskKind::Delivery, "Deliver", "توصيل").with_skills([Skill::Delivery])
    }

    fn candidate(n: u128, score: f64) -> CandidateScore {
        CandidateScore {
            user_id: user(n),
            score,
            breakdown: ScoreBreakdown {
                skill: 0.0,
                workload: 0.0,
                history: 0.0,
                availability: 0.0,
            },
        }
    }

    #[tokio::test]
    async fn scores_with_default_weights() {
        let u = user(1);
        let e = engine(
            FakeAnalytics::default()
                .skill(u, Skill::Delivery, 80)
                .history(u, TaskKind::Delivery, 0.5),
            FakeWorkload::default().user(u, 0.2),
            FakeAttendance::default().present(u, today()),
        );

        let scored = e.score_candidate(u, &delivery()).await;

        // 0.40·0.8 + 0.25·0.8 + 0.20·0.5 + 0.15·1.0
        assert_eq!(scored.score, 0.77);
        assert!((scored.breakdown.workload - 0.8).abs() < 1e-12);
        assert_eq!(scored.breakdown.availability, 1.0);
    }

    #[tokio::test]
    async fn new_user_without_any_data_scores_neutral_components() {
        let u = user(1);
        let e = engine(
            FakeAnalytics::default(),
            FakeWorkload::default().user(u, 0.0),
            FakeAttendance::default(),
        );

        let scored = e.score_candidate(u, &delivery()).await;
        assert_eq!(
            scored.breakdown,
            ScoreBreakdown {
                skill: 0.5,
                workload: 1.0,
                history: 0.5,
                availability: 0.5,
            }
        );
        assert_eq!(scored.score, 0.625);
    }

    #[tokio::test]
    async fn panicking_lookup_only_neutralizes_that_candidate() {
        let (steady, broken) = (user(1), user(2));
        let e = engine(
            FakeAnalytics::default()
                .skill(steady, Skill::Delivery, 90)
                .panicking_for(broken),
            FakeWorkload::default().user(steady, 0.0).user(broken, 0.0),
            FakeAttendance::default(),
        );

        let ranked = e.candidate_scores(&delivery(), None).await.unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].user_id, steady);
        assert_eq!(ranked[1].user_id, broken);
        assert_eq!(ranked[1].breakdown, ScoreBreakdown::NEUTRAL);
        assert_eq!(ranked[1].score, 0.5);
    }

    #[tokio::test]
    async fn every_collaborator_down_still_produces_a_score() {
        let u = user(1);
        let e = engine(
            FakeAnalytics::default().failing_for(u),
            FakeWorkload::default().failing_for(u),
            FakeAttendance::default().failing(),
        );

        let scored = e.score_candidate(u, &delivery()).await;
        assert_eq!(scored.score, 0.5);
    }

    #[tokio::test]
    async fn select_assignee_prefers_the_stronger_candidate() {
        let (strong, weak) = (user(2), user(1));
        let e = engine(
            FakeAnalytics::default()
                .skill(strong, Skill::Delivery, 95)
                .skill(weak, Skill::Delivery, 10),
            FakeWorkload::default().user(strong, 0.1).user(weak, 0.1),
            FakeAttendance::default().present(strong, today()).present(weak, today()),
        );

        let decision = e.select_assignee(&delivery()).await.unwrap().unwrap();
        assert_eq!(decision.user_id, strong);
        assert!(decision.auto_assign);
        assert_eq!(decision.alternatives.len(), 1);
        assert_eq!(decision.alternatives[0].user_id, weak);
    }

    #[tokio::test]
    async fn no_eligible_users_means_no_decision() {
        let busy = user(1);
        let e = engine(
            FakeAnalytics::default(),
            FakeWorkload::default().user(busy, 0.95),
            FakeAttendance::default(),
        );

        assert!(e.select_assignee(&delivery()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn high_priority_is_never_auto_assigned() {
        let u = user(1);
        let e = engine(
            FakeAnalytics::default().skill(u, Skill::Delivery, 100),
            FakeWorkload::default().user(u, 0.0),
            FakeAttendance::default().present(u, today()),
        );

        let def = delivery().with_priority(Priority::High);
        let decision = e.select_assignee(&def).await.unwrap().unwrap();
        assert!(!decision.auto_assign);
    }

    #[tokio::test]
    async fn explicit_candidates_bypass_the_eligibility_filter() {
        let busy = user(1);
        let e = engine(
            FakeAnalytics::default(),
            FakeWorkload::default().user(busy, 0.99),
            FakeAttendance::default(),
        );

        let ranked = e.candidate_scores(&delivery(), Some(&[busy])).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert!(e.candidate_scores(&delivery(), Some(&[])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zeroed_weights_collapse_scores_to_zero() {
        let u = user(1);
        let e = engine(
            FakeAnalytics::default(),
            FakeWorkload::default().user(u, 0.0),
            FakeAttendance::default(),
        );

        e.config()
            .set_config(ConfigPatch::weights(WeightSettings {
                skill: Some(0.0),
                workload: Some(0.0),
                history: Some(0.0),
                availability: Some(0.0),
            }))
            .await
            .unwrap();

        assert_eq!(e.score_candidate(u, &delivery()).await.score, 0.0);
    }

    #[tokio::test]
    async fn roster_failure_propagates() {
        let e = engine(
            FakeAnalytics::default(),
            FakeWorkload::default().roster_down(),
            FakeAttendance::default(),
        );

        assert!(e.select_assignee(&delivery()).await.is_err());
    }

    #[test]
    fn alternatives_are_capped() {
        let ranked = (1..=6).map(|n| candidate(n, 1.0 - n as f64 / 10.0)).collect();
        let decision = AssignmentDecision::from_ranking(&delivery(), ranked).unwrap();

        assert_eq!(decision.user_id, user(1));
        assert_eq!(decision.alternatives.len(), MAX_ALTERNATIVES);
        assert_eq!(decision.alternatives[0].user_id, user(2));
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let ranked = rank(vec![candidate(3, 0.5), candidate(1, 0.7), candidate(2, 0.5)]);
        let order: Vec<UserId> = ranked.iter().map(|c| c.user_id).collect();

        assert_eq!(order, vec![user(1), user(3), user(2)]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn ranking_is_sorted_and_stable(scores in prop::collection::vec(0u8..5, 0..32)) {
            let input: Vec<CandidateScore> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| candidate(i as u128 + 1, f64::from(*s) / 4.0))
                .collect();

            let ranked = rank(input.clone());

            prop_assert_eq!(ranked.len(), input.len());
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    prop_assert!(pair[0].user_id < pair[1].user_id);
                }
            }
        }

        #[test]
        fn auto_assign_ignores_the_score(
            priority in prop_oneof![
                Just(Priority::Urgent),
                Just(Priority::High),
                Just(Priority::Normal),
                Just(Priority::Low),
            ],
            approval in any::<bool>(),
            score in 0.0f64..1.0,
        ) {
            let def = delivery().with_priority(priority).requiring_approval(approval);
            let decision = AssignmentDecision::from_ranking(&def, vec![candidate(1, score)]).unwrap();

            let expected = matches!(priority, Priority::Low | Priority::Normal) && !approval;
            prop_assert_eq!(decision.auto_assign, expected);
        }
    }
}
