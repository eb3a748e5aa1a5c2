//! Workload balancing: capacity scores and the eligible candidate pool.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use taskforge_core::UserId;

use crate::collaborator::{DEFAULT_LOOKUP_TIMEOUT, WorkloadSource, bounded};
use crate::config::DistributionConfigStore;
use crate::error::{CollaboratorError, DistributionError};

/// Workload score used when the user's utilization cannot be read.
pub const NEUTRAL_WORKLOAD_SCORE: f64 = 0.5;

/// Remaining-capacity score per active user.
pub type WorkloadSnapshot = BTreeMap<UserId, f64>;

pub struct WorkloadBalancer {
    source: Arc<dyn WorkloadSource>,
    config: Arc<DistributionConfigStore>,
    timeout: Duration,
}

impl WorkloadBalancer {
    pub fn new(source: Arc<dyn WorkloadSource>, config: Arc<DistributionConfigStore>) -> Self {
        Self {
            source,
            config,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `1 − utilization`, clamped to `[0, 1]`; neutral when the lookup fails.
    pub async fn workload_score(&self, user_id: UserId) -> f64 {
        match self.utilization(user_id).await {
            Ok(utilization) => capacity_score(utilization),
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "utilization lookup failed; using neutral workload score");
                NEUTRAL_WORKLOAD_SCORE
            }
        }
    }

    /// Active users whose utilization is strictly below the configured maximum,
    /// sorted by id.
    ///
    /// Users whose utilization cannot be read are left out. A roster failure is
    /// an error: there is nobody to rank.
    pub async fn eligible_user_ids(&self) -> Result<Vec<UserId>, DistributionError> {
        let max_utilization = self.config.get_config().await.max_utilization;
        let users = self.active_users().await?;

        let loads = join_all(users.into_iter().map(|user_id| async move {
            let utilization = self.utilization(user_id).await;
            (user_id, utilization)
        }))
        .await;

        let readable: Vec<(UserId, f64)> = loads
            .into_iter()
            .filter_map(|(user_id, utilization)| match utilization {
                Ok(value) => Some((user_id, value)),
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "utilization unreadable; user left out of candidate pool");
                    None
                }
            })
            .collect();

        let eligible = filter_eligible(&readable, max_utilization);
        debug!(
            active = readable.len(),
            eligible = eligible.len(),
            max_utilization,
            "candidate pool computed"
        );
        Ok(eligible)
    }

    /// Active users in the source's order.
    pub async fn active_users(&self) -> Result<Vec<UserId>, DistributionError> {
        Ok(bounded("workload", self.timeout, self.source.active_users()).await?)
    }

    /// Capacity score of every active user.
    pub async fn all_workloads(&self) -> Result<WorkloadSnapshot, DistributionError> {
        let users = self.active_users().await?;
        let scores = join_all(users.iter().map(|user_id| self.workload_score(*user_id))).await;
        Ok(users.into_iter().zip(scores).collect())
    }

    async fn utilization(&self, user_id: UserId) -> Result<f64, CollaboratorError> {
        let value = bounded("workload", self.timeout, self.source.utilization(user_id)).await?;
        if !value.is_finite() {
            return Err(CollaboratorError::malformed(
                "workload",
                format!("non-finite utilization {value}"),
            ));
        }
        Ok(value.max(0.0))
    }
}

/// Remaining capacity in `[0, 1]`.
pub fn capacity_score(utilization: f64) -> f64 {
    (1.0 - utilization).clamp(0.0, 1.0)
}

/// Users strictly below `max_utilization`, sorted and deduplicated.
pub fn filter_eligible(loads: &[(UserId, f64)], max_utilization: f64) -> Vec<UserId> {
    let mut eligible: Vec<UserId> = loads
        .iter()
        .filter(|(_, utilization)| *utilization < max_utilization)
        .map(|(user_id, _)| *user_id)
        .collect();
    eligible.sort();
    eligible.dedup();
    eligible
}
