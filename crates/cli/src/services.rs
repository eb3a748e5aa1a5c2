//! Process wiring: collaborators, engine and orchestrator from the runtime config.
//!
//! Without `TASKFORGE_DATABASE_URL` everything is in memory. With it, policy
//! settings and attendance come from Postgres; the roster, skills and the task
//! board stay in memory.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;

use taskforge_distribution::{
    AssignmentEngine, AttendanceSource, AvailabilityResolver, DistributionConfigStore, SettingsStore,
    SkillHistoryLearner, WorkloadBalancer,
};
use taskforge_infra::adapters::{
    AttendanceStatus, InMemoryAttendance, InMemorySettingsStore, InMemorySkillAnalytics, PostgresAttendance,
    PostgresSettingsStore,
};
use taskforge_infra::{DistributionOrchestrator, InMemoryTaskBoard, RuntimeConfig};

use crate::roster::Roster;

pub struct Services {
    pub config: Arc<DistributionConfigStore>,
    pub board: Arc<InMemoryTaskBoard>,
    pub analytics: Arc<InMemorySkillAnalytics>,
    /// Set when attendance is kept in memory (no database).
    pub attendance: Option<Arc<InMemoryAttendance>>,
    pub orchestrator: Arc<DistributionOrchestrator>,
}

impl Services {
    /// Put every roster entry on the board and record their skills. Presence is
    /// recorded for today when attendance is in memory.
    pub fn apply_roster(&self, roster: &Roster) {
        let today = Utc::now().date_naive();
        for entry in &roster.entries {
            self.board.add_user(entry.id);
            for (skill, proficiency) in &entry.skills {
                self.analytics.set_proficiency(entry.id, *skill, *proficiency);
            }
            if let Some(attendance) = &self.attendance {
                let status = if entry.present {
                    AttendanceStatus::Present
                } else {
                    AttendanceStatus::Absent
                };
                attendance.record(entry.id, today, status);
            }
        }
        info!(employees = roster.len(), "roster loaded");
    }
}

pub async fn build_services(runtime: &RuntimeConfig) -> anyhow::Result<Services> {
    let Some(url) = &runtime.database_url else {
        return Ok(in_memory_services(runtime));
    };

    let pool = PgPool::connect(url).await.context("connecting to Postgres")?;
    info!("using Postgres settings and attendance");
    let settings: Arc<dyn SettingsStore> = Arc::new(PostgresSettingsStore::new(pool.clone()));
    let attendance: Arc<dyn AttendanceSource> = Arc::new(PostgresAttendance::new(pool));

    Ok(assemble(runtime, settings, attendance, None))
}

/// In-memory services only; no I/O.
pub fn in_memory_services(runtime: &RuntimeConfig) -> Services {
    let attendance = Arc::new(InMemoryAttendance::new());
    assemble(
        runtime,
        Arc::new(InMemorySettingsStore::new()),
        attendance.clone(),
        Some(attendance),
    )
}

fn assemble(
    runtime: &RuntimeConfig,
    settings: Arc<dyn SettingsStore>,
    attendance_source: Arc<dyn AttendanceSource>,
    attendance: Option<Arc<InMemoryAttendance>>,
) -> Services {
    let timeout = runtime.lookup_timeout;
    let board = Arc::new(InMemoryTaskBoard::new(runtime.daily_capacity_minutes));
    let analytics = Arc::new(InMemorySkillAnalytics::new());
    let config = Arc::new(DistributionConfigStore::new(settings).with_timeout(timeout));

    let engine = AssignmentEngine::new(
        config.clone(),
        SkillHistoryLearner::new(analytics.clone()).with_timeout(timeout),
        WorkloadBalancer::new(board.clone(), config.clone()).with_timeout(timeout),
        AvailabilityResolver::new(attendance_source).with_timeout(timeout),
    );
    let orchestrator = Arc::new(DistributionOrchestrator::new(engine, board.clone()).with_timeout(timeout));

    Services {
        config,
        board,
        analytics,
        attendance,
        orchestrator,
    }
}
