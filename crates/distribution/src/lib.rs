//! `taskforge-distribution`
//!
//! **Responsibility:** turn business events into task definitions and decide who
//! should do them.
//!
//! - [`generator`] maps an event to an ordered list of [`TaskDefinition`]s (pure).
//! - [`engine`] ranks candidates by skill, workload, history and availability.
//! - [`config`] owns the scoring weights and the utilization ceiling.
//!
//! Everything outside the engine (settings, attendance, analytics, workload,
//! task management) is reached through the traits in [`collaborator`]. Failures
//! there degrade to neutral scores instead of aborting a ranking.

pub mod availability;
pub mod collaborator;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod learner;
pub mod outcome;
pub mod task;
pub mod workload;

#[cfg(test)]
mod testing;

pub use availability::AvailabilityResolver;
pub use collaborator::{
    AttendanceSource, DEFAULT_LOOKUP_TIMEOUT, SettingsStore, SkillAnalytics, TaskManagement, WorkloadSource,
};
pub use config::{ConfigPatch, DistributionConfig, DistributionConfigStore, EffectiveWeights, WeightSettings};
pub use engine::{AssignmentDecision, AssignmentEngine, CandidateScore, ScoreBreakdown};
pub use error::{CollaboratorError, DistributionError};
pub use generator::generate_from_event;
pub use learner::SkillHistoryLearner;
pub use outcome::{AssignmentOutcome, AssignmentState, UnassignedReason};
pub use task::{CompletedTask, OpenTask, Priority, Skill, SkillProfile, TaskDefinition, TaskKind};
pub use workload::{WorkloadBalancer, WorkloadSnapshot};
