//! Collaborator adapters: in-memory for tests/dev, Postgres for deployments.

pub mod analytics;
pub mod attendance;
pub mod postgres;
pub mod settings;

pub use analytics::{CompletionStats, InMemorySkillAnalytics};
pub use attendance::{AttendanceStatus, InMemoryAttendance};
pub use postgres::{PostgresAttendance, PostgresSettingsStore};
pub use settings::InMemorySettingsStore;
