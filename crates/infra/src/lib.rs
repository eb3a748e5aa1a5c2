//! Infrastructure layer: runtime config, collaborator adapters, the in-memory task
//! board, subscriber workers and the distribution orchestrator.

pub mod adapters;
pub mod board;
pub mod config;
pub mod orchestrator;
pub mod workers;

pub use board::{
    ApprovalRequest, ApprovalStatus, AssignmentMethod, BoardTask, InMemoryTaskBoard, LogEntry, TaskStatus,
};
pub use config::{ConfigError, RuntimeConfig};
pub use orchestrator::{DistributionOrchestrator, ProcessedEvent, Reassignment, ReassignmentReport, TaskReport};
pub use workers::{SubscriberWorker, WorkerHandle};
