//! `taskforge` command-line wiring.
//!
//! - `roster.rs`: the team file (ids, skills, presence)
//! - `services.rs`: collaborators, engine and orchestrator from the runtime config
//! - `replay.rs`: NDJSON events in, one JSON report per task out

pub mod replay;
pub mod roster;
pub mod services;
