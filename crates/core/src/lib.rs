//! `taskforge-core` — shared building blocks for the distribution engine.
//!
//! This crate contains **pure** primitives (identifiers, domain errors) and no
//! infrastructure concerns.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{ApprovalId, TaskId, UserId};
