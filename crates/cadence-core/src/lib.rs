//! Core domain types and traits for the Cadence scheduler.
//!
//! This crate contains:
//! - Resource and task identifiers
//! - Task, version and historical task record types
//! - The metadata store trait consumed by the prioritizer
//! - Ranking criteria used to order a scheduling batch
//! - Push log types for artifact publication bookkeeping
//! - A retry combinator for transport-level collaborators

pub mod error;
pub mod id;
pub mod metadata;
pub mod priority;
pub mod push;
pub mod retry;
pub mod task;
pub mod version;

pub use error::{Error, Result};
pub use id::{ResourceId, TaskId};
pub use task::{Dependency, Requester, Task, TaskRecord, TaskStatus};
pub use version::Version;
