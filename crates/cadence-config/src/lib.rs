//! KDL configuration parsing for Cadence.
//!
//! This crate handles parsing of:
//! - Scheduler configuration (ranking criteria, query concurrency)
//! - System configuration (database, source-control client)

mod nodes;

pub mod error;
pub mod scheduler;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use scheduler::{SchedulerConfig, parse_scheduler_config};
pub use system::{
    DatabaseConfig, GitHubSettings, SystemConfig, load_system_config, parse_system_config,
};
