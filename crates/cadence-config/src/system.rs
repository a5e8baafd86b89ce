//! System configuration parsing.

use crate::nodes::{get_first_string_arg, get_positive_arg, get_positive_prop, get_string_prop};
use crate::scheduler::parse_scheduler_node;
use crate::{ConfigError, ConfigResult, SchedulerConfig};
use kdl::KdlDocument;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// System-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub github: GitHubSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL; falls back to `DATABASE_URL` when unset.
    pub url: Option<String>,
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection before a query fails.
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubSettings {
    /// Environment variable holding the API token.
    pub token_env: String,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Factor applied to the retry delay after each failed attempt.
    pub backoff_multiplier: u32,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            token_env: "GITHUB_TOKEN".to_string(),
            max_attempts: 3,
            retry_delay_ms: 1000,
            backoff_multiplier: 1,
        }
    }
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();
    let mut seen = Vec::new();

    for node in doc.nodes() {
        let name = node.name().value();
        if matches!(name, "database" | "scheduler" | "github") {
            if seen.contains(&name) {
                return Err(ConfigError::Duplicate(format!("{} section", name)));
            }
            seen.push(name);
        }

        match name {
            "database" => {
                if let Some(url) = get_string_prop(node, "url") {
                    config.database.url = Some(url);
                }
                if let Some(max) = get_positive_prop(node, "max-connections")? {
                    config.database.max_connections = narrow(max, "max-connections")?;
                }
                if let Some(secs) = get_positive_prop(node, "acquire-timeout-secs")? {
                    config.database.acquire_timeout_secs = secs;
                }
            }
            "scheduler" => {
                config.scheduler = parse_scheduler_node(node)?;
            }
            "github" => {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "token-env" => {
                                config.github.token_env = get_first_string_arg(child)
                                    .ok_or_else(|| {
                                        ConfigError::MissingField("github token-env".to_string())
                                    })?;
                            }
                            "max-attempts" => {
                                let value = get_positive_arg(child, "max-attempts")?;
                                config.github.max_attempts = narrow(value, "max-attempts")?;
                            }
                            "retry-delay-ms" => {
                                config.github.retry_delay_ms =
                                    get_positive_arg(child, "retry-delay-ms")?;
                            }
                            "backoff-multiplier" => {
                                let value = get_positive_arg(child, "backoff-multiplier")?;
                                config.github.backoff_multiplier =
                                    narrow(value, "backoff-multiplier")?;
                            }
                            _ => {}
                        }
                    }
                }
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

/// Read and parse a system configuration file.
pub fn load_system_config(path: impl AsRef<Path>) -> ConfigResult<SystemConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_system_config(&text)
}

fn narrow(value: u64, field: &str) -> ConfigResult<u32> {
    u32::try_from(value).map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("{} is too large", value),
    })
}
