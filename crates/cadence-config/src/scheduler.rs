//! Scheduler configuration parsing.

use crate::nodes::{get_all_string_args, get_first_string_arg, get_positive_arg};
use crate::{ConfigError, ConfigResult};
use cadence_core::priority::{FailurePolicy, RankingCriterion};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};

/// Default bound on concurrent metadata queries per signal.
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 16;

/// Settings for the task prioritizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on in-flight store queries for each history signal.
    pub max_concurrent_queries: usize,
    /// Ranking criteria in precedence order.
    pub criteria: Vec<RankingCriterion>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            criteria: RankingCriterion::defaults(),
        }
    }
}

/// Parse a standalone scheduler configuration from KDL text.
///
/// The text may either contain a `scheduler { ... }` node or the scheduler
/// settings at the top level.
pub fn parse_scheduler_config(kdl: &str) -> ConfigResult<SchedulerConfig> {
    let doc: KdlDocument = kdl.parse()?;

    match doc.get("scheduler") {
        Some(node) => parse_scheduler_node(node),
        None => parse_scheduler_children(Some(&doc)),
    }
}

pub(crate) fn parse_scheduler_node(node: &KdlNode) -> ConfigResult<SchedulerConfig> {
    parse_scheduler_children(node.children())
}

fn parse_scheduler_children(children: Option<&KdlDocument>) -> ConfigResult<SchedulerConfig> {
    let mut config = SchedulerConfig::default();
    let Some(children) = children else {
        return Ok(config);
    };

    let mut criteria_names: Option<Vec<String>> = None;
    let mut policy = FailurePolicy::Expedite;

    for child in children.nodes() {
        match child.name().value() {
            "max-concurrent-queries" => {
                let value = get_positive_arg(child, "max-concurrent-queries")?;
                config.max_concurrent_queries =
                    usize::try_from(value).map_err(|_| ConfigError::InvalidValue {
                        field: "max-concurrent-queries".to_string(),
                        message: format!("{} is too large", value),
                    })?;
            }
            "criteria" => {
                let names = get_all_string_args(child);
                if names.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "criteria".to_string(),
                        message: "at least one criterion is required".to_string(),
                    });
                }
                criteria_names = Some(names);
            }
            "similar-failing" => {
                let name = get_first_string_arg(child).ok_or_else(|| {
                    ConfigError::MissingField("similar-failing policy".to_string())
                })?;
                policy = name.parse().map_err(|e: cadence_core::Error| {
                    ConfigError::InvalidValue {
                        field: "similar-failing".to_string(),
                        message: e.to_string(),
                    }
                })?;
            }
            _ => {} // Ignore unknown nodes
        }
    }

    match criteria_names {
        Some(names) => config.criteria = parse_criteria(&names, policy)?,
        None => {
            // Keep the default precedence but honour the configured policy
            for criterion in &mut config.criteria {
                if let RankingCriterion::SimilarFailing(p) = criterion {
                    *p = policy;
                }
            }
        }
    }

    Ok(config)
}

fn parse_criteria(names: &[String], policy: FailurePolicy) -> ConfigResult<Vec<RankingCriterion>> {
    let mut criteria = Vec::with_capacity(names.len());
    for name in names {
        let criterion =
            RankingCriterion::parse(name, policy).map_err(|e| ConfigError::InvalidValue {
                field: "criteria".to_string(),
                message: e.to_string(),
            })?;
        if criteria.contains(&criterion) {
            return Err(ConfigError::Duplicate(format!("ranking criterion '{}'", name)));
        }
        criteria.push(criterion);
    }
    Ok(criteria)
}
