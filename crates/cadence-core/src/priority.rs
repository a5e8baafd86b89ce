//! Ranking criteria for ordering a scheduling batch.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How a matching failure on other variants affects a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Run sooner: confirms or clears the failure faster.
    Expedite,
    /// Run later: the task is likely to fail the same way.
    Defer,
}

impl std::str::FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "expedite" => Ok(FailurePolicy::Expedite),
            "defer" => Ok(FailurePolicy::Defer),
            other => Err(Error::InvalidInput(format!(
                "unknown failure policy: {}",
                other
            ))),
        }
    }
}

/// A single ranking key. Criteria are applied in order; the first one that
/// distinguishes two tasks decides which runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingCriterion {
    /// Configured task priority.
    BasePriority,
    /// Number of batch tasks waiting on this one.
    DependencyCount,
    /// Newer automated revisions before older ones.
    RevisionOrder,
    /// Tasks whose previous run failed.
    RecentlyFailing,
    /// Tasks already failing on other variants of the same revision.
    SimilarFailing(FailurePolicy),
}

impl RankingCriterion {
    /// Name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            RankingCriterion::BasePriority => "base-priority",
            RankingCriterion::DependencyCount => "dependency-count",
            RankingCriterion::RevisionOrder => "revision-order",
            RankingCriterion::RecentlyFailing => "recently-failing",
            RankingCriterion::SimilarFailing(_) => "similar-failing",
        }
    }

    /// Parse a criterion by its configuration name. `similar-failing` takes the
    /// supplied policy.
    pub fn parse(name: &str, similar_failing: FailurePolicy) -> Result<Self> {
        match name {
            "base-priority" => Ok(RankingCriterion::BasePriority),
            "dependency-count" => Ok(RankingCriterion::DependencyCount),
            "revision-order" => Ok(RankingCriterion::RevisionOrder),
            "recently-failing" => Ok(RankingCriterion::RecentlyFailing),
            "similar-failing" => Ok(RankingCriterion::SimilarFailing(similar_failing)),
            other => Err(Error::InvalidInput(format!(
                "unknown ranking criterion: {}",
                other
            ))),
        }
    }

    /// Default precedence.
    pub fn defaults() -> Vec<RankingCriterion> {
        vec![
            RankingCriterion::BasePriority,
            RankingCriterion::DependencyCount,
            RankingCriterion::RevisionOrder,
            RankingCriterion::RecentlyFailing,
            RankingCriterion::SimilarFailing(FailurePolicy::Expedite),
        ]
    }
}

impl std::fmt::Display for RankingCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_round_trip() {
        for criterion in RankingCriterion::defaults() {
            let parsed =
                RankingCriterion::parse(criterion.name(), FailurePolicy::Expedite).unwrap();
            assert_eq!(parsed, criterion);
        }
    }

    #[test]
    fn test_similar_failing_takes_policy() {
        let parsed = RankingCriterion::parse("similar-failing", FailurePolicy::Defer).unwrap();
        assert_eq!(parsed, RankingCriterion::SimilarFailing(FailurePolicy::Defer));
    }

    #[test]
    fn test_unknown_criterion() {
        assert!(RankingCriterion::parse("create-time", FailurePolicy::Expedite).is_err());
    }
}
