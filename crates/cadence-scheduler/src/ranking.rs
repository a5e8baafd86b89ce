//! Ranking of a batch by an ordered list of criteria.
//!
//! Every criterion reduces a task to an integer score, higher meaning "run
//! sooner". Scores are compared lexicographically in criterion order and the
//! task id breaks any remaining tie, so the resulting order is strict and total
//! whatever the configured criteria are.

use cadence_core::priority::{FailurePolicy, RankingCriterion};
use cadence_core::{Task, TaskId};
use std::cmp::Ordering;

use crate::SignalCache;

/// Orders tasks using cached signals only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRanker {
    criteria: Vec<RankingCriterion>,
}

impl Default for TaskRanker {
    fn default() -> Self {
        Self::new(RankingCriterion::defaults())
    }
}

impl TaskRanker {
    pub fn new(criteria: Vec<RankingCriterion>) -> Self {
        Self { criteria }
    }

    pub fn criteria(&self) -> &[RankingCriterion] {
        &self.criteria
    }

    /// Score of one task under one criterion.
    pub fn score(&self, criterion: RankingCriterion, task: &Task, signals: &SignalCache) -> i64 {
        match criterion {
            RankingCriterion::BasePriority => task.priority,
            RankingCriterion::DependencyCount => saturate(signals.dependency_count(&task.id)),
            RankingCriterion::RevisionOrder => {
                if task.requester.is_automated() {
                    task.order_number
                } else {
                    0
                }
            }
            RankingCriterion::RecentlyFailing => i64::from(signals.previous_failed(&task.id)),
            RankingCriterion::SimilarFailing(policy) => {
                let count = saturate(signals.similar_failures(&task.id));
                match policy {
                    FailurePolicy::Expedite => count,
                    FailurePolicy::Defer => -count,
                }
            }
        }
    }

    /// All scores of a task, in criterion order.
    pub fn scores(&self, task: &Task, signals: &SignalCache) -> Vec<i64> {
        self.criteria
            .iter()
            .map(|c| self.score(*c, task, signals))
            .collect()
    }

    /// `Less` when `a` should run before `b`.
    pub fn compare(&self, a: &Task, b: &Task, signals: &SignalCache) -> Ordering {
        for criterion in &self.criteria {
            let ordering = self
                .score(*criterion, b, signals)
                .cmp(&self.score(*criterion, a, signals));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    }

    /// Sort a batch, returning task ids in run order.
    ///
    /// Scores are computed once per task rather than once per comparison.
    pub fn rank(&self, tasks: &[Task], signals: &SignalCache) -> Vec<TaskId> {
        let mut keyed: Vec<(Vec<i64>, &TaskId)> = tasks
            .iter()
            .map(|task| (self.scores(task, signals), &task.id))
            .collect();

        keyed.sort_by(|(a_scores, a_id), (b_scores, b_id)| {
            b_scores.cmp(a_scores).then_with(|| a_id.cmp(b_id))
        });

        keyed.into_iter().map(|(_, id)| id.clone()).collect()
    }
}

fn saturate(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
