//! Prioritizer - orders a batch of tasks for host allocation.

use cadence_config::SchedulerConfig;
use cadence_core::metadata::MetadataStore;
use cadence_core::{Task, TaskId};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::signals::{self, SignalCache};
use crate::{PrioritizeError, PrioritizeResult, TaskRanker};

pub const RESOLVE_DEPENDENCIES: &str = "resolve_dependencies";

/// Progress of a single prioritization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrioritizerState {
    Idle,
    PopulatingSignals,
    Sorting,
    Sorted,
    Failed,
}

impl PrioritizerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PrioritizerState::Sorted | PrioritizerState::Failed)
    }

    pub fn can_transition_to(&self, next: PrioritizerState) -> bool {
        use PrioritizerState::*;
        matches!(
            (self, next),
            (Idle, PopulatingSignals)
                | (Idle, Failed)
                | (PopulatingSignals, Sorting)
                | (PopulatingSignals, Failed)
                | (Sorting, Sorted)
        )
    }
}

/// Tracks the state of one call and logs each transition.
struct Run {
    state: PrioritizerState,
    batch_size: usize,
}

impl Run {
    fn new(batch_size: usize) -> Self {
        Self {
            state: PrioritizerState::Idle,
            batch_size,
        }
    }

    fn advance(&mut self, next: PrioritizerState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid prioritizer transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(
            from = ?self.state,
            to = ?next,
            batch_size = self.batch_size,
            "Prioritizer state change"
        );
        self.state = next;
    }

    fn fail(&mut self, error: PrioritizeError) -> PrioritizeError {
        warn!(
            from = ?self.state,
            batch_size = self.batch_size,
            error = %error,
            "Prioritization failed"
        );
        self.advance(PrioritizerState::Failed);
        error
    }
}

/// Orders batches of tasks.
///
/// Holds no per-batch state: every call builds its own [`SignalCache`] and
/// drops it on return.
pub struct Prioritizer {
    store: Arc<dyn MetadataStore>,
    ranker: TaskRanker,
    max_concurrent_queries: usize,
}

impl Prioritizer {
    pub fn new(store: Arc<dyn MetadataStore>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            ranker: TaskRanker::new(config.criteria.clone()),
            max_concurrent_queries: config.max_concurrent_queries.max(1),
        }
    }

    pub fn ranker(&self) -> &TaskRanker {
        &self.ranker
    }

    /// Order a batch, returning one task id per input task.
    pub async fn prioritize(&self, tasks: &[Task]) -> PrioritizeResult<Vec<TaskId>> {
        let cancel = CancellationToken::new();
        self.prioritize_with_cancel(tasks, &cancel).await
    }

    /// Order a batch, giving up with [`PrioritizeError::Cancelled`] if `cancel`
    /// fires before the signals are in.
    pub async fn prioritize_with_cancel(
        &self,
        tasks: &[Task],
        cancel: &CancellationToken,
    ) -> PrioritizeResult<Vec<TaskId>> {
        let started = Instant::now();
        let mut run = Run::new(tasks.len());

        let populated =
            until_cancelled(cancel, self.validate_and_populate(tasks, &mut run)).await;
        let signals = match populated {
            Ok(signals) => signals,
            Err(e) => return Err(run.fail(e)),
        };

        run.advance(PrioritizerState::Sorting);
        let order = self.ranker.rank(tasks, &signals);
        run.advance(PrioritizerState::Sorted);

        info!(
            tasks = order.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Prioritized batch"
        );
        Ok(order)
    }

    /// Validate a batch and compute its signals without sorting.
    pub async fn populate_signals(&self, tasks: &[Task]) -> PrioritizeResult<SignalCache> {
        let mut run = Run::new(tasks.len());
        let populated = self.validate_and_populate(tasks, &mut run).await;
        populated.map_err(|e| run.fail(e))
    }

    async fn validate_and_populate(
        &self,
        tasks: &[Task],
        run: &mut Run,
    ) -> PrioritizeResult<SignalCache> {
        self.validate(tasks).await?;
        run.advance(PrioritizerState::PopulatingSignals);
        self.populate(tasks).await
    }

    /// Reject empty batches, duplicate ids, self-dependencies and dependencies
    /// that resolve neither inside the batch nor in the store.
    async fn validate(&self, tasks: &[Task]) -> PrioritizeResult<()> {
        if tasks.is_empty() {
            return Err(PrioritizeError::InvalidBatch("batch is empty".to_string()));
        }

        let mut ids: HashSet<&TaskId> = HashSet::with_capacity(tasks.len());
        for task in tasks {
            if !ids.insert(&task.id) {
                return Err(PrioritizeError::InvalidBatch(format!(
                    "duplicate task id {}",
                    task.id
                )));
            }
        }

        // (dependent, dependency) for references that leave the batch
        let mut external: Vec<(&TaskId, &TaskId)> = Vec::new();
        for task in tasks {
            for dependency in &task.depends_on {
                if dependency.task_id == task.id {
                    return Err(PrioritizeError::InvalidBatch(format!(
                        "task {} depends on itself",
                        task.id
                    )));
                }
                if !ids.contains(&dependency.task_id) {
                    external.push((&task.id, &dependency.task_id));
                }
            }
        }

        let Some((first_dependent, _)) = external.first() else {
            return Ok(());
        };

        let mut lookup: Vec<TaskId> = external.iter().map(|(_, dep)| (*dep).clone()).collect();
        lookup.sort();
        lookup.dedup();

        let found = self
            .store
            .existing_task_ids(&lookup)
            .await
            .map_err(|source| PrioritizeError::QueryFailure {
                operation: RESOLVE_DEPENDENCIES,
                task_id: (*first_dependent).clone(),
                source,
            })?;

        match external.iter().find(|(_, dep)| !found.contains(*dep)) {
            Some((task_id, dependency)) => Err(PrioritizeError::DanglingDependency {
                task_id: (*task_id).clone(),
                dependency: (*dependency).clone(),
            }),
            None => Ok(()),
        }
    }

    /// Run the three signal populations concurrently; the first error drops
    /// the others.
    async fn populate(&self, tasks: &[Task]) -> PrioritizeResult<SignalCache> {
        let store = self.store.as_ref();
        let limit = self.max_concurrent_queries;

        let (previous, similar_failures, dependency_count) = tokio::try_join!(
            signals::populate_previous_completion(store, tasks, limit),
            signals::populate_similar_failures(store, tasks, limit),
            async { Ok::<_, PrioritizeError>(signals::populate_dependency_count(tasks)) },
        )?;

        debug!(
            tasks = tasks.len(),
            with_history = previous.values().filter(|p| p.is_some()).count(),
            blocked_dependents = dependency_count.values().sum::<usize>(),
            "Signals populated"
        );

        Ok(SignalCache::new(previous, dependency_count, similar_failures))
    }
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = PrioritizeResult<T>>,
) -> PrioritizeResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PrioritizeError::Cancelled),
        result = work => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cadence_core::metadata::{InMemoryMetadataStore, SimilarTaskQuery};
    use cadence_core::priority::RankingCriterion;
    use cadence_core::{Dependency, Requester, TaskRecord, TaskStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn task(id: &str, variant: &str, requester: Requester, deps: &[&str]) -> Task {
        Task {
            id: TaskId::from(id),
            project: "mongodb".to_string(),
            build_variant: variant.to_string(),
            display_name: "compile".to_string(),
            requester,
            revision: "rev10".to_string(),
            order_number: 10,
            depends_on: deps.iter().map(|d| Dependency::on(*d)).collect(),
            priority: 0,
            status: TaskStatus::Undispatched,
        }
    }

    fn record(id: &str, variant: &str, order: i64, status: TaskStatus) -> TaskRecord {
        TaskRecord {
            id: TaskId::from(id),
            project: "mongodb".to_string(),
            build_variant: variant.to_string(),
            display_name: "compile".to_string(),
            requester: Requester::Revision,
            revision: format!("rev{}", order),
            order_number: order,
            status,
            finished_at: None,
        }
    }

    /// Store with failing history on linux and osx.
    fn history() -> InMemoryMetadataStore {
        InMemoryMetadataStore::with_records(vec![
            record("compile_linux_rev9", "linux", 9, TaskStatus::Failed),
            record("compile_osx_rev9", "osx", 9, TaskStatus::Success),
            record("compile_windows_rev10", "windows", 10, TaskStatus::Failed),
            record("setup_external", "linux", 8, TaskStatus::Success),
        ])
    }

    fn prioritizer(store: impl MetadataStore + 'static) -> Prioritizer {
        Prioritizer::new(Arc::new(store), &SchedulerConfig::default())
    }

    /// Counts queries made against an inner store.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryMetadataStore,
        previous_queries: AtomicUsize,
        similar_queries: AtomicUsize,
    }

    #[async_trait]
    impl MetadataStore for CountingStore {
        async fn find_latest_completed(
            &self,
            project: &str,
            build_variant: &str,
            display_name: &str,
            before_order: i64,
        ) -> cadence_core::Result<Option<TaskRecord>> {
            self.previous_queries.fetch_add(1, Ordering::SeqCst);
            self.inner
                .find_latest_completed(project, build_variant, display_name, before_order)
                .await
        }

        async fn count_failing_variants(
            &self,
            query: SimilarTaskQuery<'_>,
        ) -> cadence_core::Result<usize> {
            self.similar_queries.fetch_add(1, Ordering::SeqCst);
            self.inner.count_failing_variants(query).await
        }

        async fn existing_task_ids(
            &self,
            ids: &[TaskId],
        ) -> cadence_core::Result<std::collections::HashSet<TaskId>> {
            self.inner.existing_task_ids(ids).await
        }
    }

    /// Fails selected queries; everything else succeeds empty.
    #[derive(Default)]
    struct FailingStore {
        /// Variant whose previous-completion query fails.
        previous_for_variant: Option<&'static str>,
        /// Variant whose similar-failure query fails.
        similar_for_variant: Option<&'static str>,
        /// Fail dependency resolution.
        lookup: bool,
    }

    #[async_trait]
    impl MetadataStore for FailingStore {
        async fn find_latest_completed(
            &self,
            _project: &str,
            build_variant: &str,
            _display_name: &str,
            _before_order: i64,
        ) -> cadence_core::Result<Option<TaskRecord>> {
            if self.previous_for_variant == Some(build_variant) {
                return Err(cadence_core::Error::Backend("connection reset".to_string()));
            }
            Ok(None)
        }

        async fn count_failing_variants(
            &self,
            query: SimilarTaskQuery<'_>,
        ) -> cadence_core::Result<usize> {
            if self.similar_for_variant == Some(query.excluding_variant) {
                return Err(cadence_core::Error::Timeout("query timed out".to_string()));
            }
            Ok(0)
        }

        async fn existing_task_ids(
            &self,
            _ids: &[TaskId],
        ) -> cadence_core::Result<std::collections::HashSet<TaskId>> {
            if self.lookup {
                return Err(cadence_core::Error::Backend("connection reset".to_string()));
            }
            Ok(Default::default())
        }
    }

    /// Never answers history queries.
    struct StalledStore;

    #[async_trait]
    impl MetadataStore for StalledStore {
        async fn find_latest_completed(
            &self,
            _project: &str,
            _build_variant: &str,
            _display_name: &str,
            _before_order: i64,
        ) -> cadence_core::Result<Option<TaskRecord>> {
            futures::future::pending().await
        }

        async fn count_failing_variants(
            &self,
            _query: SimilarTaskQuery<'_>,
        ) -> cadence_core::Result<usize> {
            futures::future::pending().await
        }

        async fn existing_task_ids(
            &self,
            _ids: &[TaskId],
        ) -> cadence_core::Result<std::collections::HashSet<TaskId>> {
            Ok(Default::default())
        }
    }

    #[test]
    fn test_state_transitions() {
        use PrioritizerState::*;
        assert!(Idle.can_transition_to(PopulatingSignals));
        assert!(PopulatingSignals.can_transition_to(Failed));
        assert!(Sorting.can_transition_to(Sorted));
        assert!(!Sorted.can_transition_to(Idle));
        assert!(!Failed.can_transition_to(PopulatingSignals));
        assert!(!Sorting.can_transition_to(Failed));
        assert!(Sorted.is_terminal() && Failed.is_terminal());
    }

    #[tokio::test]
    async fn test_fan_in_scenario() {
        let tasks = vec![
            task("A", "linux", Requester::Revision, &[]),
            task("B", "osx", Requester::Revision, &[]),
            task("C", "windows", Requester::Revision, &["A", "B"]),
        ];

        let signals = prioritizer(history()).populate_signals(&tasks).await.unwrap();
        assert_eq!(signals.dependency_count(&TaskId::from("A")), 1);
        assert_eq!(signals.dependency_count(&TaskId::from("B")), 1);
        assert_eq!(signals.dependency_count(&TaskId::from("C")), 0);

        let order = prioritizer(history()).prioritize(&tasks).await.unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order.last(), Some(&TaskId::from("C")));
    }

    #[tokio::test]
    async fn test_gated_signal_scenario() {
        let store = CountingStore {
            inner: history(),
            ..Default::default()
        };
        let store = Arc::new(store);
        let prioritizer = Prioritizer::new(store.clone(), &SchedulerConfig::default());

        let tasks = vec![
            task("A", "linux", Requester::Revision, &[]),
            task("M", "linux", Requester::Patch, &["A"]),
        ];

        let signals = prioritizer.populate_signals(&tasks).await.unwrap();

        let a = TaskId::from("A");
        let m = TaskId::from("M");
        assert_eq!(
            signals.previous_completion(&a).map(|r| r.id.clone()),
            Some(TaskId::from("compile_linux_rev9"))
        );
        assert_eq!(signals.similar_failures(&a), 1);
        assert!(signals.previous_completion(&m).is_none());
        assert_eq!(signals.similar_failures(&m), 0);

        // Only the automated task reached the store
        assert_eq!(store.previous_queries.load(Ordering::SeqCst), 1);
        assert_eq!(store.similar_queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ties_broken_by_task_id() {
        let tasks = vec![
            task("Y", "linux", Requester::Patch, &[]),
            task("X", "linux", Requester::Patch, &[]),
        ];
        let prioritizer = prioritizer(InMemoryMetadataStore::new());

        for _ in 0..5 {
            let order = prioritizer.prioritize(&tasks).await.unwrap();
            assert_eq!(order, vec![TaskId::from("X"), TaskId::from("Y")]);
        }
    }

    #[tokio::test]
    async fn test_deterministic_regardless_of_input_order() {
        let mut tasks = vec![
            task("compile_linux", "linux", Requester::Revision, &[]),
            task("compile_osx", "osx", Requester::Revision, &[]),
            task("lint_linux", "linux", Requester::Revision, &["compile_linux"]),
            task("test_linux", "linux", Requester::Revision, &["compile_linux"]),
            task("patch_osx", "osx", Requester::Patch, &["compile_osx"]),
        ];
        tasks[4].priority = 5;
        let prioritizer = prioritizer(history());

        let first = prioritizer.prioritize(&tasks).await.unwrap();
        tasks.reverse();
        let second = prioritizer.prioritize(&tasks).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0], TaskId::from("patch_osx"));
        assert_eq!(first[1], TaskId::from("compile_linux"));
    }

    #[tokio::test]
    async fn test_output_is_permutation_in_comparator_order() {
        let tasks: Vec<Task> = (0..20)
            .map(|i| {
                let variant = ["linux", "osx", "windows"][i % 3];
                let mut t = task(&format!("t{:02}", i), variant, Requester::Revision, &[]);
                t.priority = (i % 4) as i64;
                if i >= 2 {
                    t.depends_on = vec![Dependency::on(format!("t{:02}", i % 2))];
                }
                t
            })
            .collect();
        let prioritizer = prioritizer(history());

        let order = prioritizer.prioritize(&tasks).await.unwrap();
        let signals = prioritizer.populate_signals(&tasks).await.unwrap();

        let unique: HashSet<&TaskId> = order.iter().collect();
        assert_eq!(unique.len(), tasks.len());

        let find = |id: &TaskId| tasks.iter().find(|t| &t.id == id).unwrap();
        for pair in order.windows(2) {
            let ordering = prioritizer
                .ranker()
                .compare(find(&pair[0]), find(&pair[1]), &signals);
            assert_eq!(ordering, std::cmp::Ordering::Less);
        }
    }

    #[tokio::test]
    async fn test_population_failure_is_fatal() {
        let prioritizer = prioritizer(FailingStore {
            similar_for_variant: Some("osx"),
            ..Default::default()
        });
        let tasks = vec![
            task("a", "linux", Requester::Revision, &[]),
            task("b", "osx", Requester::Revision, &[]),
        ];

        let err = prioritizer.prioritize(&tasks).await.unwrap_err();
        match err {
            PrioritizeError::QueryFailure {
                operation, task_id, ..
            } => {
                assert_eq!(operation, signals::SIMILAR_FAILURES);
                assert_eq!(task_id, TaskId::from("b"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_previous_completion_failure_is_fatal() {
        let prioritizer = prioritizer(FailingStore {
            previous_for_variant: Some("linux"),
            ..Default::default()
        });
        let tasks = vec![
            task("a", "linux", Requester::Revision, &[]),
            task("b", "osx", Requester::Revision, &["a"]),
        ];

        let err = prioritizer.prioritize(&tasks).await.unwrap_err();
        assert!(matches!(
            err,
            PrioritizeError::QueryFailure { operation, ref task_id, .. }
                if operation == signals::PREVIOUS_COMPLETION && task_id == &TaskId::from("a")
        ));
    }

    #[tokio::test]
    async fn test_dependency_lookup_failure_is_fatal() {
        let prioritizer = prioritizer(FailingStore {
            lookup: true,
            ..Default::default()
        });
        let tasks = vec![
            task("a", "linux", Requester::Revision, &[]),
            task("b", "linux", Requester::Revision, &["setup_external"]),
        ];

        let err = prioritizer.prioritize(&tasks).await.unwrap_err();
        match err {
            PrioritizeError::QueryFailure {
                operation,
                task_id,
                source,
            } => {
                assert_eq!(operation, RESOLVE_DEPENDENCIES);
                assert_eq!(task_id, TaskId::from("b"));
                assert!(matches!(source, cadence_core::Error::Backend(_)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_patch_only_batch_never_queries_history() {
        let prioritizer = prioritizer(FailingStore {
            previous_for_variant: Some("linux"),
            similar_for_variant: Some("linux"),
            ..Default::default()
        });
        let tasks = vec![task("p", "linux", Requester::Patch, &[])];
        assert_eq!(
            prioritizer.prioritize(&tasks).await.unwrap(),
            vec![TaskId::from("p")]
        );
    }

    #[tokio::test]
    async fn test_cancellation_abandons_population() {
        let prioritizer = prioritizer(StalledStore);
        let tasks = vec![task("a", "linux", Requester::Revision, &[])];
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = prioritizer.prioritize_with_cancel(&tasks, &cancel).await;
        assert!(matches!(result, Err(PrioritizeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dangling_dependency_rejected() {
        let tasks = vec![task("a", "linux", Requester::Revision, &["ghost"])];
        let err = prioritizer(history()).prioritize(&tasks).await.unwrap_err();
        assert!(matches!(
            err,
            PrioritizeError::DanglingDependency { ref task_id, ref dependency }
                if task_id == &TaskId::from("a") && dependency == &TaskId::from("ghost")
        ));
    }

    #[tokio::test]
    async fn test_external_dependency_resolved_from_store() {
        let tasks = vec![task("a", "linux", Requester::Revision, &["setup_external"])];
        let order = prioritizer(history()).prioritize(&tasks).await.unwrap();
        assert_eq!(order, vec![TaskId::from("a")]);
    }

    #[tokio::test]
    async fn test_invalid_batches() {
        let prioritizer = prioritizer(InMemoryMetadataStore::new());

        assert!(matches!(
            prioritizer.prioritize(&[]).await,
            Err(PrioritizeError::InvalidBatch(_))
        ));

        let duplicate = vec![
            task("a", "linux", Requester::Patch, &[]),
            task("a", "osx", Requester::Patch, &[]),
        ];
        assert!(matches!(
            prioritizer.prioritize(&duplicate).await,
            Err(PrioritizeError::InvalidBatch(_))
        ));

        let self_loop = vec![task("a", "linux", Requester::Patch, &["a"])];
        assert!(matches!(
            prioritizer.prioritize(&self_loop).await,
            Err(PrioritizeError::InvalidBatch(_))
        ));
    }

    #[tokio::test]
    async fn test_configured_criteria_are_used() {
        let config = SchedulerConfig {
            criteria: vec![RankingCriterion::DependencyCount],
            ..Default::default()
        };
        let prioritizer = Prioritizer::new(Arc::new(InMemoryMetadataStore::new()), &config);
        assert_eq!(
            prioritizer.ranker().criteria(),
            &[RankingCriterion::DependencyCount]
        );

        let mut urgent = task("z_root", "linux", Requester::Patch, &[]);
        urgent.priority = -10;
        let tasks = vec![
            task("a_leaf", "linux", Requester::Patch, &["z_root"]),
            urgent,
        ];

        let order = prioritizer.prioritize(&tasks).await.unwrap();
        assert_eq!(order[0], TaskId::from("z_root"));
    }
}
