//! In-memory task registry.
//!
//! Tasks live in a fixed number of shards, each behind its own `RwLock`, and
//! every task record has its own `RwLock` as well. Shard locks are held only
//! to look up, insert or remove an entry, so polling one task never waits on
//! the worker writing another.

pub mod types;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::Duration;

use analysis::AggregatedResult;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub use types::*;

const SHARD_COUNT: usize = 16;

type Shard = RwLock<HashMap<TaskId, Arc<RwLock<AnalysisTask>>>>;

pub struct TaskSupervisor {
    shards: Vec<Shard>,
    ttl: Duration,
    seconds_per_item: f64,
}

impl TaskSupervisor {
    pub fn new(ttl: Duration, seconds_per_item: f64) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            ttl,
            seconds_per_item,
        }
    }

    fn shard(&self, id: &TaskId) -> &Shard {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    async fn record(&self, id: &TaskId) -> Option<Arc<RwLock<AnalysisTask>>> {
        self.shard(id).read().await.get(id).cloned()
    }

    /// Register a new `processing` task with progress `0 / total_items`.
    pub async fn create(&self, total_items: usize) -> TaskId {
        let now = Instant::now();
        let id = TaskId::new();
        let task = AnalysisTask {
            id,
            state: TaskState::Processing,
            progress: Progress {
                current: 0,
                total: total_items,
            },
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.shard(&id)
            .write()
            .await
            .insert(id, Arc::new(RwLock::new(task)));
        tracing::info!(task_id = %id, total_items, "Task created");
        id
    }

    /// Raise `progress.current`. Never lowers it, never exceeds `total`, and is a
    /// no-op for unknown or terminal tasks.
    pub async fn update_progress(&self, id: &TaskId, current: usize) {
        let Some(record) = self.record(id).await else {
            tracing::debug!(task_id = %id, "Progress update for unknown task ignored");
            return;
        };
        let mut task = record.write().await;
        if task.state.is_terminal() {
            tracing::debug!(task_id = %id, "Progress update for finished task ignored");
            return;
        }
        let next = current.min(task.progress.total);
        if next > task.progress.current {
            task.progress.current = next;
            tracing::debug!(task_id = %id, current = next, total = task.progress.total, "Task progress");
        }
    }

    pub async fn complete(&self, id: &TaskId, result: AggregatedResult) {
        self.finish(id, TaskState::Completed(result)).await;
    }

    pub async fn fail(&self, id: &TaskId, message: impl Into<String>) {
        self.finish(id, TaskState::Error(message.into())).await;
    }

    async fn finish(&self, id: &TaskId, state: TaskState) {
        let Some(record) = self.record(id).await else {
            tracing::warn!(task_id = %id, "Cannot finish unknown task");
            return;
        };
        let mut task = record.write().await;
        if task.state.is_terminal() {
            tracing::warn!(task_id = %id, "Task already finished, ignoring transition");
            return;
        }
        match &state {
            TaskState::Completed(_) => {
                task.progress.current = task.progress.total;
                tracing::info!(task_id = %id, "Task completed");
            }
            TaskState::Error(message) => {
                tracing::warn!(task_id = %id, error = %message, "Task failed");
            }
            TaskState::Processing => {}
        }
        task.state = state;
        // Results get a full TTL window from completion.
        task.expires_at = Instant::now() + self.ttl;
    }

    /// Current status of `id`. An expired task is evicted and reads as `NotFound`.
    pub async fn get_status(&self, id: &TaskId) -> TaskStatusView {
        let Some(record) = self.record(id).await else {
            return TaskStatusView::NotFound;
        };
        let view = {
            let task = record.read().await;
            if task.is_expired(Instant::now()) {
                None
            } else {
                Some(self.view(&task))
            }
        };
        match view {
            Some(view) => view,
            None => {
                self.evict_if_expired(id).await;
                TaskStatusView::NotFound
            }
        }
    }

    fn view(&self, task: &AnalysisTask) -> TaskStatusView {
        match &task.state {
            TaskState::Processing => {
                let remaining = task.progress.total.saturating_sub(task.progress.current);
                TaskStatusView::Processing {
                    progress: ProgressView {
                        current: task.progress.current,
                        total: task.progress.total,
                        percentage: task.progress.percentage(),
                        estimated_remaining_seconds: remaining as f64 * self.seconds_per_item,
                    },
                }
            }
            TaskState::Completed(result) => TaskStatusView::Completed {
                data: result.clone(),
            },
            TaskState::Error(error) => TaskStatusView::Error {
                error: error.clone(),
            },
        }
    }

    async fn evict_if_expired(&self, id: &TaskId) {
        let mut shard = self.shard(id).write().await;
        let expired = match shard.get(id) {
            Some(record) => record.read().await.is_expired(Instant::now()),
            None => false,
        };
        if expired {
            shard.remove(id);
            tracing::debug!(task_id = %id, "Expired task evicted");
        }
    }

    /// Remove every expired task. Returns the number evicted.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        for shard in &self.shards {
            let mut shard = shard.write().await;
            let mut expired = Vec::new();
            for (id, record) in shard.iter() {
                if record.read().await.is_expired(now) {
                    expired.push(*id);
                }
            }
            for id in expired {
                shard.remove(&id);
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::info!(evicted, "Swept expired tasks");
        }
        evicted
    }

    /// Count live (unexpired) tasks by state.
    pub async fn counts(&self) -> TaskCounts {
        let now = Instant::now();
        let mut counts = TaskCounts::default();
        for shard in &self.shards {
            let records: Vec<_> = shard.read().await.values().cloned().collect();
            for record in records {
                let task = record.read().await;
                if task.is_expired(now) {
                    continue;
                }
                if task.state.is_terminal() {
                    counts.finished += 1;
                } else {
                    counts.processing += 1;
                }
            }
        }
        counts
    }

    /// Sweep on a fixed interval until the supervisor is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(supervisor) = weak.upgrade() else {
                    tracing::debug!("Task supervisor dropped, sweeper exiting");
                    break;
                };
                supervisor.sweep().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const TTL: Duration = Duration::from_secs(3600);

    fn supervisor() -> TaskSupervisor {
        TaskSupervisor::new(TTL, 2.5)
    }

    async fn progress_of(sup: &TaskSupervisor, id: &TaskId) -> ProgressView {
        match sup.get_status(id).await {
            TaskStatusView::Processing { progress } => progress,
            other => panic!("expected processing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_starts_processing() {
        let sup = supervisor();
        let id = sup.create(10).await;
        let progress = progress_of(&sup, &id).await;
        assert_eq!((progress.current, progress.total, progress.percentage), (0, 10, 0));
        assert_eq!(progress.estimated_remaining_seconds, 25.0);
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_distinct_ids() {
        let sup = Arc::new(supervisor());
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let sup = sup.clone();
                tokio::spawn(async move { sup.create(1).await })
            })
            .collect();
        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 64);
        assert_eq!(sup.counts().await.processing, 64);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_clamped() {
        let sup = supervisor();
        let id = sup.create(5).await;
        sup.update_progress(&id, 3).await;
        sup.update_progress(&id, 1).await;
        assert_eq!(progress_of(&sup, &id).await.current, 3);
        sup.update_progress(&id, 99).await;
        let progress = progress_of(&sup, &id).await;
        assert_eq!((progress.current, progress.percentage), (5, 100));
        assert_eq!(progress.estimated_remaining_seconds, 0.0);
    }

    #[tokio::test]
    async fn test_updates_after_completion_are_ignored() {
        let sup = supervisor();
        let id = sup.create(2).await;
        sup.complete(&id, AggregatedResult::empty(2)).await;
        sup.update_progress(&id, 1).await;
        sup.fail(&id, "late failure").await;
        assert!(matches!(
            sup.get_status(&id).await,
            TaskStatusView::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found_and_updates_are_noops() {
        let sup = supervisor();
        let id = TaskId::new();
        sup.update_progress(&id, 1).await;
        sup.complete(&id, AggregatedResult::empty(0)).await;
        assert_eq!(sup.get_status(&id).await, TaskStatusView::NotFound);
    }

    #[tokio::test]
    async fn test_fail_reports_error() {
        let sup = supervisor();
        let id = sup.create(1).await;
        sup.fail(&id, "position evaluator unavailable: not found").await;
        assert_eq!(
            sup.get_status(&id).await,
            TaskStatusView::Error {
                error: "position evaluator unavailable: not found".into()
            }
        );
        assert_eq!(
            sup.counts().await,
            TaskCounts {
                processing: 0,
                finished: 1
            }
        );
    }

    #[tokio::test]
    async fn test_completed_polling_is_idempotent() {
        let sup = supervisor();
        let id = sup.create(3).await;
        sup.complete(&id, AggregatedResult::empty(3)).await;
        let first = serde_json::to_string(&sup.get_status(&id).await).unwrap();
        let second = serde_json::to_string(&sup.get_status(&id).await).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_task_is_not_found_without_prior_poll() {
        let sup = supervisor();
        let id = sup.create(1).await;
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert_eq!(sup.get_status(&id).await, TaskStatusView::NotFound);
        assert_eq!(sup.counts().await, TaskCounts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_refreshes_expiry() {
        let sup = supervisor();
        let id = sup.create(1).await;
        tokio::time::advance(TTL - Duration::from_secs(10)).await;
        sup.complete(&id, AggregatedResult::empty(1)).await;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(matches!(
            sup.get_status(&id).await,
            TaskStatusView::Completed { .. }
        ));
        tokio::time::advance(TTL).await;
        assert_eq!(sup.get_status(&id).await, TaskStatusView::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_expired() {
        let sup = supervisor();
        let old = sup.create(1).await;
        tokio::time::advance(TTL / 2).await;
        let fresh = sup.create(1).await;
        tokio::time::advance(TTL / 2 + Duration::from_secs(1)).await;
        assert_eq!(sup.sweep().await, 1);
        assert_eq!(sup.get_status(&old).await, TaskStatusView::NotFound);
        assert!(matches!(
            sup.get_status(&fresh).await,
            TaskStatusView::Processing { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_evicts() {
        let sup = Arc::new(TaskSupervisor::new(Duration::from_secs(10), 2.5));
        let _sweeper = sup.spawn_sweeper(Duration::from_secs(5));
        sup.create(1).await;
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(sup.counts().await, TaskCounts::default());
        assert_eq!(sup.sweep().await, 0);
    }
}
