//! Entry point for callers: submit a batch, get a task id back at once, poll later.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use analysis::{selected_indices, AggregatedResult, GameRecord};
use engine::cloud::DEFAULT_CLOUD_TIMEOUT;
use engine::{CloudEvaluator, EvalError, EvaluatorFactory, StockfishFactory};
use tokio::task::JoinHandle;

use crate::config::MistakeConfig;
use crate::pool::EnginePool;
use crate::tasks::{TaskCounts, TaskCreated, TaskId, TaskStatusView, TaskSupervisor};
use crate::worker::{run_analysis, WorkerContext};

/// Upper bound on how long an expired task stays resident.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct MistakeAnalyzer {
    config: Arc<MistakeConfig>,
    supervisor: Arc<TaskSupervisor>,
    pool: EnginePool,
    /// Evicts expired tasks whether or not anyone polls them. Started by the
    /// first `submit`, aborted when the analyzer is dropped.
    sweeper: OnceLock<JoinHandle<()>>,
}

/// The detached worker for one task.
///
/// Dropping the handle leaves the worker running; there is no cancellation.
/// A panic inside the worker is turned into a failed task by a supervising task.
pub struct WorkerHandle {
    task_id: TaskId,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Wait until the task has reached a terminal state.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            tracing::error!(task_id = %self.task_id, error = %e, "Worker supervisor ended abnormally");
        }
    }
}

pub struct Submission {
    pub created: TaskCreated,
    /// `None` when nothing needed analysing and the task completed immediately.
    pub worker: Option<WorkerHandle>,
}

impl MistakeAnalyzer {
    pub fn new(config: MistakeConfig, factory: Arc<dyn EvaluatorFactory>) -> Self {
        let supervisor = Arc::new(TaskSupervisor::new(
            config.task_ttl,
            config.seconds_per_game_estimate,
        ));
        let pool = EnginePool::new(factory, config.max_concurrent_engines);
        tracing::info!(
            max_games = config.max_analysis_games,
            moves_per_stage = config.moves_per_stage,
            budget = ?config.search_budget(),
            max_engines = config.max_concurrent_engines,
            "Mistake analyzer initialized"
        );
        Self {
            config: Arc::new(config),
            supervisor,
            pool,
            sweeper: OnceLock::new(),
        }
    }

    /// Analyzer backed by a local Stockfish, with the Lichess cloud cache in
    /// front of it when `config.cloud_eval` is set.
    pub fn with_stockfish(config: MistakeConfig) -> Result<Self, EvalError> {
        let mut factory = StockfishFactory::new(config.engine_config(), config.position_timeout);
        if config.cloud_eval {
            factory = factory.with_cloud(CloudEvaluator::new(DEFAULT_CLOUD_TIMEOUT)?);
        }
        Ok(Self::new(config, Arc::new(factory)))
    }

    pub fn supervisor(&self) -> &Arc<TaskSupervisor> {
        &self.supervisor
    }

    pub fn config(&self) -> &MistakeConfig {
        &self.config
    }

    /// Create a task for `games` and start its worker. Returns without waiting on it.
    pub async fn submit(&self, games: Vec<GameRecord>) -> Submission {
        self.sweeper.get_or_init(|| {
            let interval = self
                .config
                .task_ttl
                .clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL);
            self.supervisor.spawn_sweeper(interval)
        });

        let selected = selected_indices(games.len(), self.config.max_analysis_games);
        let task_id = self.supervisor.create(selected.len()).await;
        let estimated_time_seconds =
            selected.len() as f64 * self.config.seconds_per_game_estimate;

        if selected.is_empty() {
            self.supervisor
                .complete(&task_id, AggregatedResult::empty(games.len()))
                .await;
            return Submission {
                created: TaskCreated {
                    task_id,
                    estimated_time_seconds: 0.0,
                    message: "No games to analyse".to_string(),
                },
                worker: None,
            };
        }

        let message = format!(
            "Mistake analysis started for {} of {} games",
            selected.len(),
            games.len()
        );
        let ctx = WorkerContext {
            config: self.config.clone(),
            supervisor: self.supervisor.clone(),
            pool: self.pool.clone(),
        };
        let games: Arc<[GameRecord]> = games.into();
        let worker = tokio::spawn(run_analysis(ctx, task_id, games, selected));

        let supervisor = self.supervisor.clone();
        let join = tokio::spawn(async move {
            if let Err(e) = worker.await {
                let message = if e.is_panic() {
                    "analysis worker crashed".to_string()
                } else {
                    format!("analysis worker stopped: {}", e)
                };
                tracing::error!(task_id = %task_id, error = %e, "Worker terminated abnormally");
                supervisor.fail(&task_id, message).await;
            }
        });

        Submission {
            created: TaskCreated {
                task_id,
                estimated_time_seconds,
                message,
            },
            worker: Some(WorkerHandle { task_id, join }),
        }
    }

    pub async fn status(&self, task_id: &TaskId) -> TaskStatusView {
        self.supervisor.get_status(task_id).await
    }

    pub async fn counts(&self) -> TaskCounts {
        self.supervisor.counts().await
    }
}

impl Drop for MistakeAnalyzer {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get() {
            sweeper.abort();
        }
    }
}
