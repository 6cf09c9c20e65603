//! Single-position evaluation behind a trait, so the analysis pipeline can be
//! driven by Stockfish, the cloud database, or a scripted stand-in in tests.

use crate::cloud::CloudEvaluator;
use crate::stockfish::{EngineConfig, StockfishEngine};
use crate::{EngineCommand, EngineEvent, EngineInfo, GoParams, ScoreBound};
use async_trait::async_trait;
use chess::AnalysisScore;
use std::time::Duration;

/// Search budget for one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBudget {
    /// Fixed node count. Latency stays near-constant regardless of position.
    Nodes(u64),
    /// Legacy time/depth search, whichever limit is hit first.
    TimeDepth { movetime_ms: u64, depth: u8 },
}

impl SearchBudget {
    pub fn go_params(self) -> GoParams {
        match self {
            Self::Nodes(nodes) => GoParams {
                nodes: Some(nodes),
                ..Default::default()
            },
            Self::TimeDepth { movetime_ms, depth } => GoParams {
                movetime: Some(movetime_ms),
                depth: Some(depth),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// The engine could not be started, crashed, or is otherwise unreachable.
    #[error("position evaluator unavailable: {0}")]
    Unavailable(String),
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),
    /// The evaluator answered but produced no usable score for this position.
    #[error("position rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait PositionEvaluator: Send {
    /// Score `fen` from the side-to-move's perspective.
    async fn evaluate(&mut self, fen: &str, budget: SearchBudget)
        -> Result<AnalysisScore, EvalError>;

    fn name(&self) -> &'static str;

    /// Release external resources. Evaluation after shutdown reports `Unavailable`.
    async fn shutdown(&mut self) {}
}

/// Creates one evaluator per background worker.
#[async_trait]
pub trait EvaluatorFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn PositionEvaluator>, EvalError>;
}

/// Evaluator backed by a dedicated Stockfish process.
///
/// A search that fails at the process level (closed pipes, exited engine) marks
/// the evaluator dead; every later call reports `Unavailable` without retrying.
pub struct StockfishEvaluator {
    engine: Option<StockfishEngine>,
    timeout: Duration,
    failure: Option<String>,
}

impl StockfishEvaluator {
    #[tracing::instrument(level = "info", skip(config), fields(path = ?config.path))]
    pub async fn spawn(config: EngineConfig, timeout: Duration) -> Result<Self, EvalError> {
        let engine = StockfishEngine::spawn_with_config(config)
            .await
            .map_err(|e| EvalError::Unavailable(e.to_string()))?;
        Ok(Self {
            engine: Some(engine),
            timeout,
            failure: None,
        })
    }

    async fn mark_dead(&mut self, reason: String) {
        tracing::warn!(reason = %reason, "Stockfish evaluator disabled");
        if let Some(engine) = self.engine.take() {
            engine.shutdown().await;
        }
        self.failure = Some(reason);
    }
}

enum SearchFailure {
    Engine(String),
    TimedOut,
    NoScore,
}

#[async_trait]
impl PositionEvaluator for StockfishEvaluator {
    async fn evaluate(
        &mut self,
        fen: &str,
        budget: SearchBudget,
    ) -> Result<AnalysisScore, EvalError> {
        chess::parse_fen(fen).map_err(|e| EvalError::Rejected(format!("{}: {}", e, fen)))?;

        let timeout = self.timeout;
        let outcome = match self.engine.as_mut() {
            None => {
                let reason = self.failure.clone().unwrap_or_else(|| "engine shut down".into());
                return Err(EvalError::Unavailable(reason));
            }
            Some(engine) => match tokio::time::timeout(timeout, search(engine, fen, budget)).await {
                Ok(result) => result,
                Err(_) => {
                    if stop_and_drain(engine).await {
                        Err(SearchFailure::TimedOut)
                    } else {
                        Err(SearchFailure::Engine("engine unresponsive after stop".into()))
                    }
                }
            },
        };

        match outcome {
            Ok(score) => Ok(score),
            Err(SearchFailure::TimedOut) => Err(EvalError::Timeout(timeout)),
            Err(SearchFailure::NoScore) => {
                Err(EvalError::Rejected("engine returned no score".into()))
            }
            Err(SearchFailure::Engine(reason)) => {
                self.mark_dead(reason.clone()).await;
                Err(EvalError::Unavailable(reason))
            }
        }
    }

    fn name(&self) -> &'static str {
        "stockfish"
    }

    async fn shutdown(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.shutdown().await;
        }
    }
}

/// Latest main-line score of a search. A bound only stands in when the engine
/// never reported an exact score.
#[derive(Debug, Default)]
struct PvScore {
    exact: Option<AnalysisScore>,
    bound: Option<AnalysisScore>,
}

impl PvScore {
    fn observe(&mut self, info: &EngineInfo) {
        if info.multipv.unwrap_or(1) != 1 {
            return;
        }
        let Some(score) = info.score else { return };
        match info.bound {
            ScoreBound::Exact => self.exact = Some(score.into()),
            ScoreBound::Lower | ScoreBound::Upper => self.bound = Some(score.into()),
        }
    }

    fn best(self) -> Option<AnalysisScore> {
        self.exact.or(self.bound)
    }
}

/// Run one search and return its main-line score once `bestmove` arrives.
async fn search(
    engine: &mut StockfishEngine,
    fen: &str,
    budget: SearchBudget,
) -> Result<AnalysisScore, SearchFailure> {
    let closed = |e: crate::EngineError| SearchFailure::Engine(e.to_string());
    engine
        .send_command(EngineCommand::SetPosition {
            fen: fen.to_string(),
        })
        .await
        .map_err(closed)?;
    engine
        .send_command(EngineCommand::Go(budget.go_params()))
        .await
        .map_err(closed)?;

    let mut score = PvScore::default();
    loop {
        match engine.recv_event().await {
            Some(EngineEvent::Info(info)) => score.observe(&info),
            Some(EngineEvent::BestMove(_)) => {
                return score.best().ok_or(SearchFailure::NoScore);
            }
            Some(EngineEvent::Error(e)) => return Err(SearchFailure::Engine(e)),
            Some(EngineEvent::Ready) => {}
            None => return Err(SearchFailure::Engine("engine process exited".into())),
        }
    }
}

/// Abort a running search and consume its `bestmove` so the next search starts clean.
async fn stop_and_drain(engine: &mut StockfishEngine) -> bool {
    if engine.send_command(EngineCommand::Stop).await.is_err() {
        return false;
    }
    let drained = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(event) = engine.recv_event().await {
            if matches!(event, EngineEvent::BestMove(_)) {
                return true;
            }
        }
        false
    })
    .await;
    drained.unwrap_or(false)
}

/// Tries `primary` first and falls back on any error.
pub struct FallbackEvaluator {
    primary: Box<dyn PositionEvaluator>,
    fallback: Box<dyn PositionEvaluator>,
}

impl FallbackEvaluator {
    pub fn new(primary: Box<dyn PositionEvaluator>, fallback: Box<dyn PositionEvaluator>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl PositionEvaluator for FallbackEvaluator {
    async fn evaluate(
        &mut self,
        fen: &str,
        budget: SearchBudget,
    ) -> Result<AnalysisScore, EvalError> {
        match self.primary.evaluate(fen, budget).await {
            Ok(score) => Ok(score),
            Err(err) => {
                tracing::trace!(
                    primary = self.primary.name(),
                    error = %err,
                    "falling back to {}",
                    self.fallback.name()
                );
                self.fallback.evaluate(fen, budget).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn shutdown(&mut self) {
        self.primary.shutdown().await;
        self.fallback.shutdown().await;
    }
}

/// Spawns a Stockfish evaluator per worker, optionally fronted by the cloud database.
#[derive(Clone)]
pub struct StockfishFactory {
    config: EngineConfig,
    timeout: Duration,
    cloud: Option<CloudEvaluator>,
}

impl StockfishFactory {
    pub fn new(config: EngineConfig, timeout: Duration) -> Self {
        Self {
            config,
            timeout,
            cloud: None,
        }
    }

    pub fn with_cloud(mut self, cloud: CloudEvaluator) -> Self {
        self.cloud = Some(cloud);
        self
    }
}

#[async_trait]
impl EvaluatorFactory for StockfishFactory {
    async fn create(&self) -> Result<Box<dyn PositionEvaluator>, EvalError> {
        let spawned = StockfishEvaluator::spawn(self.config.clone(), self.timeout).await;
        match (spawned, self.cloud.clone()) {
            (Ok(engine), Some(cloud)) => Ok(Box::new(FallbackEvaluator::new(
                Box::new(cloud),
                Box::new(engine),
            ))),
            (Ok(engine), None) => Ok(Box::new(engine)),
            (Err(err), Some(cloud)) => {
                tracing::warn!(error = %err, "Stockfish unavailable, using cloud evaluation only");
                Ok(Box::new(cloud))
            }
            (Err(err), None) => Err(err),
        }
    }
}
