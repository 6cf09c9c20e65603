//! Lichess cloud evaluation lookup.
//!
//! Only positions already analysed on Lichess are answered; anything else is a
//! miss and is expected to be handled by a fallback evaluator.

use crate::evaluator::{EvalError, PositionEvaluator, SearchBudget};
use async_trait::async_trait;
use chess::AnalysisScore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const LICHESS_CLOUD_EVAL_URL: &str = "https://lichess.org/api/cloud-eval";
pub const DEFAULT_CLOUD_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Lookup counters, shared by every clone of one `CloudEvaluator`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CloudStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl CloudStats {
    pub fn api_calls(&self) -> u64 {
        self.hits + self.misses + self.errors
    }
}

#[derive(Debug, Clone)]
pub struct CloudEvaluator {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    counters: Arc<Counters>,
}

#[derive(Debug, Deserialize)]
struct CloudEvalResponse {
    #[serde(default)]
    depth: Option<u32>,
    #[serde(default)]
    pvs: Vec<CloudPv>,
}

#[derive(Debug, Deserialize)]
struct CloudPv {
    #[serde(default)]
    cp: Option<i32>,
    #[serde(default)]
    mate: Option<i32>,
}

impl CloudEvaluator {
    pub fn new(timeout: Duration) -> Result<Self, EvalError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EvalError::Unavailable(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: LICHESS_CLOUD_EVAL_URL.to_string(),
            timeout,
            counters: Arc::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn stats(&self) -> CloudStats {
        CloudStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    async fn lookup(&self, fen: &str) -> Result<Option<CloudEvalResponse>, reqwest::Error> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("fen", fen), ("multiPv", "1")])
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.error_for_status()?.json().await?;
        Ok(Some(body))
    }
}

/// Lichess reports scores from White's point of view; flip for Black to move.
fn score_from_response(response: &CloudEvalResponse, white_to_move: bool) -> Option<AnalysisScore> {
    let pv = response.pvs.first()?;
    let white_pov = match (pv.mate, pv.cp) {
        (Some(mate), _) => AnalysisScore::Mate(mate),
        (None, Some(cp)) => AnalysisScore::Centipawns(cp),
        (None, None) => return None,
    };
    Some(if white_to_move {
        white_pov
    } else {
        white_pov.negate()
    })
}

#[async_trait]
impl PositionEvaluator for CloudEvaluator {
    async fn evaluate(
        &mut self,
        fen: &str,
        _budget: SearchBudget,
    ) -> Result<AnalysisScore, EvalError> {
        let board =
            chess::parse_fen(fen).map_err(|e| EvalError::Rejected(format!("{}: {}", e, fen)))?;
        let white_to_move = board.side_to_move() == cozy_chess::Color::White;

        match self.lookup(fen).await {
            Ok(Some(response)) => match score_from_response(&response, white_to_move) {
                Some(score) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(depth = ?response.depth, %score, "cloud eval hit");
                    Ok(score)
                }
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    Err(EvalError::Rejected("cloud eval has no principal variation".into()))
                }
            },
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Err(EvalError::Rejected("position not in cloud database".into()))
            }
            Err(e) if e.is_timeout() => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                Err(EvalError::Timeout(self.timeout))
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %e, "cloud eval request failed");
                Err(EvalError::Unavailable(format!("cloud eval: {}", e)))
            }
        }
    }

    fn name(&self) -> &'static str {
        "lichess-cloud"
    }

    async fn shutdown(&mut self) {
        let stats = self.stats();
        tracing::debug!(
            hits = stats.hits,
            misses = stats.misses,
            errors = stats.errors,
            api_calls = stats.api_calls(),
            "Cloud evaluation finished"
        );
    }
}
