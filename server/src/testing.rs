//! Scripted evaluators for driving the pipeline without a Stockfish binary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chess::AnalysisScore;
use engine::{EvalError, EvaluatorFactory, PositionEvaluator, SearchBudget};

type ScriptFn = dyn Fn(&str, usize) -> Result<AnalysisScore, EvalError> + Send + Sync;

/// Maps `(fen, call_number)` to an evaluation.
#[derive(Clone)]
pub(crate) struct Script(Arc<ScriptFn>);

impl Script {
    pub(crate) fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str, usize) -> Result<AnalysisScore, EvalError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn constant(cp: i32) -> Self {
        Self::from_fn(move |_, _| Ok(AnalysisScore::Centipawns(cp)))
    }

    pub(crate) fn unavailable() -> Self {
        Self::from_fn(|_, _| Err(EvalError::Unavailable("engine crashed".into())))
    }
}

pub(crate) struct ScriptedEvaluator {
    script: Script,
    calls: Arc<AtomicUsize>,
    fens: Arc<std::sync::Mutex<Vec<String>>>,
}

#[async_trait]
impl PositionEvaluator for ScriptedEvaluator {
    async fn evaluate(
        &mut self,
        fen: &str,
        _budget: SearchBudget,
    ) -> Result<AnalysisScore, EvalError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut fens) = self.fens.lock() {
            fens.push(fen.to_string());
        }
        (self.script.0)(fen, call)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub(crate) struct ScriptedFactory {
    script: Script,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
    fens: Arc<std::sync::Mutex<Vec<String>>>,
}

impl ScriptedFactory {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            failure: None,
            calls: Arc::default(),
            fens: Arc::default(),
        }
    }

    pub(crate) fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::new(Script::unavailable())
        }
    }

    /// Total evaluations across every evaluator this factory created.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn evaluated_fens(&self) -> Vec<String> {
        self.fens.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EvaluatorFactory for ScriptedFactory {
    async fn create(&self) -> Result<Box<dyn PositionEvaluator>, EvalError> {
        if let Some(reason) = &self.failure {
            return Err(EvalError::Unavailable(reason.clone()));
        }
        Ok(Box::new(ScriptedEvaluator {
            script: self.script.clone(),
            calls: self.calls.clone(),
            fens: self.fens.clone(),
        }))
    }
}

/// A PGN in which the given side plays `player_moves` moves (knight shuffles).
pub(crate) fn shuffle_pgn(player_moves: usize) -> String {
    const WHITE: [&str; 4] = ["Nf3", "Ng1", "Nc3", "Nb1"];
    const BLACK: [&str; 4] = ["Nf6", "Ng8", "Nc6", "Nb8"];
    let mut pgn = String::from("[Event \"Test\"]\n[Result \"*\"]\n\n");
    for i in 0..player_moves {
        pgn.push_str(&format!("{}. {} {} ", i + 1, WHITE[i % 4], BLACK[i % 4]));
    }
    pgn.push('*');
    pgn
}
