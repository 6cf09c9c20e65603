//! Background worker: runs the whole pipeline for one task.
//!
//! Game Selector -> (per game) PGN parse -> Move Sampler -> Position Evaluator
//! -> Move Classifier -> Stage Aggregator, reporting progress after every game.

use std::sync::Arc;

use analysis::{
    player_pov, select_moves, GameAnalysis, GameOutcome, GameRecord, GameSkipReason,
    MoveEvaluation, MoveOutcome, SkipReason, Stage, StageAggregator,
};
use chess::{is_checkmate, is_terminal_position, AnalysisScore, PgnMove};
use engine::{EvalError, PositionEvaluator, SearchBudget};

use crate::config::MistakeConfig;
use crate::pool::EnginePool;
use crate::tasks::{TaskId, TaskSupervisor};

pub(crate) struct WorkerContext {
    pub config: Arc<MistakeConfig>,
    pub supervisor: Arc<TaskSupervisor>,
    pub pool: EnginePool,
}

/// Analyse `selected` games of `games` for `task_id` and record the outcome.
#[tracing::instrument(level = "info", skip_all, fields(task_id = %task_id, games = selected.len()))]
pub(crate) async fn run_analysis(
    ctx: WorkerContext,
    task_id: TaskId,
    games: Arc<[GameRecord]>,
    selected: Vec<usize>,
) {
    let mut evaluator = match ctx.pool.acquire().await {
        Ok(evaluator) => evaluator,
        Err(e) => {
            tracing::error!(error = %e, "Could not start position evaluator");
            ctx.supervisor.fail(&task_id, e.to_string()).await;
            return;
        }
    };

    let budget = ctx.config.search_budget();
    let mut aggregator = StageAggregator::new(games.len());

    for (done, &game_index) in selected.iter().enumerate() {
        let game = &games[game_index];
        let outcome = analyze_game(game, evaluator.evaluator(), &ctx.config, budget).await;
        match &outcome {
            GameOutcome::Analyzed(analysis) => tracing::debug!(
                game_index,
                url = %analysis.url,
                moves = analysis.moves.len(),
                "Game analysed"
            ),
            GameOutcome::Skipped { url, reason } => {
                tracing::warn!(game_index, url = %url, reason = %reason, "Game skipped")
            }
        }
        aggregator.record(outcome);
        ctx.supervisor.update_progress(&task_id, done + 1).await;
    }

    evaluator.release().await;
    let result = aggregator.finish();
    tracing::info!(
        games_analyzed = result.games_analyzed,
        moves_evaluated = result.moves_evaluated,
        moves_skipped = result.moves_skipped,
        "Mistake analysis finished"
    );
    ctx.supervisor.complete(&task_id, result).await;
}

/// Evaluate the sampled moves of one game. Never fails: problems become skip outcomes.
pub(crate) async fn analyze_game(
    game: &GameRecord,
    evaluator: &mut dyn PositionEvaluator,
    config: &MistakeConfig,
    budget: SearchBudget,
) -> GameOutcome {
    let pgn = match chess::parse_pgn(&game.pgn) {
        Ok(pgn) => pgn,
        Err(e) => {
            return GameOutcome::Skipped {
                url: game.url.clone(),
                reason: GameSkipReason::MalformedPgn(e.to_string()),
            }
        }
    };

    let player_moves: Vec<&PgnMove> = pgn.moves_by(game.player_color).collect();
    if player_moves.is_empty() {
        return GameOutcome::Skipped {
            url: game.url.clone(),
            reason: GameSkipReason::NoPlayerMoves,
        };
    }

    let termination = game.termination(Some(&pgn));
    let sample = select_moves(player_moves.len(), config.moves_per_stage);
    let mut moves = Vec::with_capacity(sample.len());
    for (move_index, stage) in sample.iter() {
        let outcome =
            evaluate_move(player_moves[move_index], move_index, stage, evaluator, config, budget)
                .await;
        if let MoveOutcome::Skipped { reason, .. } = &outcome {
            tracing::debug!(move_index, stage = %stage, ?reason, "Move skipped");
        }
        moves.push(outcome);
    }

    GameOutcome::Analyzed(GameAnalysis {
        url: game.url.clone(),
        lost_by_resignation: game.lost_by_resignation(termination),
        moves,
    })
}

async fn evaluate_move(
    mv: &PgnMove,
    move_index: usize,
    stage: Stage,
    evaluator: &mut dyn PositionEvaluator,
    config: &MistakeConfig,
    budget: SearchBudget,
) -> MoveOutcome {
    let skipped = |reason| MoveOutcome::Skipped {
        move_index,
        stage,
        reason,
    };

    // Player to move before the move, opponent to move after it.
    let cp_before = match score_position(evaluator, &mv.fen_before, budget).await {
        Ok(score) => player_pov(score.to_cp(), true),
        Err(e) => return skipped(skip_reason(&e)),
    };
    if config
        .decided_position_cp
        .is_some_and(|limit| cp_before.abs() > limit)
    {
        return skipped(SkipReason::Decided);
    }
    let cp_after = match score_position(evaluator, &mv.fen_after, budget).await {
        Ok(score) => player_pov(score.to_cp(), false),
        Err(e) => return skipped(skip_reason(&e)),
    };

    MoveOutcome::Evaluated(MoveEvaluation::new(
        move_index,
        mv.move_number,
        stage,
        cp_before,
        cp_after,
    ))
}

/// Side-to-move score. Positions without legal moves are scored locally.
async fn score_position(
    evaluator: &mut dyn PositionEvaluator,
    fen: &str,
    budget: SearchBudget,
) -> Result<AnalysisScore, EvalError> {
    if is_terminal_position(fen) {
        return Ok(if is_checkmate(fen) {
            AnalysisScore::Mate(0)
        } else {
            AnalysisScore::Centipawns(0)
        });
    }
    evaluator.evaluate(fen, budget).await
}

fn skip_reason(error: &EvalError) -> SkipReason {
    match error {
        EvalError::Unavailable(_) => SkipReason::EngineUnavailable,
        EvalError::Timeout(_) => SkipReason::Timeout,
        EvalError::Rejected(_) => SkipReason::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{shuffle_pgn, Script, ScriptedFactory};
    use analysis::MoveQuality;
    use chess::PieceColor;

    const SCHOLARS_MATE: &str = "1. e4 e5 2. Bc4 Nc6 3. Qh5 Nf6 4. Qxf7# 1-0";

    fn record(pgn: &str, color: PieceColor) -> GameRecord {
        GameRecord {
            pgn: pgn.to_string(),
            url: "https://www.chess.com/game/live/42".into(),
            player_color: color,
            result: "resigned".into(),
            termination: None,
            player_rating: None,
            opponent_rating: None,
        }
    }

    async fn run_game(game: &GameRecord, script: Script, config: &MistakeConfig) -> GameOutcome {
        let factory = ScriptedFactory::new(script);
        let mut evaluator = engine::EvaluatorFactory::create(&factory).await.unwrap();
        analyze_game(game, evaluator.as_mut(), config, config.search_budget()).await
    }

    fn analysed(outcome: GameOutcome) -> GameAnalysis {
        match outcome {
            GameOutcome::Analyzed(game) => game,
            other => panic!("expected analysed game, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_pgn_is_skipped() {
        let game = record("1. e4 {never closed", PieceColor::White);
        let outcome = run_game(&game, Script::constant(0), &MistakeConfig::default()).await;
        assert!(matches!(
            outcome,
            GameOutcome::Skipped {
                reason: GameSkipReason::MalformedPgn(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_player_without_moves_is_skipped() {
        let game = record("1. e4 *", PieceColor::Black);
        let outcome = run_game(&game, Script::constant(0), &MistakeConfig::default()).await;
        assert!(matches!(
            outcome,
            GameOutcome::Skipped {
                reason: GameSkipReason::NoPlayerMoves,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_orientation_flips_after_move() {
        // Every position reads +30 for the side to move: before = +30 for the
        // player, after = -30 for the player, so each move loses 60.
        let game = record(&shuffle_pgn(4), PieceColor::White);
        let game = analysed(run_game(&game, Script::constant(30), &MistakeConfig::default()).await);
        assert_eq!(game.moves.len(), 4);
        for outcome in &game.moves {
            let eval = outcome.evaluation().unwrap();
            assert_eq!((eval.cp_before, eval.cp_after, eval.cp_delta), (30, -30, -60));
            assert_eq!(eval.quality, MoveQuality::Mistake);
        }
    }

    #[tokio::test]
    async fn test_checkmating_move_is_scored_locally() {
        let factory = ScriptedFactory::new(Script::constant(50));
        let mut evaluator = engine::EvaluatorFactory::create(&factory).await.unwrap();
        let config = MistakeConfig::default();
        let game = record(SCHOLARS_MATE, PieceColor::White);
        let game = analysed(
            analyze_game(&game, evaluator.as_mut(), &config, config.search_budget()).await,
        );

        let mate = game.moves.last().and_then(MoveOutcome::evaluation).unwrap();
        assert_eq!(mate.move_number, 4);
        assert_eq!(mate.cp_after, chess::MATE_SCORE_CP);
        assert_eq!(mate.quality, MoveQuality::Brilliant);
        // 4 before-positions + 3 after-positions; the mated position never reaches the engine.
        assert_eq!(factory.calls(), 7);
        assert!(factory
            .evaluated_fens()
            .iter()
            .all(|fen| !chess::is_terminal_position(fen)));
    }

    #[tokio::test]
    async fn test_decided_position_skips_after_evaluation() {
        let config = MistakeConfig {
            decided_position_cp: Some(600),
            ..Default::default()
        };
        let factory = ScriptedFactory::new(Script::constant(900));
        let mut evaluator = engine::EvaluatorFactory::create(&factory).await.unwrap();
        let game = record(&shuffle_pgn(3), PieceColor::White);
        let game = analysed(
            analyze_game(&game, evaluator.as_mut(), &config, config.search_budget()).await,
        );
        assert!(game.moves.iter().all(|m| matches!(
            m,
            MoveOutcome::Skipped {
                reason: SkipReason::Decided,
                ..
            }
        )));
        assert_eq!(factory.calls(), 3);
    }

    #[tokio::test]
    async fn test_engine_errors_skip_individual_moves() {
        // Every third call fails.
        let script = Script::from_fn(|_, call| {
            if call % 3 == 2 {
                Err(EvalError::Timeout(std::time::Duration::from_secs(1)))
            } else {
                Ok(AnalysisScore::Centipawns(0))
            }
        });
        let game = record(&shuffle_pgn(6), PieceColor::Black);
        let game = analysed(run_game(&game, script, &MistakeConfig::default()).await);
        let skipped = game
            .moves
            .iter()
            .filter(|m| {
                matches!(
                    m,
                    MoveOutcome::Skipped {
                        reason: SkipReason::Timeout,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(game.moves.len(), 6);
        assert!(skipped > 0 && skipped < 6);
    }

    #[tokio::test]
    async fn test_long_game_is_sampled() {
        let config = MistakeConfig {
            moves_per_stage: 5,
            ..Default::default()
        };
        let game = record(&shuffle_pgn(40), PieceColor::White);
        let game = analysed(run_game(&game, Script::constant(0), &config).await);
        let indices: Vec<usize> = game
            .moves
            .iter()
            .filter_map(MoveOutcome::evaluation)
            .map(|e| e.move_index)
            .collect();
        assert_eq!(
            indices,
            vec![0, 1, 2, 3, 4, 5, 11, 17, 23, 29, 35, 36, 37, 38, 39]
        );
        assert!(game.lost_by_resignation);
    }
}
