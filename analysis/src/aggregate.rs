//! Per-stage accumulation of move quality across a batch, and selection of the
//! single most instructive resignation mistake.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::classify::{MoveEvaluation, MoveQuality};
use crate::outcome::{GameAnalysis, GameOutcome, MoveOutcome};
use crate::sampler::Stage;

/// Minimum drop for a critical mistake, whatever the batch distribution.
pub const CRITICAL_MISTAKE_FLOOR_CP: i32 = 300;
pub const NO_QUALIFYING_GAME: &str = "no qualifying game";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorstMistake {
    pub game_url: String,
    pub cp_loss: i32,
    pub move_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageStatistics {
    pub stage_name: &'static str,
    pub total_moves: usize,
    pub brilliant_moves: usize,
    pub neutral_moves: usize,
    pub mistake_moves: usize,
    pub avg_brilliant_per_game: f64,
    pub avg_neutral_per_game: f64,
    pub avg_mistakes_per_game: f64,
    /// Mean evaluation drop of this stage's mistakes.
    pub avg_cp_loss: f64,
    pub worst_mistake: Option<WorstMistake>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriticalMistake {
    pub url: String,
    pub cp_loss: i32,
    pub move_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriticalMistakeGame {
    Found(CriticalMistake),
    NoQualifyingGame,
}

impl Serialize for CriticalMistakeGame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Found(mistake) => mistake.serialize(serializer),
            Self::NoQualifyingGame => serializer.serialize_str(NO_QUALIFYING_GAME),
        }
    }
}

/// Final mistake-analysis document for one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
    #[serde(flatten)]
    pub stages: BTreeMap<Stage, StageStatistics>,
    pub weakest_stage: Option<Stage>,
    pub total_games_in_batch: usize,
    pub games_analyzed: usize,
    pub games_skipped: usize,
    pub moves_evaluated: usize,
    pub moves_skipped: usize,
    pub sample_percentage: f64,
    pub critical_mistake_game: CriticalMistakeGame,
}

impl AggregatedResult {
    /// Zero result for a batch in which nothing was analysed.
    pub fn empty(total_games_in_batch: usize) -> Self {
        StageAggregator::new(total_games_in_batch).finish()
    }
}

#[derive(Debug, Clone, Default)]
struct StageTally {
    total: usize,
    brilliant: usize,
    neutral: usize,
    mistake: usize,
    mistake_cp_loss: i64,
    worst: Option<WorstMistake>,
}

impl StageTally {
    fn add(&mut self, url: &str, eval: &MoveEvaluation) {
        self.total += 1;
        match eval.quality {
            MoveQuality::Brilliant => self.brilliant += 1,
            MoveQuality::Neutral => self.neutral += 1,
            MoveQuality::Mistake => {
                self.mistake += 1;
                let cp_loss = eval.cp_loss();
                self.mistake_cp_loss += i64::from(cp_loss);
                if self.worst.as_ref().map_or(true, |w| cp_loss > w.cp_loss) {
                    self.worst = Some(WorstMistake {
                        game_url: url.to_string(),
                        cp_loss,
                        move_number: eval.move_number,
                    });
                }
            }
        }
    }

    fn statistics(&self, stage: Stage, games: usize) -> StageStatistics {
        let per_game = |count: usize| {
            if games == 0 {
                0.0
            } else {
                round1(count as f64 / games as f64)
            }
        };
        let avg_cp_loss = if self.mistake == 0 {
            0.0
        } else {
            round1(self.mistake_cp_loss as f64 / self.mistake as f64)
        };
        StageStatistics {
            stage_name: stage.display_name(),
            total_moves: self.total,
            brilliant_moves: self.brilliant,
            neutral_moves: self.neutral,
            mistake_moves: self.mistake,
            avg_brilliant_per_game: per_game(self.brilliant),
            avg_neutral_per_game: per_game(self.neutral),
            avg_mistakes_per_game: per_game(self.mistake),
            avg_cp_loss,
            worst_mistake: self.worst.clone(),
        }
    }
}

/// Accumulates game outcomes in batch order.
#[derive(Debug, Clone)]
pub struct StageAggregator {
    total_games_in_batch: usize,
    tallies: [StageTally; 3],
    games_analyzed: usize,
    games_skipped: usize,
    moves_evaluated: usize,
    moves_skipped: usize,
    resignation_drops: Vec<CriticalMistake>,
}

impl StageAggregator {
    pub fn new(total_games_in_batch: usize) -> Self {
        Self {
            total_games_in_batch,
            tallies: Default::default(),
            games_analyzed: 0,
            games_skipped: 0,
            moves_evaluated: 0,
            moves_skipped: 0,
            resignation_drops: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: GameOutcome) {
        match outcome {
            GameOutcome::Analyzed(game) => self.record_game(game),
            GameOutcome::Skipped { .. } => self.games_skipped += 1,
        }
    }

    fn record_game(&mut self, game: GameAnalysis) {
        self.games_analyzed += 1;
        for outcome in &game.moves {
            match outcome {
                MoveOutcome::Evaluated(eval) => {
                    self.moves_evaluated += 1;
                    self.tallies[eval.stage.index()].add(&game.url, eval);
                }
                MoveOutcome::Skipped { .. } => self.moves_skipped += 1,
            }
        }
        if game.lost_by_resignation {
            if let Some(drop) = game.largest_drop() {
                self.resignation_drops.push(CriticalMistake {
                    url: game.url.clone(),
                    cp_loss: drop.cp_loss(),
                    move_number: drop.move_number,
                });
            }
        }
    }

    pub fn games_analyzed(&self) -> usize {
        self.games_analyzed
    }

    pub fn finish(self) -> AggregatedResult {
        let stages: BTreeMap<Stage, StageStatistics> = Stage::ALL
            .into_iter()
            .map(|stage| {
                let stats = self.tallies[stage.index()].statistics(stage, self.games_analyzed);
                (stage, stats)
            })
            .collect();

        let selected = self.games_analyzed + self.games_skipped;
        let sample_percentage = if self.total_games_in_batch == 0 {
            0.0
        } else {
            round1(selected as f64 / self.total_games_in_batch as f64 * 100.0)
        };

        AggregatedResult {
            weakest_stage: weakest_stage(&self.tallies),
            total_games_in_batch: self.total_games_in_batch,
            games_analyzed: self.games_analyzed,
            games_skipped: self.games_skipped,
            moves_evaluated: self.moves_evaluated,
            moves_skipped: self.moves_skipped,
            sample_percentage,
            critical_mistake_game: critical_mistake(self.resignation_drops),
            stages,
        }
    }
}

/// Stage with the highest mistake rate; ties go to the higher mistake count, then
/// the earlier stage. `None` when no stage has a mistake.
fn weakest_stage(tallies: &[StageTally; 3]) -> Option<Stage> {
    let mut weakest: Option<(Stage, &StageTally)> = None;
    for stage in Stage::ALL {
        let tally = &tallies[stage.index()];
        if tally.mistake == 0 {
            continue;
        }
        let replace = match weakest {
            None => true,
            Some((_, best)) => {
                // Compare mistake / total by cross-multiplication.
                let lhs = tally.mistake * best.total;
                let rhs = best.mistake * tally.total;
                lhs > rhs || (lhs == rhs && tally.mistake > best.mistake)
            }
        };
        if replace {
            weakest = Some((stage, tally));
        }
    }
    weakest.map(|(stage, _)| stage)
}

/// Largest drop among resignation losses that reaches `max(floor, p75)`.
fn critical_mistake(drops: Vec<CriticalMistake>) -> CriticalMistakeGame {
    let mut losses: Vec<i32> = drops.iter().map(|d| d.cp_loss).collect();
    losses.sort_unstable();
    let Some(p75) = percentile(&losses, 0.75) else {
        return CriticalMistakeGame::NoQualifyingGame;
    };
    let threshold = p75.max(f64::from(CRITICAL_MISTAKE_FLOOR_CP));

    drops
        .into_iter()
        .filter(|d| f64::from(d.cp_loss) >= threshold)
        .reduce(|best, d| if d.cp_loss > best.cp_loss { d } else { best })
        .map_or(CriticalMistakeGame::NoQualifyingGame, CriticalMistakeGame::Found)
}

/// Linear interpolation between closest ranks over ascending `sorted`.
fn percentile(sorted: &[i32], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = q * last as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let (a, b) = (f64::from(sorted[lo]), f64::from(sorted[hi]));
    Some(a + (b - a) * (rank - lo as f64))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{GameSkipReason, SkipReason};

    fn eval(index: usize, stage: Stage, before: i32, after: i32) -> MoveOutcome {
        MoveOutcome::Evaluated(MoveEvaluation::new(
            index,
            index as u32 + 1,
            stage,
            before,
            after,
        ))
    }

    fn game(url: &str, resigned: bool, moves: Vec<MoveOutcome>) -> GameOutcome {
        GameOutcome::Analyzed(GameAnalysis {
            url: url.into(),
            lost_by_resignation: resigned,
            moves,
        })
    }

    fn mistakes(count: usize, stage: Stage) -> Vec<MoveOutcome> {
        (0..count).map(|i| eval(i, stage, 0, -100)).collect()
    }

    #[test]
    fn test_avg_mistakes_rounded_to_one_decimal() {
        let mut agg = StageAggregator::new(3);
        agg.record(game("a", false, mistakes(3, Stage::Middle)));
        agg.record(game("b", false, mistakes(2, Stage::Middle)));
        agg.record(game("c", false, mistakes(2, Stage::Middle)));
        let result = agg.finish();

        let middle = &result.stages[&Stage::Middle];
        assert_eq!(middle.mistake_moves, 7);
        assert_eq!(result.games_analyzed, 3);
        assert_eq!(middle.avg_mistakes_per_game, 2.3);
        assert_eq!(middle.avg_cp_loss, 100.0);
        assert_eq!(result.sample_percentage, 100.0);
    }

    #[test]
    fn test_counts_and_worst_mistake_per_stage() {
        let mut agg = StageAggregator::new(1);
        agg.record(game(
            "g1",
            false,
            vec![
                eval(0, Stage::Early, 0, 150),
                eval(1, Stage::Early, 0, 10),
                eval(2, Stage::Early, 50, -30),
                eval(3, Stage::Early, 0, -400),
                MoveOutcome::Skipped {
                    move_index: 4,
                    stage: Stage::Late,
                    reason: SkipReason::EngineUnavailable,
                },
            ],
        ));
        let result = agg.finish();
        let early = &result.stages[&Stage::Early];
        assert_eq!(
            (early.total_moves, early.brilliant_moves, early.neutral_moves, early.mistake_moves),
            (4, 1, 1, 2)
        );
        assert_eq!(early.avg_cp_loss, 240.0);
        assert_eq!(
            early.worst_mistake,
            Some(WorstMistake {
                game_url: "g1".into(),
                cp_loss: 400,
                move_number: 4
            })
        );
        assert_eq!(result.moves_evaluated, 4);
        assert_eq!(result.moves_skipped, 1);
        assert_eq!(result.weakest_stage, Some(Stage::Early));
    }

    #[test]
    fn test_weakest_stage_rate_then_count() {
        let mut agg = StageAggregator::new(1);
        let mut moves = mistakes(1, Stage::Early);
        moves.push(eval(1, Stage::Early, 0, 0));
        moves.extend(mistakes(2, Stage::Middle));
        moves.extend((0..2).map(|i| eval(i, Stage::Middle, 0, 0)));
        moves.extend(mistakes(1, Stage::Late));
        moves.extend((0..3).map(|i| eval(i, Stage::Late, 0, 0)));
        agg.record(game("g", false, moves));
        // early 1/2, middle 2/4, late 1/4: middle wins the tie on count.
        assert_eq!(agg.finish().weakest_stage, Some(Stage::Middle));
    }

    #[test]
    fn test_weakest_stage_none_without_mistakes() {
        let mut agg = StageAggregator::new(1);
        agg.record(game("g", false, vec![eval(0, Stage::Early, 0, 0)]));
        assert_eq!(agg.finish().weakest_stage, None);
    }

    #[test]
    fn test_critical_mistake_uses_p75_threshold() {
        let mut agg = StageAggregator::new(3);
        agg.record(game("g280", true, vec![eval(0, Stage::Early, 0, -280)]));
        agg.record(game("g310", true, vec![eval(4, Stage::Middle, 10, -300)]));
        agg.record(game("g450", true, vec![eval(7, Stage::Late, 50, -400)]));
        let result = agg.finish();
        assert_eq!(
            result.critical_mistake_game,
            CriticalMistakeGame::Found(CriticalMistake {
                url: "g450".into(),
                cp_loss: 450,
                move_number: 8
            })
        );
    }

    #[test]
    fn test_critical_mistake_ignores_non_resignation_games() {
        let mut agg = StageAggregator::new(2);
        agg.record(game("timeout", false, vec![eval(0, Stage::Early, 0, -900)]));
        agg.record(game("small", true, vec![eval(0, Stage::Early, 0, -120)]));
        let result = agg.finish();
        assert_eq!(result.critical_mistake_game, CriticalMistakeGame::NoQualifyingGame);
    }

    #[test]
    fn test_percentile_interpolates() {
        assert_eq!(percentile(&[], 0.75), None);
        assert_eq!(percentile(&[280], 0.75), Some(280.0));
        assert_eq!(percentile(&[280, 310, 450], 0.75), Some(380.0));
        assert_eq!(percentile(&[100, 200, 300, 400, 500], 0.75), Some(400.0));
    }

    #[test]
    fn test_skipped_games_and_sample_percentage() {
        let mut agg = StageAggregator::new(60);
        for i in 0..9 {
            agg.record(game(&format!("g{}", i), false, vec![eval(0, Stage::Early, 0, 0)]));
        }
        agg.record(GameOutcome::Skipped {
            url: "bad".into(),
            reason: GameSkipReason::MalformedPgn("unterminated comment".into()),
        });
        let result = agg.finish();
        assert_eq!(result.games_analyzed, 9);
        assert_eq!(result.games_skipped, 1);
        assert_eq!(result.sample_percentage, 16.7);
    }

    #[test]
    fn test_empty_result_serialization() {
        let json = serde_json::to_value(AggregatedResult::empty(0)).unwrap();
        assert_eq!(json["critical_mistake_game"], NO_QUALIFYING_GAME);
        assert_eq!(json["weakest_stage"], serde_json::Value::Null);
        assert_eq!(json["games_analyzed"], 0);
        assert_eq!(json["sample_percentage"], 0.0);
        for stage in ["early", "middle", "late"] {
            assert_eq!(json[stage]["total_moves"], 0, "{}", stage);
            assert_eq!(json[stage]["avg_mistakes_per_game"], 0.0, "{}", stage);
        }
        assert_eq!(json["late"]["stage_name"], "Endgame");
    }

    #[test]
    fn test_found_critical_mistake_serializes_as_object() {
        let found = CriticalMistakeGame::Found(CriticalMistake {
            url: "https://lichess.org/abc".into(),
            cp_loss: 512,
            move_number: 23,
        });
        let json = serde_json::to_value(&found).unwrap();
        assert_eq!(json["url"], "https://lichess.org/abc");
        assert_eq!(json["cp_loss"], 512);
        assert_eq!(json["move_number"], 23);
    }
}
