//! Configuration for the mistake-analysis pipeline.
//!
//! Every tunable has a compile-time default and can be overridden through a
//! dedicated environment variable. Values are parsed and validated once at
//! startup; the resulting [`MistakeConfig`] is immutable and shared via `Arc`.

use std::path::PathBuf;
use std::time::Duration;

use engine::{EngineConfig, SearchBudget};

/// Default search nodes per evaluated position.
pub const DEFAULT_ENGINE_NODES: u64 = 100_000;

/// Default legacy search limits, used when the search mode is `time`.
pub const DEFAULT_MOVETIME_MS: u64 = 500;
pub const DEFAULT_DEPTH: u8 = 10;

/// Default cap on games analysed per request.
pub const DEFAULT_MAX_ANALYSIS_GAMES: usize = 10;

/// Default sampled moves per game stage.
pub const DEFAULT_MOVES_PER_STAGE: usize = 10;

/// Default task time-to-live.
pub const DEFAULT_TASK_TTL: Duration = Duration::from_secs(3600);

/// Default number of engine processes running at once.
pub const DEFAULT_MAX_CONCURRENT_ENGINES: usize = 1;

/// Default per-position evaluation timeout.
pub const DEFAULT_POSITION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default evaluation beyond which a position counts as decided.
pub const DEFAULT_DECIDED_POSITION_CP: i32 = 600;

/// Seconds per game used for progress estimates.
pub const DEFAULT_SECONDS_PER_GAME: f64 = 2.5;

pub const ENV_ENGINE_NODES: &str = "CHESSDASH_ENGINE_NODES";
pub const ENV_SEARCH_MODE: &str = "CHESSDASH_SEARCH_MODE";
pub const ENV_MOVETIME_MS: &str = "CHESSDASH_MOVETIME_MS";
pub const ENV_DEPTH: &str = "CHESSDASH_DEPTH";
pub const ENV_MAX_GAMES: &str = "CHESSDASH_MAX_GAMES";
pub const ENV_MOVES_PER_STAGE: &str = "CHESSDASH_MOVES_PER_STAGE";
pub const ENV_TASK_TTL_SECS: &str = "CHESSDASH_TASK_TTL_SECS";
pub const ENV_MAX_ENGINES: &str = "CHESSDASH_MAX_ENGINES";
pub const ENV_POSITION_TIMEOUT_MS: &str = "CHESSDASH_POSITION_TIMEOUT_MS";
pub const ENV_DECIDED_CP: &str = "CHESSDASH_DECIDED_CP";
pub const ENV_STOCKFISH: &str = "CHESSDASH_STOCKFISH";
pub const ENV_CLOUD_EVAL: &str = "CHESSDASH_CLOUD_EVAL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchMode {
    /// Fixed node budget per position.
    Nodes,
    /// Legacy movetime + depth limit.
    Time,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nodes" => Ok(Self::Nodes),
            "time" | "depth" => Ok(Self::Time),
            other => Err(format!("expected `nodes` or `time`, got `{}`", other)),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse `{value}`: {reason}")]
    Parse {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{field} must be {constraint}")]
    OutOfRange {
        field: &'static str,
        constraint: &'static str,
    },
}

/// Validated, immutable pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MistakeConfig {
    pub engine_nodes: u64,
    pub search_mode: SearchMode,
    pub legacy_movetime_ms: u64,
    pub legacy_depth: u8,
    pub max_analysis_games: usize,
    pub moves_per_stage: usize,
    pub task_ttl: Duration,
    pub max_concurrent_engines: usize,
    pub position_timeout: Duration,
    /// `None` disables the decided-position skip.
    pub decided_position_cp: Option<i32>,
    pub seconds_per_game_estimate: f64,
    pub engine_path: Option<PathBuf>,
    pub cloud_eval: bool,
}

impl Default for MistakeConfig {
    fn default() -> Self {
        Self {
            engine_nodes: DEFAULT_ENGINE_NODES,
            search_mode: SearchMode::Nodes,
            legacy_movetime_ms: DEFAULT_MOVETIME_MS,
            legacy_depth: DEFAULT_DEPTH,
            max_analysis_games: DEFAULT_MAX_ANALYSIS_GAMES,
            moves_per_stage: DEFAULT_MOVES_PER_STAGE,
            task_ttl: DEFAULT_TASK_TTL,
            max_concurrent_engines: DEFAULT_MAX_CONCURRENT_ENGINES,
            position_timeout: DEFAULT_POSITION_TIMEOUT,
            decided_position_cp: Some(DEFAULT_DECIDED_POSITION_CP),
            seconds_per_game_estimate: DEFAULT_SECONDS_PER_GAME,
            engine_path: None,
            cloud_eval: false,
        }
    }
}

impl MistakeConfig {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup. Unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |var: &'static str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (var, v))
        };

        if let Some((var, v)) = get(ENV_ENGINE_NODES) {
            config.engine_nodes = parse(var, &v)?;
        }
        if let Some((var, v)) = get(ENV_SEARCH_MODE) {
            config.search_mode = parse(var, &v)?;
        }
        if let Some((var, v)) = get(ENV_MOVETIME_MS) {
            config.legacy_movetime_ms = parse(var, &v)?;
        }
        if let Some((var, v)) = get(ENV_DEPTH) {
            config.legacy_depth = parse(var, &v)?;
        }
        if let Some((var, v)) = get(ENV_MAX_GAMES) {
            config.max_analysis_games = parse(var, &v)?;
        }
        if let Some((var, v)) = get(ENV_MOVES_PER_STAGE) {
            config.moves_per_stage = parse(var, &v)?;
        }
        if let Some((var, v)) = get(ENV_TASK_TTL_SECS) {
            config.task_ttl = Duration::from_secs(parse(var, &v)?);
        }
        if let Some((var, v)) = get(ENV_MAX_ENGINES) {
            config.max_concurrent_engines = parse(var, &v)?;
        }
        if let Some((var, v)) = get(ENV_POSITION_TIMEOUT_MS) {
            config.position_timeout = Duration::from_millis(parse(var, &v)?);
        }
        if let Some((var, v)) = get(ENV_DECIDED_CP) {
            config.decided_position_cp = match v.to_ascii_lowercase().as_str() {
                "off" | "none" => None,
                _ => Some(parse(var, &v)?),
            };
        }
        if let Some((_, v)) = get(ENV_STOCKFISH) {
            config.engine_path = Some(PathBuf::from(v));
        }
        if let Some((var, v)) = get(ENV_CLOUD_EVAL) {
            config.cloud_eval = parse_flag(var, &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every range constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(bool, &'static str, &'static str); 10] = [
            (self.engine_nodes > 0, "engine_nodes", "greater than 0"),
            (self.legacy_movetime_ms > 0, "legacy_movetime_ms", "greater than 0"),
            (self.legacy_depth > 0, "legacy_depth", "greater than 0"),
            (self.max_analysis_games >= 1, "max_analysis_games", "at least 1"),
            (self.moves_per_stage >= 1, "moves_per_stage", "at least 1"),
            (!self.task_ttl.is_zero(), "task_ttl", "greater than 0"),
            (self.max_concurrent_engines >= 1, "max_concurrent_engines", "at least 1"),
            (!self.position_timeout.is_zero(), "position_timeout", "greater than 0"),
            (
                self.decided_position_cp.map_or(true, |cp| cp > 0),
                "decided_position_cp",
                "greater than 0 or off",
            ),
            (
                self.seconds_per_game_estimate.is_finite() && self.seconds_per_game_estimate > 0.0,
                "seconds_per_game_estimate",
                "a positive number",
            ),
        ];
        match checks.into_iter().find(|(ok, _, _)| !ok) {
            Some((_, field, constraint)) => Err(ConfigError::OutOfRange { field, constraint }),
            None => Ok(()),
        }
    }

    pub fn moves_per_game(&self) -> usize {
        3 * self.moves_per_stage
    }

    pub fn search_budget(&self) -> SearchBudget {
        match self.search_mode {
            SearchMode::Nodes => SearchBudget::Nodes(self.engine_nodes),
            SearchMode::Time => SearchBudget::TimeDepth {
                movetime_ms: self.legacy_movetime_ms,
                depth: self.legacy_depth,
            },
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            path: self.engine_path.clone(),
            // One search thread per process keeps per-position cost predictable.
            threads: Some(1),
            hash_mb: Some(64),
        }
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Parse {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Parse {
            var,
            value: value.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<MistakeConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MistakeConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, MistakeConfig::default());
        assert_eq!(config.engine_nodes, 100_000);
        assert_eq!(config.moves_per_game(), 30);
        assert_eq!(config.task_ttl, Duration::from_secs(3600));
        assert_eq!(config.search_budget(), SearchBudget::Nodes(100_000));
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            (ENV_ENGINE_NODES, "50000"),
            (ENV_SEARCH_MODE, "time"),
            (ENV_MOVETIME_MS, "250"),
            (ENV_MAX_GAMES, "5"),
            (ENV_DECIDED_CP, "off"),
            (ENV_STOCKFISH, "/opt/sf/stockfish"),
            (ENV_CLOUD_EVAL, "true"),
            (ENV_TASK_TTL_SECS, "60"),
        ])
        .unwrap();
        assert_eq!(config.engine_nodes, 50_000);
        assert_eq!(
            config.search_budget(),
            SearchBudget::TimeDepth {
                movetime_ms: 250,
                depth: DEFAULT_DEPTH
            }
        );
        assert_eq!(config.max_analysis_games, 5);
        assert_eq!(config.decided_position_cp, None);
        assert_eq!(config.engine_path, Some(PathBuf::from("/opt/sf/stockfish")));
        assert!(config.cloud_eval);
        assert_eq!(config.task_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_blank_value_keeps_default() {
        let config = from_pairs(&[(ENV_ENGINE_NODES, "  ")]).unwrap();
        assert_eq!(config.engine_nodes, DEFAULT_ENGINE_NODES);
    }

    #[test]
    fn test_unparseable_value_is_an_error() {
        let err = from_pairs(&[(ENV_ENGINE_NODES, "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { var: ENV_ENGINE_NODES, .. }));

        let err = from_pairs(&[(ENV_SEARCH_MODE, "fast")]).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { var: ENV_SEARCH_MODE, .. }));

        let err = from_pairs(&[(ENV_CLOUD_EVAL, "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { var: ENV_CLOUD_EVAL, .. }));
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let err = from_pairs(&[(ENV_MOVES_PER_STAGE, "0")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::OutOfRange {
                field: "moves_per_stage",
                constraint: "at least 1"
            }
        );
        assert!(from_pairs(&[(ENV_ENGINE_NODES, "0")]).is_err());
        assert!(from_pairs(&[(ENV_DECIDED_CP, "-5")]).is_err());
        assert!(from_pairs(&[(ENV_TASK_TTL_SECS, "0")]).is_err());
    }
}
