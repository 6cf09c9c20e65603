use analysis::AggregatedResult;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Opaque task identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

impl Progress {
    /// Whole-number percentage, 0 when there is nothing to do.
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            (self.current * 100 / self.total) as u32
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Processing,
    Completed(AggregatedResult),
    Error(String),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// One analysis request, owned by the supervisor.
#[derive(Debug, Clone)]
pub struct AnalysisTask {
    pub id: TaskId,
    pub state: TaskState,
    pub progress: Progress,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl AnalysisTask {
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    pub current: usize,
    pub total: usize,
    pub percentage: u32,
    pub estimated_remaining_seconds: f64,
}

/// Polling response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatusView {
    Processing { progress: ProgressView },
    Completed { data: AggregatedResult },
    Error { error: String },
    NotFound,
}

impl TaskStatusView {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing { .. })
    }
}

/// Task creation response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskCreated {
    pub task_id: TaskId,
    pub estimated_time_seconds: f64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub processing: usize,
    pub finished: usize,
}
