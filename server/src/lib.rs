//! Batch mistake analysis: accepts a batch of games, analyses a sample of them
//! in the background and serves progress and results by task id.

pub mod analyzer;
pub mod config;
pub mod pool;
pub mod tasks;
mod worker;

#[cfg(test)]
mod testing;

pub use analyzer::{MistakeAnalyzer, Submission, WorkerHandle};
pub use config::{ConfigError, MistakeConfig, SearchMode};
pub use tasks::{TaskCounts, TaskCreated, TaskId, TaskStatusView, TaskSupervisor};
