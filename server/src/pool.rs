//! Bounded pool of position evaluators.
//!
//! Each background worker holds one permit, and therefore one engine process,
//! for its whole run. Workers beyond the limit wait for a permit.

use std::sync::Arc;

use engine::{EvalError, EvaluatorFactory, PositionEvaluator};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Clone)]
pub struct EnginePool {
    permits: Arc<Semaphore>,
    factory: Arc<dyn EvaluatorFactory>,
}

/// An evaluator checked out of the pool. The permit is returned on drop.
pub struct PooledEvaluator {
    evaluator: Box<dyn PositionEvaluator>,
    _permit: OwnedSemaphorePermit,
}

impl EnginePool {
    pub fn new(factory: Arc<dyn EvaluatorFactory>, max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            factory,
        }
    }

    /// Wait for a free slot, then create an evaluator in it.
    pub async fn acquire(&self) -> Result<PooledEvaluator, EvalError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EvalError::Unavailable("engine pool closed".into()))?;
        let evaluator = self.factory.create().await?;
        tracing::debug!(evaluator = evaluator.name(), "Evaluator checked out");
        Ok(PooledEvaluator {
            evaluator,
            _permit: permit,
        })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl PooledEvaluator {
    pub fn evaluator(&mut self) -> &mut dyn PositionEvaluator {
        self.evaluator.as_mut()
    }

    /// Shut the evaluator down and free the slot.
    pub async fn release(mut self) {
        self.evaluator.shutdown().await;
    }
}
