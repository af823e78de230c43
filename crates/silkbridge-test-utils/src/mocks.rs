//! Mock implementations of the engine traits for testing.
//!
//! [`RecordingProvider`] builds [`RandomEngine`]s that pick uniformly
//! random actions and record every call into a shared [`EngineLog`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use silkbridge_core::error::EngineError;
use silkbridge_core::hyperparams::Hyperparameters;
use silkbridge_core::task::TaskContext;
use silkbridge_core::traits::{EngineProvider, PolicyEngine};
use silkbridge_core::types::{Observation, Transition};

use crate::rng::seeded_rng;

// ---------------------------------------------------------------------------
// EngineLog
// ---------------------------------------------------------------------------

/// Everything the mocks were asked to do.
#[derive(Debug, Default, Clone)]
pub struct EngineLog {
    /// Normalized ids passed to `create`.
    pub created: Vec<String>,
    /// Normalized ids passed to `load`.
    pub loaded: Vec<String>,
    /// Paths passed to `persist`.
    pub persisted: Vec<PathBuf>,
    pub predictions: usize,
    pub transitions: Vec<Transition>,
}

// ---------------------------------------------------------------------------
// RandomEngine
// ---------------------------------------------------------------------------

/// Uniformly random policy with a fixed seed.
pub struct RandomEngine {
    action_shape: Vec<u32>,
    rng: ChaCha8Rng,
    log: Arc<Mutex<EngineLog>>,
}

impl RandomEngine {
    pub fn new(action_shape: Vec<u32>, seed: u64, log: Arc<Mutex<EngineLog>>) -> Self {
        Self {
            action_shape,
            rng: seeded_rng(seed),
            log,
        }
    }

    fn log(&self) -> MutexGuard<'_, EngineLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PolicyEngine for RandomEngine {
    fn predict(&mut self, _obs: &Observation, _deterministic: bool) -> Result<Vec<u32>, EngineError> {
        let action = self
            .action_shape
            .iter()
            .map(|&n| self.rng.gen_range(0..n))
            .collect();
        self.log().predictions += 1;
        Ok(action)
    }

    fn store_transition(&mut self, transition: Transition) -> Result<(), EngineError> {
        self.log().transitions.push(transition);
        Ok(())
    }

    fn persist(&mut self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }
        fs::write(path, format!("{:?}", self.action_shape)).map_err(|e| EngineError::io(path, e))?;
        self.log().persisted.push(path.to_path_buf());
        Ok(())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "RandomEngine"
    }
}

// ---------------------------------------------------------------------------
// RecordingProvider
// ---------------------------------------------------------------------------

/// Provider of [`RandomEngine`]s sharing one [`EngineLog`].
///
/// Checkpoints are real files, so a task initialized twice against the same
/// model directory is loaded the second time.
#[derive(Clone)]
pub struct RecordingProvider {
    seed: u64,
    log: Arc<Mutex<EngineLog>>,
}

impl RecordingProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            log: Arc::new(Mutex::new(EngineLog::default())),
        }
    }

    /// Handle to the shared log.
    pub fn log(&self) -> Arc<Mutex<EngineLog>> {
        Arc::clone(&self.log)
    }

    /// Copy of the log as it is now.
    pub fn snapshot(&self) -> EngineLog {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn engine(&self, ctx: &TaskContext) -> Box<dyn PolicyEngine> {
        Box::new(RandomEngine::new(
            ctx.action_shape().to_vec(),
            self.seed,
            Arc::clone(&self.log),
        ))
    }
}

impl EngineProvider for RecordingProvider {
    fn load(&self, ctx: &TaskContext, path: &Path) -> Result<Box<dyn PolicyEngine>, EngineError> {
        fs::read(path).map_err(|e| EngineError::io(path, e))?;
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .loaded
            .push(ctx.normalized_id().to_string());
        Ok(self.engine(ctx))
    }

    fn create(
        &self,
        ctx: &TaskContext,
        _hyperparameters: &Hyperparameters,
    ) -> Result<Box<dyn PolicyEngine>, EngineError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .created
            .push(ctx.normalized_id().to_string());
        Ok(self.engine(ctx))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "RecordingProvider"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use silkbridge_core::codec::to_observation;
    use silkbridge_core::types::TaskSpec;

    #[test]
    fn random_engine_respects_shape() {
        let ctx = TaskContext::from_spec(&TaskSpec::flat("t", 2, vec![3, 1, 5])).unwrap();
        let provider = RecordingProvider::new(7);
        let mut engine = provider
            .create(&ctx, &Hyperparameters::for_layout(ctx.layout()))
            .unwrap();
        let obs = to_observation(&[0.0, 0.0], &ctx).unwrap();
        for _ in 0..100 {
            let a = engine.predict(&obs, false).unwrap();
            ctx.validate_action(&a).unwrap();
            assert_eq!(a[1], 0);
        }
        let log = provider.snapshot();
        assert_eq!(log.predictions, 100);
        assert_eq!(log.created, vec!["t".to_string()]);
    }
}
