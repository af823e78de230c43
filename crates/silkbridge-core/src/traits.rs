use std::path::Path;

use crate::error::EngineError;
use crate::hyperparams::Hyperparameters;
use crate::task::TaskContext;
use crate::types::{Observation, Transition};

// ---------------------------------------------------------------------------
// PolicyEngine
// ---------------------------------------------------------------------------

/// A learning policy bound to one task's dimensions.
///
/// Calls are made from the protocol thread and must return after bounded
/// local work; learning itself may happen in the background.
pub trait PolicyEngine: Send {
    /// Choose one value per action dimension, each in `[0, action_shape[i])`.
    ///
    /// With `deterministic == false` repeated calls on the same observation
    /// may return different actions.
    fn predict(&mut self, obs: &Observation, deterministic: bool) -> Result<Vec<u32>, EngineError>;

    /// Hand a transition to the learner. Fire-and-forget.
    fn store_transition(&mut self, transition: Transition) -> Result<(), EngineError>;

    /// Write the engine's state to `path`, creating parent directories.
    fn persist(&mut self, path: &Path) -> Result<(), EngineError>;

    /// Human-readable name for this engine.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// EngineProvider
// ---------------------------------------------------------------------------

/// Builds engines for a task, either fresh or from a checkpoint.
pub trait EngineProvider: Send {
    /// Whether a checkpoint exists at `path`.
    fn checkpoint_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Load a persisted engine and bind it to `ctx`'s dimensions.
    fn load(&self, ctx: &TaskContext, path: &Path) -> Result<Box<dyn PolicyEngine>, EngineError>;

    /// Construct a fresh engine.
    fn create(
        &self,
        ctx: &TaskContext,
        hyperparameters: &Hyperparameters,
    ) -> Result<Box<dyn PolicyEngine>, EngineError>;

    /// Human-readable name for this provider.
    fn name(&self) -> &str;
}
