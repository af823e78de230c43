//! Bundled policy engine for silkbridge.
//!
//! Implements the [`EngineProvider`](silkbridge_core::traits::EngineProvider)
//! and [`PolicyEngine`](silkbridge_core::traits::PolicyEngine) contracts with a
//! multi-discrete linear actor-critic trained by clipped PPO:
//!
//! - [`features`] — observation → feature vector per [`PolicyInput`](silkbridge_core::hyperparams::PolicyInput)
//! - [`model`] — [`LinearPolicy`] parameters, softmax heads, sampling
//! - [`rollout`] — collected steps and GAE(λ) advantages
//! - [`ppo`] — clipped-surrogate update with Adam
//! - [`learner`] — background thread consuming transitions
//! - [`checkpoint`] — JSON checkpoint format
//! - [`engine`] — [`LinearPpoEngine`] and [`LinearPpoProvider`]

pub mod checkpoint;
pub mod engine;
pub mod features;
pub mod learner;
pub mod model;
pub mod ppo;
pub mod rollout;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use checkpoint::Checkpoint;
pub use engine::{LinearPpoEngine, LinearPpoProvider};
pub use model::LinearPolicy;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Checkpoint, LinearPolicy, LinearPpoEngine, LinearPpoProvider,
        ppo::{Adam, UpdateStats, ppo_update},
        rollout::{Rollout, RolloutStep},
    };
}
