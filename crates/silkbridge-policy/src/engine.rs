//! [`LinearPpoEngine`] and the provider that builds it.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use silkbridge_core::error::EngineError;
use silkbridge_core::hyperparams::Hyperparameters;
use silkbridge_core::task::TaskContext;
use silkbridge_core::traits::{EngineProvider, PolicyEngine};
use silkbridge_core::types::{Observation, Transition};
use tracing::{debug, info};

use crate::checkpoint::{Checkpoint, FORMAT_VERSION};
use crate::features::{extract, feature_dim};
use crate::learner::Learner;
use crate::model::LinearPolicy;
use crate::rollout::RolloutStep;

// ---------------------------------------------------------------------------
// LinearPpoEngine
// ---------------------------------------------------------------------------

/// Linear actor-critic trained online by a background PPO learner.
///
/// Inference reads the shared parameters under a read lock; the learner
/// swaps in new parameters after each completed rollout.
#[derive(Debug)]
pub struct LinearPpoEngine {
    policy: Arc<RwLock<LinearPolicy>>,
    updates: Arc<AtomicU64>,
    hyperparameters: Hyperparameters,
    task_id: String,
    rng: ChaCha8Rng,
    learner: Learner,
}

impl LinearPpoEngine {
    /// Fresh engine with zero parameters (uniform policy).
    pub fn new(
        ctx: &TaskContext,
        hyperparameters: Hyperparameters,
        seed: Option<u64>,
    ) -> Result<Self, EngineError> {
        let dim = feature_dim(hyperparameters.policy_input, ctx);
        let policy = LinearPolicy::zeros(dim, ctx.action_shape().to_vec())?;
        Self::with_policy(ctx, policy, hyperparameters, 0, seed)
    }

    /// Engine restored from a checkpoint already checked against `ctx`.
    pub fn from_checkpoint(
        ctx: &TaskContext,
        checkpoint: Checkpoint,
        seed: Option<u64>,
    ) -> Result<Self, EngineError> {
        Self::with_policy(
            ctx,
            checkpoint.policy,
            checkpoint.hyperparameters,
            checkpoint.updates,
            seed,
        )
    }

    fn with_policy(
        ctx: &TaskContext,
        policy: LinearPolicy,
        hyperparameters: Hyperparameters,
        updates: u64,
        seed: Option<u64>,
    ) -> Result<Self, EngineError> {
        let policy = Arc::new(RwLock::new(policy));
        let updates = Arc::new(AtomicU64::new(updates));
        let learner = Learner::spawn(
            Arc::clone(&policy),
            Arc::clone(&updates),
            hyperparameters.clone(),
            seed.map(|s| s.wrapping_add(1)),
            ctx.normalized_id(),
        )?;
        let rng = seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        Ok(Self {
            policy,
            updates,
            hyperparameters,
            task_id: ctx.task_id().to_string(),
            rng,
            learner,
        })
    }

    /// Completed PPO updates, including those before the last reload.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }

    pub const fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Copy of the current parameters.
    pub fn snapshot(&self) -> LinearPolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn features(&self, obs: &Observation) -> Vec<f32> {
        extract(self.hyperparameters.policy_input, obs)
    }
}

impl PolicyEngine for LinearPpoEngine {
    fn predict(&mut self, obs: &Observation, deterministic: bool) -> Result<Vec<u32>, EngineError> {
        let features = self.features(obs);
        let policy = self.policy.read().unwrap_or_else(PoisonError::into_inner);
        Ok(policy.act(&features, deterministic, &mut self.rng))
    }

    fn store_transition(&mut self, transition: Transition) -> Result<(), EngineError> {
        let features = self.features(&transition.state);
        let next_features = self.features(&transition.next_state);
        let (log_prob, value, next_value) = {
            let policy = self.policy.read().unwrap_or_else(PoisonError::into_inner);
            (
                policy.log_prob(&features, &transition.action),
                policy.value(&features),
                policy.value(&next_features),
            )
        };
        self.learner.send(RolloutStep {
            features,
            action: transition.action,
            reward: transition.reward,
            done: transition.done,
            log_prob,
            value,
            next_value,
        })
    }

    fn persist(&mut self, path: &Path) -> Result<(), EngineError> {
        let checkpoint = Checkpoint {
            format_version: FORMAT_VERSION,
            task_id: self.task_id.clone(),
            policy_input: self.hyperparameters.policy_input,
            hyperparameters: self.hyperparameters.clone(),
            policy: self.snapshot(),
            updates: self.updates(),
        };
        checkpoint.save(path)?;
        debug!(path = %path.display(), updates = checkpoint.updates, "checkpoint written");
        Ok(())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "LinearPpoEngine"
    }
}

// ---------------------------------------------------------------------------
// LinearPpoProvider
// ---------------------------------------------------------------------------

/// Builds [`LinearPpoEngine`]s. A fixed `seed` makes sampling reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearPpoProvider {
    seed: Option<u64>,
}

impl LinearPpoProvider {
    pub const fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    pub const fn seed(&self) -> Option<u64> {
        self.seed
    }
}

impl EngineProvider for LinearPpoProvider {
    fn load(&self, ctx: &TaskContext, path: &Path) -> Result<Box<dyn PolicyEngine>, EngineError> {
        let checkpoint = Checkpoint::load(path)?;
        checkpoint.check_compatible(ctx, path)?;
        info!(
            path = %path.display(),
            saved_as = %checkpoint.task_id,
            updates = checkpoint.updates,
            "checkpoint restored"
        );
        Ok(Box::new(LinearPpoEngine::from_checkpoint(
            ctx, checkpoint, self.seed,
        )?))
    }

    fn create(
        &self,
        ctx: &TaskContext,
        hyperparameters: &Hyperparameters,
    ) -> Result<Box<dyn PolicyEngine>, EngineError> {
        Ok(Box::new(LinearPpoEngine::new(
            ctx,
            hyperparameters.clone(),
            self.seed,
        )?))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "LinearPpoProvider"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
