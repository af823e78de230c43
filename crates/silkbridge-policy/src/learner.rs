//! Background learner thread.
//!
//! The protocol thread hands [`RolloutStep`]s over an mpsc channel and
//! returns immediately. The learner buffers them and, once `n_steps` have
//! arrived, runs [`ppo_update`] on a private copy of the parameters before
//! publishing the result through the shared lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use silkbridge_core::error::EngineError;
use silkbridge_core::hyperparams::Hyperparameters;
use tracing::{debug, info, warn};

use crate::model::LinearPolicy;
use crate::ppo::{Adam, ppo_update};
use crate::rollout::{Rollout, RolloutStep};

/// Messages accepted by the learner thread.
#[derive(Debug)]
pub enum LearnerMsg {
    Step(Box<RolloutStep>),
    Shutdown,
}

/// Handle to a running learner thread. Dropping it drains pending steps
/// and joins the thread.
#[derive(Debug)]
pub struct Learner {
    tx: Sender<LearnerMsg>,
    handle: Option<JoinHandle<()>>,
}

impl Learner {
    /// Start a learner updating `shared` in place.
    pub fn spawn(
        shared: Arc<RwLock<LinearPolicy>>,
        updates: Arc<AtomicU64>,
        hyperparameters: Hyperparameters,
        seed: Option<u64>,
        label: &str,
    ) -> Result<Self, EngineError> {
        let (tx, rx) = mpsc::channel();
        let task = label.to_owned();
        let handle = thread::Builder::new()
            .name(format!("learner-{label}"))
            .spawn(move || {
                let rng = seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
                run(&rx, &shared, &updates, &hyperparameters, rng, &task);
            })
            .map_err(|e| EngineError::Failed(format!("failed to spawn learner thread: {e}")))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Queue a step for the next update.
    pub fn send(&self, step: RolloutStep) -> Result<(), EngineError> {
        self.tx
            .send(LearnerMsg::Step(Box::new(step)))
            .map_err(|_| EngineError::LearnerStopped)
    }
}

impl Drop for Learner {
    fn drop(&mut self) {
        let _ = self.tx.send(LearnerMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("learner thread panicked");
            }
        }
    }
}

fn run(
    rx: &Receiver<LearnerMsg>,
    shared: &RwLock<LinearPolicy>,
    updates: &AtomicU64,
    hp: &Hyperparameters,
    mut rng: ChaCha8Rng,
    task: &str,
) {
    let n_steps = hp.n_steps.max(1);
    let mut rollout = Rollout::with_capacity(n_steps);
    let mut optimizer: Option<Adam> = None;

    while let Ok(msg) = rx.recv() {
        match msg {
            LearnerMsg::Step(step) => rollout.push(*step),
            LearnerMsg::Shutdown => break,
        }
        if rollout.len() < n_steps {
            continue;
        }

        let mut policy = shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let opt = optimizer.get_or_insert_with(|| Adam::new(policy.params().len()));
        let stats = ppo_update(&mut policy, &rollout, hp, opt, &mut rng);
        *shared.write().unwrap_or_else(PoisonError::into_inner) = policy;
        let n = updates.fetch_add(1, Ordering::SeqCst) + 1;
        rollout.clear();

        info!(
            task,
            update = n,
            policy_loss = stats.policy_loss,
            value_loss = stats.value_loss,
            entropy = stats.entropy,
            clip_fraction = stats.clip_fraction,
            "policy updated"
        );
    }
    debug!(task, pending = rollout.len(), "learner stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use silkbridge_core::types::Layout;

    fn small_hp(n_steps: usize) -> Hyperparameters {
        Hyperparameters {
            n_steps,
            batch_size: 2,
            n_epochs: 2,
            learning_rate: 0.05,
            ..Hyperparameters::for_layout(Layout::Flat)
        }
    }

    fn step(policy: &LinearPolicy, arm: u32) -> RolloutStep {
        let features = vec![1.0];
        RolloutStep {
            log_prob: policy.log_prob(&features, &[arm]),
            value: 0.0,
            next_value: 0.0,
            features,
            action: vec![arm],
            reward: f32::from(u8::from(arm == 1)),
            done: true,
        }
    }

    #[test]
    fn update_runs_after_n_steps() {
        let policy = LinearPolicy::zeros(1, vec![2]).unwrap();
        let shared = Arc::new(RwLock::new(policy.clone()));
        let updates = Arc::new(AtomicU64::new(0));
        let learner =
            Learner::spawn(shared.clone(), updates.clone(), small_hp(4), Some(3), "t").unwrap();
        for i in 0..4 {
            learner.send(step(&policy, i % 2)).unwrap();
        }
        drop(learner);

        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_ne!(*shared.read().unwrap(), policy);
    }

    #[test]
    fn partial_rollout_does_not_update() {
        let policy = LinearPolicy::zeros(1, vec![2]).unwrap();
        let shared = Arc::new(RwLock::new(policy.clone()));
        let updates = Arc::new(AtomicU64::new(0));
        let learner =
            Learner::spawn(shared.clone(), updates.clone(), small_hp(8), Some(3), "t").unwrap();
        for _ in 0..3 {
            learner.send(step(&policy, 1)).unwrap();
        }
        drop(learner);

        assert_eq!(updates.load(Ordering::SeqCst), 0);
        assert_eq!(*shared.read().unwrap(), policy);
    }
}
