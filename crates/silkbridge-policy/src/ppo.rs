//! Clipped-surrogate PPO update for [`LinearPolicy`].
//!
//! Loss per sample (averaged over a minibatch):
//!
//! ```text
//! L = -min(r·A, clip(r, 1-ε, 1+ε)·A) - ent_coef·H + vf_coef·(V - R)²
//! ```
//!
//! Gradients are computed analytically for the linear heads, clipped to
//! `max_grad_norm` and applied with Adam.

use rand::Rng;
use rand::seq::SliceRandom;
use silkbridge_core::hyperparams::Hyperparameters;

use crate::model::{LinearPolicy, entropy};
use crate::rollout::Rollout;

// ---------------------------------------------------------------------------
// Adam
// ---------------------------------------------------------------------------

/// Adam optimizer state over a flat parameter vector.
#[derive(Debug, Clone)]
pub struct Adam {
    m: Vec<f32>,
    v: Vec<f32>,
    t: i32,
    beta1: f32,
    beta2: f32,
    eps: f32,
}

impl Adam {
    pub fn new(len: usize) -> Self {
        Self {
            m: vec![0.0; len],
            v: vec![0.0; len],
            t: 0,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-5,
        }
    }

    /// One bias-corrected descent step on `params`.
    pub fn step(&mut self, params: &mut [f32], grads: &[f32], lr: f32) {
        self.t = self.t.saturating_add(1);
        let bc1 = 1.0 - self.beta1.powi(self.t);
        let bc2 = 1.0 - self.beta2.powi(self.t);
        for (((p, g), m), v) in params
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / bc1;
            let v_hat = *v / bc2;
            *p -= lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

// ---------------------------------------------------------------------------
// UpdateStats
// ---------------------------------------------------------------------------

/// Averages over every sample processed by one [`ppo_update`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateStats {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    /// Share of samples with `|r - 1| > clip_range`.
    pub clip_fraction: f32,
    /// Pre-clipping gradient norm of the last minibatch.
    pub grad_norm: f32,
    pub minibatches: usize,
}

// ---------------------------------------------------------------------------
// ppo_update
// ---------------------------------------------------------------------------

/// Run `n_epochs` of shuffled minibatch updates over `rollout`.
#[allow(clippy::cast_precision_loss)]
pub fn ppo_update(
    policy: &mut LinearPolicy,
    rollout: &Rollout,
    hp: &Hyperparameters,
    optimizer: &mut Adam,
    rng: &mut impl Rng,
) -> UpdateStats {
    let n = rollout.len();
    if n == 0 {
        return UpdateStats::default();
    }

    let (mut advantages, returns) = rollout.advantages(hp.gamma, hp.gae_lambda);
    normalize(&mut advantages);

    let steps = rollout.steps();
    let fd = policy.feature_dim();
    let batch = hp.batch_size.clamp(1, n);
    let mut indices: Vec<usize> = (0..n).collect();

    let mut stats = UpdateStats::default();
    let mut samples = 0usize;
    let mut clipped = 0usize;

    for _ in 0..hp.n_epochs {
        indices.shuffle(rng);
        for chunk in indices.chunks(batch) {
            let mut grads = vec![0.0_f32; policy.params().len()];

            for &i in chunk {
                let step = &steps[i];
                let f = &step.features;
                let probs = policy.probabilities(f);

                let log_prob: f32 = probs
                    .iter()
                    .zip(&step.action)
                    .map(|(p, &a)| p[a as usize].max(f32::MIN_POSITIVE).ln())
                    .sum();
                let ratio = (log_prob - step.log_prob).exp();
                let adv = advantages[i];
                let unclipped = ratio * adv;
                let clipped_obj = ratio.clamp(1.0 - hp.clip_range, 1.0 + hp.clip_range) * adv;

                stats.policy_loss -= unclipped.min(clipped_obj);
                if (ratio - 1.0).abs() > hp.clip_range {
                    clipped += 1;
                }
                // d(-surrogate)/d(log_prob); zero once the clipped term is the minimum.
                let dlogp = if unclipped <= clipped_obj {
                    -ratio * adv
                } else {
                    0.0
                };

                for (k, (p, &a)) in probs.iter().zip(&step.action).enumerate() {
                    let h = entropy(p);
                    stats.entropy += h;
                    let offset = policy.branch_offset(k);
                    for (c, &pc) in p.iter().enumerate() {
                        let onehot = if c == a as usize { 1.0 } else { 0.0 };
                        let mut g = dlogp * (onehot - pc);
                        if pc > 0.0 {
                            g += hp.ent_coef * pc * (pc.ln() + h);
                        }
                        let row = offset + c * fd;
                        for (gr, x) in grads[row..row + fd].iter_mut().zip(f) {
                            *gr += g * x;
                        }
                    }
                }

                let err = policy.value(f) - returns[i];
                stats.value_loss += err * err;
                let gv = 2.0 * hp.vf_coef * err;
                let voff = policy.value_offset();
                for (gr, x) in grads[voff..voff + fd].iter_mut().zip(f) {
                    *gr += gv * x;
                }

                samples += 1;
            }

            let scale = 1.0 / chunk.len() as f32;
            grads.iter_mut().for_each(|g| *g *= scale);
            stats.grad_norm = clip_grad_norm(&mut grads, hp.max_grad_norm);
            optimizer.step(policy.params_mut(), &grads, hp.learning_rate);
            stats.minibatches += 1;
        }
    }

    if samples > 0 {
        let s = samples as f32;
        stats.policy_loss /= s;
        stats.value_loss /= s;
        stats.entropy /= s;
        stats.clip_fraction = clipped as f32 / s;
    }
    stats
}

/// Scale `grads` so its L2 norm is at most `max_norm`. Returns the norm
/// before scaling.
pub fn clip_grad_norm(grads: &mut [f32], max_norm: f32) -> f32 {
    let norm = grads.iter().map(|g| g * g).sum::<f32>().sqrt();
    if max_norm > 0.0 && norm > max_norm {
        let scale = max_norm / norm;
        grads.iter_mut().for_each(|g| *g *= scale);
    }
    norm
}

#[allow(clippy::cast_precision_loss)]
fn normalize(values: &mut [f32]) {
    if values.len() < 2 {
        return;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let std = var.sqrt() + 1e-8;
    values.iter_mut().for_each(|v| *v = (*v - mean) / std);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
