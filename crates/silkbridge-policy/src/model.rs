//! Linear actor-critic over a multi-discrete action space.
//!
//! All parameters live in one flat vector so gradients and optimizer state
//! share its layout: for each action dimension `k` a row-major
//! `[action_shape[k], feature_dim]` logit block, then `feature_dim` value
//! weights.

use rand::Rng;
use serde::{Deserialize, Serialize};
use silkbridge_core::error::EngineError;

/// Largest parameter vector an engine will allocate (64 MiB of `f32`).
pub const MAX_PARAMETERS: usize = 1 << 24;

/// Linear policy and value heads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPolicy {
    feature_dim: usize,
    action_shape: Vec<u32>,
    params: Vec<f32>,
}

impl LinearPolicy {
    /// All-zero parameters: uniform action distribution, zero value.
    ///
    /// Fails without allocating when the shape needs more than
    /// [`MAX_PARAMETERS`] parameters.
    pub fn zeros(feature_dim: usize, action_shape: Vec<u32>) -> Result<Self, EngineError> {
        let len = parameter_count(feature_dim, &action_shape)
            .filter(|&n| n <= MAX_PARAMETERS)
            .ok_or(EngineError::ModelTooLarge {
                limit: MAX_PARAMETERS,
            })?;
        Ok(Self {
            feature_dim,
            action_shape,
            params: vec![0.0; len],
        })
    }

    pub const fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn action_shape(&self) -> &[u32] {
        &self.action_shape
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    /// Whether the parameter vector matches the declared shape.
    pub fn is_consistent(&self) -> bool {
        parameter_count(self.feature_dim, &self.action_shape) == Some(self.params.len())
    }

    /// Offset of action dimension `branch`'s logit block.
    pub fn branch_offset(&self, branch: usize) -> usize {
        self.action_shape[..branch]
            .iter()
            .map(|&n| n as usize * self.feature_dim)
            .sum()
    }

    /// Offset of the value weights.
    pub fn value_offset(&self) -> usize {
        self.branch_offset(self.action_shape.len())
    }

    /// Raw logits of one action dimension.
    pub fn logits(&self, branch: usize, features: &[f32]) -> Vec<f32> {
        let offset = self.branch_offset(branch);
        let n = self.action_shape[branch] as usize;
        (0..n)
            .map(|c| {
                let row = offset + c * self.feature_dim;
                dot(&self.params[row..row + self.feature_dim], features)
            })
            .collect()
    }

    /// Softmax probabilities for every action dimension.
    pub fn probabilities(&self, features: &[f32]) -> Vec<Vec<f32>> {
        (0..self.action_shape.len())
            .map(|k| softmax(&self.logits(k, features)))
            .collect()
    }

    /// State-value estimate.
    pub fn value(&self, features: &[f32]) -> f32 {
        let offset = self.value_offset();
        dot(&self.params[offset..offset + self.feature_dim], features)
    }

    /// Joint log-probability of `action` (sum over dimensions).
    pub fn log_prob(&self, features: &[f32], action: &[u32]) -> f32 {
        self.probabilities(features)
            .iter()
            .zip(action)
            .map(|(p, &a)| p[a as usize].max(f32::MIN_POSITIVE).ln())
            .sum()
    }

    /// Pick one value per action dimension: argmax when `deterministic`,
    /// otherwise a sample from each softmax.
    pub fn act(&self, features: &[f32], deterministic: bool, rng: &mut impl Rng) -> Vec<u32> {
        self.probabilities(features)
            .iter()
            .map(|p| {
                if deterministic {
                    argmax(p)
                } else {
                    sample(p, rng)
                }
            })
            .collect()
    }
}

/// Number of parameters for the given shape, or `None` on overflow.
pub fn parameter_count(feature_dim: usize, action_shape: &[u32]) -> Option<usize> {
    action_shape
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_add(n as usize))?
        .checked_mul(feature_dim)
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

/// Entropy of a categorical distribution (nats).
pub fn entropy(probs: &[f32]) -> f32 {
    -probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|p| p * p.ln())
        .sum::<f32>()
}

#[allow(clippy::cast_possible_truncation)]
fn argmax(probs: &[f32]) -> u32 {
    probs
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bp), (i, &p)| {
            if p > bp { (i, p) } else { (bi, bp) }
        })
        .0 as u32
}

#[allow(clippy::cast_possible_truncation)]
fn sample(probs: &[f32], rng: &mut impl Rng) -> u32 {
    let u: f32 = rng.r#gen();
    let mut acc = 0.0;
    for (i, p) in probs.iter().enumerate() {
        acc += p;
        if u < acc {
            return i as u32;
        }
    }
    // Rounding left the cumulative sum just under 1.0.
    (probs.len() - 1) as u32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
