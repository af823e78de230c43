//! Fixed training hyperparameters handed to freshly created engines.

use serde::{Deserialize, Serialize};

use crate::types::Layout;

/// Which observation features the policy consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyInput {
    /// The flat vector as-is.
    Flat,
    /// Vector part plus a pooled summary of the grid.
    VectorGrid,
}

/// PPO-style hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub policy_input: PolicyInput,
    /// Steps collected per rollout before an update.
    pub n_steps: usize,
    /// Minibatch size for gradient steps.
    pub batch_size: usize,
    /// Passes over each rollout.
    pub n_epochs: usize,
    pub learning_rate: f32,
    pub gamma: f32,
    pub gae_lambda: f32,
    pub clip_range: f32,
    pub ent_coef: f32,
    pub vf_coef: f32,
    pub max_grad_norm: f32,
}

impl Hyperparameters {
    /// The fixed values used for a fresh engine of the given layout.
    pub const fn for_layout(layout: Layout) -> Self {
        let policy_input = match layout {
            Layout::Flat => PolicyInput::Flat,
            Layout::Split => PolicyInput::VectorGrid,
        };
        Self {
            policy_input,
            n_steps: 2048,
            batch_size: 512,
            n_epochs: 10,
            learning_rate: 3e-4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            ent_coef: 0.01,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
        }
    }
}
