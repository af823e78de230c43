//! Collected transitions and GAE(λ) advantage estimation.

/// One transition as seen by the learner.
///
/// `log_prob`, `value` and `next_value` are computed with the parameters
/// that were live when the transition was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutStep {
    pub features: Vec<f32>,
    pub action: Vec<u32>,
    pub reward: f32,
    pub done: bool,
    pub log_prob: f32,
    pub value: f32,
    pub next_value: f32,
}

/// Fixed-capacity buffer of [`RolloutStep`]s in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Rollout {
    steps: Vec<RolloutStep>,
}

impl Rollout {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            steps: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, step: RolloutStep) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[RolloutStep] {
        &self.steps
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// Generalized advantage estimates and the matching returns
    /// (`advantage + value`).
    ///
    /// Consecutive steps are treated as one trajectory until a `done`; each
    /// step bootstraps from its own `next_value`.
    pub fn advantages(&self, gamma: f32, gae_lambda: f32) -> (Vec<f32>, Vec<f32>) {
        let n = self.steps.len();
        let mut advantages = vec![0.0; n];
        let mut last_gae = 0.0;
        for (i, step) in self.steps.iter().enumerate().rev() {
            let not_done = if step.done { 0.0 } else { 1.0 };
            let delta = step.reward + gamma * step.next_value * not_done - step.value;
            last_gae = delta + gamma * gae_lambda * not_done * last_gae;
            advantages[i] = last_gae;
        }
        let returns = advantages
            .iter()
            .zip(&self.steps)
            .map(|(a, s)| a + s.value)
            .collect();
        (advantages, returns)
    }
}
