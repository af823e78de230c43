//! Observation → linear feature vector.
//!
//! Every feature vector ends with a constant `1.0` bias term.

use silkbridge_core::hyperparams::PolicyInput;
use silkbridge_core::task::TaskContext;
use silkbridge_core::types::Observation;

/// Number of features produced for `ctx` under `input`. Saturates instead
/// of overflowing; the model size check rejects such shapes.
pub const fn feature_dim(input: PolicyInput, ctx: &TaskContext) -> usize {
    match input {
        PolicyInput::Flat => ctx.total_obs_dim().saturating_add(1),
        PolicyInput::VectorGrid => ctx
            .vector_dim()
            .saturating_add(ctx.grid_height())
            .saturating_add(ctx.grid_width())
            .saturating_add(1),
    }
}

/// Build the feature vector for `obs`.
///
/// [`PolicyInput::Flat`] uses every value in wire order.
/// [`PolicyInput::VectorGrid`] uses the vector part followed by the grid's
/// row means and column means.
pub fn extract(input: PolicyInput, obs: &Observation) -> Vec<f32> {
    let mut features = match input {
        PolicyInput::Flat => obs.to_flat(),
        PolicyInput::VectorGrid => {
            let mut f = obs.vector().to_vec();
            if let Some(grid) = obs.grid() {
                f.extend(grid.row_means());
                f.extend(grid.col_means());
            }
            f
        }
    };
    features.push(1.0);
    features
}
