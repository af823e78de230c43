//! Flat state vector → [`Observation`] for the active task's layout.

use crate::error::ValidationError;
use crate::task::TaskContext;
use crate::types::{Grid, Layout, Observation};

/// Convert a flat state vector into the observation shape of `ctx`.
///
/// The length must equal `ctx.total_obs_dim()`. For [`Layout::Split`] the
/// first `vector_dim` values form the vector part and the rest are reshaped
/// row-major into a `grid_height` x `grid_width` grid. Values are not range
/// checked.
///
/// ```
/// use silkbridge_core::codec::to_observation;
/// use silkbridge_core::task::TaskContext;
/// use silkbridge_core::types::TaskSpec;
///
/// let ctx = TaskContext::from_spec(&TaskSpec::split("demo", 3, vec![2], 1, 2, 1)).unwrap();
/// let obs = to_observation(&[0.5, 1.0, 2.0], &ctx).unwrap();
/// assert_eq!(obs.vector(), &[0.5]);
/// assert_eq!(obs.grid().unwrap().as_slice(), &[1.0, 2.0]);
/// ```
pub fn to_observation(flat: &[f32], ctx: &TaskContext) -> Result<Observation, ValidationError> {
    if flat.len() != ctx.total_obs_dim() {
        return Err(ValidationError::ObservationDimMismatch {
            expected: ctx.total_obs_dim(),
            got: flat.len(),
        });
    }

    match ctx.layout() {
        Layout::Flat => Ok(Observation::Flat(flat.to_vec())),
        Layout::Split => {
            let (vector, grid) = flat.split_at(ctx.vector_dim());
            let grid = Grid::new(ctx.grid_width(), ctx.grid_height(), grid.to_vec())?;
            Ok(Observation::Split {
                vector: vector.to_vec(),
                grid,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
