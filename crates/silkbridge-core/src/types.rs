use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// How a flat observation vector is interpreted.
///
/// `vector` and `hybrid` are accepted on the wire as the names older game
/// clients send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// One numeric vector of `total_obs_dim` values.
    #[default]
    #[serde(alias = "vector")]
    Flat,
    /// A numeric vector followed by a single-channel row-major grid.
    #[serde(alias = "hybrid")]
    Split,
}

impl Layout {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Split => "split",
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskSpec
// ---------------------------------------------------------------------------

/// Task description carried by an INITIALIZE message.
///
/// Field aliases match the names sent by existing game clients
/// (`boss_name`, `observation_size`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Human-readable task identifier, echoed back unchanged.
    #[serde(alias = "boss_name")]
    pub task_id: String,

    /// Length of every flat state vector.
    #[serde(alias = "observation_size")]
    pub total_obs_dim: usize,

    /// Number of choices per discrete action dimension.
    #[serde(alias = "action_space_shape")]
    pub action_shape: Vec<u32>,

    #[serde(default, alias = "observation_type")]
    pub layout: Layout,

    /// Size of the vector part (defaults to `total_obs_dim`).
    #[serde(
        default,
        alias = "vector_obs_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub vector_dim: Option<usize>,

    #[serde(default, alias = "visual_width")]
    pub grid_width: usize,

    #[serde(default, alias = "visual_height")]
    pub grid_height: usize,
}

impl TaskSpec {
    /// Flat-layout spec with no grid.
    pub fn flat(task_id: impl Into<String>, total_obs_dim: usize, action_shape: Vec<u32>) -> Self {
        Self {
            task_id: task_id.into(),
            total_obs_dim,
            action_shape,
            layout: Layout::Flat,
            vector_dim: None,
            grid_width: 0,
            grid_height: 0,
        }
    }

    /// Split-layout spec: `vector_dim` values followed by a `grid_width` x
    /// `grid_height` grid.
    pub fn split(
        task_id: impl Into<String>,
        total_obs_dim: usize,
        action_shape: Vec<u32>,
        vector_dim: usize,
        grid_width: usize,
        grid_height: usize,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            total_obs_dim,
            action_shape,
            layout: Layout::Split,
            vector_dim: Some(vector_dim),
            grid_width,
            grid_height,
        }
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Single-channel 2-D buffer, stored row-major (`height` rows of `width`).
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Grid {
    /// Build a grid from row-major data.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self, ValidationError> {
        if data.len() != width * height {
            return Err(ValidationError::ObservationDimMismatch {
                expected: width * height,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub const fn width(&self) -> usize {
        self.width
    }

    pub const fn height(&self) -> usize {
        self.height
    }

    /// Channel-first shape `[1, height, width]`.
    pub const fn shape(&self) -> [usize; 3] {
        [1, self.height, self.width]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// One row of `width` values.
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        if row >= self.height {
            return None;
        }
        let start = row * self.width;
        self.data.get(start..start + self.width)
    }

    fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.height).filter_map(|r| self.row(r))
    }

    /// Mean of every row (length `height`). Empty rows average to zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn row_means(&self) -> Vec<f32> {
        if self.width == 0 {
            return vec![0.0; self.height];
        }
        self.rows()
            .map(|row| row.iter().sum::<f32>() / self.width as f32)
            .collect()
    }

    /// Mean of every column (length `width`). Empty columns average to zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn col_means(&self) -> Vec<f32> {
        let mut sums = vec![0.0_f32; self.width];
        if self.width == 0 || self.height == 0 {
            return sums;
        }
        for row in self.rows() {
            for (sum, v) in sums.iter_mut().zip(row) {
                *sum += v;
            }
        }
        let h = self.height as f32;
        sums.iter_mut().for_each(|s| *s /= h);
        sums
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Observation in the shape the policy engine expects.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Whole state as one vector.
    Flat(Vec<f32>),
    /// Leading vector part plus the grid built from the remaining values.
    Split { vector: Vec<f32>, grid: Grid },
}

impl Observation {
    /// Total number of scalars.
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(v) => v.len(),
            Self::Split { vector, grid } => vector.len() + grid.as_slice().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The vector part (the whole observation for [`Observation::Flat`]).
    pub fn vector(&self) -> &[f32] {
        match self {
            Self::Flat(v) | Self::Split { vector: v, .. } => v,
        }
    }

    pub const fn grid(&self) -> Option<&Grid> {
        match self {
            Self::Flat(_) => None,
            Self::Split { grid, .. } => Some(grid),
        }
    }

    pub const fn layout(&self) -> Layout {
        match self {
            Self::Flat(_) => Layout::Flat,
            Self::Split { .. } => Layout::Split,
        }
    }

    /// Concatenate back into the flat wire order.
    pub fn to_flat(&self) -> Vec<f32> {
        match self {
            Self::Flat(v) => v.clone(),
            Self::Split { vector, grid } => {
                let mut out = Vec::with_capacity(self.len());
                out.extend_from_slice(vector);
                out.extend_from_slice(grid.as_slice());
                out
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// One environment step reported by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Observation,
    pub action: Vec<u32>,
    pub reward: f32,
    pub next_state: Observation,
    pub done: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_defaults_to_flat() {
        assert_eq!(Layout::default(), Layout::Flat);
    }

    #[test]
    fn layout_accepts_legacy_names() {
        let l: Layout = serde_json::from_str(r#""hybrid""#).unwrap();
        assert_eq!(l, Layout::Split);
        let l: Layout = serde_json::from_str(r#""vector""#).unwrap();
        assert_eq!(l, Layout::Flat);
    }

    #[test]
    fn layout_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Layout::Split).unwrap(), r#""split""#);
        assert_eq!(Layout::Flat.to_string(), "flat");
    }

    #[test]
    fn task_spec_defaults() {
        let json = r#"{"task_id":"Hornet","total_obs_dim":10,"action_shape":[3,2]}"#;
        let spec: TaskSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec, TaskSpec::flat("Hornet", 10, vec![3, 2]));
    }

    #[test]
    fn task_spec_accepts_legacy_field_names() {
        let json = r#"{
            "boss_name": "Moss Knight",
            "observation_size": 21,
            "action_space_shape": [4],
            "observation_type": "hybrid",
            "vector_obs_size": 5,
            "visual_width": 4,
            "visual_height": 4
        }"#;
        let spec: TaskSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec, TaskSpec::split("Moss Knight", 21, vec![4], 5, 4, 4));
    }

    #[test]
    fn grid_rejects_wrong_length() {
        let err = Grid::new(3, 2, vec![0.0; 5]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ObservationDimMismatch {
                expected: 6,
                got: 5
            }
        );
    }

    #[test]
    fn grid_is_row_major() {
        // 2 rows x 3 columns
        let grid = Grid::new(3, 2, vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]).unwrap();
        assert_eq!(grid.shape(), [1, 2, 3]);
        assert_eq!(grid.row(0), Some(&[0.0, 1.0, 2.0][..]));
        assert_eq!(grid.row(1), Some(&[10.0, 11.0, 12.0][..]));
        assert_eq!(grid.row(2), None);
    }

    #[test]
    fn grid_means() {
        let grid = Grid::new(2, 2, vec![1.0, 3.0, 5.0, 7.0]).unwrap();
        assert_eq!(grid.row_means(), vec![2.0, 6.0]);
        assert_eq!(grid.col_means(), vec![3.0, 5.0]);
    }

    #[test]
    fn empty_grid_means_are_zero() {
        let grid = Grid::new(0, 0, vec![]).unwrap();
        assert!(grid.row_means().is_empty());
        assert!(grid.col_means().is_empty());
    }

    #[test]
    fn observation_to_flat_restores_wire_order() {
        let obs = Observation::Split {
            vector: vec![1.0, 2.0],
            grid: Grid::new(2, 1, vec![3.0, 4.0]).unwrap(),
        };
        assert_eq!(obs.len(), 4);
        assert_eq!(obs.layout(), Layout::Split);
        assert_eq!(obs.vector(), &[1.0, 2.0]);
        assert_eq!(obs.to_flat(), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
