use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for task and engine operations.
///
/// Every variant is recoverable from the protocol's point of view: the
/// dispatcher turns it into an ERROR response and keeps the session open.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Task spec error: {0}")]
    Spec(#[from] SpecError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("No task initialized: send INITIALIZE first")]
    NotInitialized,
}

/// Invalid INITIALIZE task description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("task_id must not be empty")]
    EmptyTaskId,

    #[error("task_id '{0}' cannot be used as a checkpoint directory name")]
    InvalidTaskId(String),

    #[error("total_obs_dim must be > 0")]
    ZeroObsDim,

    #[error("action_shape must contain at least one dimension")]
    EmptyActionShape,

    #[error("action_shape[{index}] must be > 0")]
    ZeroActionBranch { index: usize },

    #[error(
        "split layout requires total_obs_dim == vector_dim + grid_width * grid_height \
         (got {total} != {vector} + {width} * {height})"
    )]
    SplitDimMismatch {
        total: usize,
        vector: usize,
        width: usize,
        height: usize,
    },
}

/// Observation/action validation errors.
///
/// Copy + static messages for cheap propagation on the per-message path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Observation dimension mismatch: expected {expected}, got {got}")]
    ObservationDimMismatch { expected: usize, got: usize },

    #[error("Action length mismatch: expected {expected}, got {got}")]
    ActionLengthMismatch { expected: usize, got: usize },

    #[error("Action out of range at dimension {index}: {value} >= {max}")]
    ActionOutOfRange { index: usize, value: u32, max: u32 },
}

/// Failures reported by a policy engine or its provider.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Checkpoint encoding error: {0}")]
    Checkpoint(#[from] serde_json::Error),

    #[error("Checkpoint at {path} is incompatible with the task: {reason}")]
    IncompatibleCheckpoint { path: PathBuf, reason: String },

    #[error("Engine returned an invalid action: {0}")]
    InvalidPrediction(ValidationError),

    #[error("Model for this task needs more than {limit} parameters")]
    ModelTooLarge { limit: usize },

    #[error("Background learner is no longer running")]
    LearnerStopped,

    #[error("Engine failure: {0}")]
    Failed(String),
}

impl EngineError {
    /// Wrap an IO error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
