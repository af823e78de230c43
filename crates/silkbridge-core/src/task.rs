//! The active task slot and its (re)initialization.
//!
//! [`TaskManager`] owns at most one [`TaskContext`] together with the policy
//! engine built for it. [`TaskManager::reinitialize`] is all-or-nothing: the
//! new context and engine replace the old pair in a single assignment, and
//! only after validation, engine construction and the initial checkpoint
//! write have all succeeded.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::codec::to_observation;
use crate::error::{BridgeError, EngineError, SpecError, ValidationError};
use crate::hyperparams::Hyperparameters;
use crate::traits::{EngineProvider, PolicyEngine};
use crate::types::{Layout, TaskSpec, Transition};

/// File name of a task's checkpoint inside its directory.
pub const CHECKPOINT_FILE: &str = "checkpoint";

/// Separator replacing whitespace in normalized task ids.
pub const ID_SEPARATOR: char = '_';

/// Normalize a task identifier into a persistence key.
///
/// Trims, lowercases and replaces whitespace and path separators with
/// [`ID_SEPARATOR`].
///
/// ```
/// use silkbridge_core::task::normalize_task_id;
///
/// assert_eq!(normalize_task_id("Moss Knight"), "moss_knight");
/// ```
pub fn normalize_task_id(task_id: &str) -> String {
    task_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                ID_SEPARATOR
            } else {
                c
            }
        })
        .flat_map(char::to_lowercase)
        .collect()
}

// ---------------------------------------------------------------------------
// TaskContext
// ---------------------------------------------------------------------------

/// Dimensions and layout of the currently active task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    task_id: String,
    normalized_id: String,
    total_obs_dim: usize,
    action_shape: Vec<u32>,
    layout: Layout,
    vector_dim: usize,
    grid_width: usize,
    grid_height: usize,
}

impl TaskContext {
    /// Validate a spec and build the context it describes.
    ///
    /// For [`Layout::Flat`] any vector/grid fields in the spec are ignored and
    /// the context uses `vector_dim = total_obs_dim` with an empty grid.
    pub fn from_spec(spec: &TaskSpec) -> Result<Self, SpecError> {
        if spec.task_id.trim().is_empty() {
            return Err(SpecError::EmptyTaskId);
        }
        let normalized_id = normalize_task_id(&spec.task_id);
        if normalized_id.chars().all(|c| c == '.') {
            return Err(SpecError::InvalidTaskId(spec.task_id.clone()));
        }
        if spec.total_obs_dim == 0 {
            return Err(SpecError::ZeroObsDim);
        }
        if spec.action_shape.is_empty() {
            return Err(SpecError::EmptyActionShape);
        }
        if let Some(index) = spec.action_shape.iter().position(|&n| n == 0) {
            return Err(SpecError::ZeroActionBranch { index });
        }

        let (vector_dim, grid_width, grid_height) = match spec.layout {
            Layout::Flat => {
                if spec.grid_width != 0
                    || spec.grid_height != 0
                    || spec.vector_dim.is_some_and(|v| v != spec.total_obs_dim)
                {
                    debug!(
                        task = %spec.task_id,
                        "flat layout: ignoring vector_dim/grid fields"
                    );
                }
                (spec.total_obs_dim, 0, 0)
            }
            Layout::Split => {
                let vector = spec.vector_dim.unwrap_or(spec.total_obs_dim);
                let grid = spec
                    .grid_width
                    .checked_mul(spec.grid_height)
                    .and_then(|g| g.checked_add(vector));
                if grid != Some(spec.total_obs_dim) {
                    return Err(SpecError::SplitDimMismatch {
                        total: spec.total_obs_dim,
                        vector,
                        width: spec.grid_width,
                        height: spec.grid_height,
                    });
                }
                (vector, spec.grid_width, spec.grid_height)
            }
        };

        Ok(Self {
            task_id: spec.task_id.clone(),
            normalized_id,
            total_obs_dim: spec.total_obs_dim,
            action_shape: spec.action_shape.clone(),
            layout: spec.layout,
            vector_dim,
            grid_width,
            grid_height,
        })
    }

    /// Identifier exactly as the client sent it.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Persistence key derived from the task id.
    pub fn normalized_id(&self) -> &str {
        &self.normalized_id
    }

    pub const fn total_obs_dim(&self) -> usize {
        self.total_obs_dim
    }

    pub fn action_shape(&self) -> &[u32] {
        &self.action_shape
    }

    pub const fn layout(&self) -> Layout {
        self.layout
    }

    pub const fn vector_dim(&self) -> usize {
        self.vector_dim
    }

    pub const fn grid_width(&self) -> usize {
        self.grid_width
    }

    pub const fn grid_height(&self) -> usize {
        self.grid_height
    }

    /// Check an action against the action shape (length and per-dimension range).
    pub fn validate_action(&self, action: &[u32]) -> Result<(), ValidationError> {
        if action.len() != self.action_shape.len() {
            return Err(ValidationError::ActionLengthMismatch {
                expected: self.action_shape.len(),
                got: action.len(),
            });
        }
        for (index, (&value, &max)) in action.iter().zip(&self.action_shape).enumerate() {
            if value >= max {
                return Err(ValidationError::ActionOutOfRange { index, value, max });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CheckpointStore
// ---------------------------------------------------------------------------

/// Maps normalized task ids to checkpoint paths under a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<normalized_id>/checkpoint`.
    pub fn path_for(&self, normalized_id: &str) -> PathBuf {
        self.root.join(normalized_id).join(CHECKPOINT_FILE)
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new("models")
    }
}

// ---------------------------------------------------------------------------
// TaskManager
// ---------------------------------------------------------------------------

/// Result of a successful [`TaskManager::reinitialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    pub initialized: bool,
    pub task_id: String,
    pub total_obs_dim: usize,
    pub checkpoint_loaded: bool,
}

struct ActiveTask {
    context: TaskContext,
    engine: Box<dyn PolicyEngine>,
    checkpoint: PathBuf,
}

/// Owns the single active task slot and the engine bound to it.
pub struct TaskManager {
    provider: Box<dyn EngineProvider>,
    checkpoints: CheckpointStore,
    active: Option<ActiveTask>,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("provider", &self.provider.name())
            .field("checkpoints", &self.checkpoints)
            .field("active", &self.context().map(TaskContext::task_id))
            .finish()
    }
}

impl TaskManager {
    pub fn new(provider: Box<dyn EngineProvider>, checkpoints: CheckpointStore) -> Self {
        Self {
            provider,
            checkpoints,
            active: None,
        }
    }

    /// The active task, if any INITIALIZE has succeeded.
    pub fn context(&self) -> Option<&TaskContext> {
        self.active.as_ref().map(|a| &a.context)
    }

    pub const fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Name of the active engine.
    pub fn engine_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.engine.name())
    }

    /// Replace the active task with the one described by `spec`.
    ///
    /// The outgoing engine is persisted first, so re-initializing the same
    /// task reloads everything it has learned. Then the task's checkpoint is
    /// loaded when one exists, otherwise a fresh engine is created and its
    /// initial checkpoint written. On any error the previous task and engine
    /// stay active.
    pub fn reinitialize(&mut self, spec: &TaskSpec) -> Result<InitOutcome, BridgeError> {
        let context = TaskContext::from_spec(spec)?;
        let checkpoint = self.checkpoints.path_for(context.normalized_id());

        info!(
            task = %context.task_id(),
            key = %context.normalized_id(),
            layout = %context.layout(),
            total_obs_dim = context.total_obs_dim(),
            vector_dim = context.vector_dim(),
            grid_width = context.grid_width(),
            grid_height = context.grid_height(),
            action_shape = ?context.action_shape(),
            "initializing task"
        );

        if let Err(e) = self.persist_active() {
            warn!("failed to persist outgoing engine: {e}");
        }

        let (engine, checkpoint_loaded) = if self.provider.checkpoint_exists(&checkpoint) {
            info!(path = %checkpoint.display(), "loading checkpoint");
            (self.provider.load(&context, &checkpoint)?, true)
        } else {
            let hyperparameters = Hyperparameters::for_layout(context.layout());
            info!(
                provider = self.provider.name(),
                policy_input = ?hyperparameters.policy_input,
                "no checkpoint found, creating fresh engine"
            );
            let mut engine = self.provider.create(&context, &hyperparameters)?;
            engine.persist(&checkpoint)?;
            info!(path = %checkpoint.display(), "saved initial checkpoint");
            (engine, false)
        };

        let outcome = InitOutcome {
            initialized: true,
            task_id: context.task_id().to_string(),
            total_obs_dim: context.total_obs_dim(),
            checkpoint_loaded,
        };
        self.active = Some(ActiveTask {
            context,
            engine,
            checkpoint,
        });
        Ok(outcome)
    }

    /// Decode `state` for the active task and ask the engine for an action.
    pub fn predict(&mut self, state: &[f32], deterministic: bool) -> Result<Vec<u32>, BridgeError> {
        let active = self.active.as_mut().ok_or(BridgeError::NotInitialized)?;
        let obs = to_observation(state, &active.context)?;
        let action = active.engine.predict(&obs, deterministic)?;
        active
            .context
            .validate_action(&action)
            .map_err(EngineError::InvalidPrediction)?;
        Ok(action)
    }

    /// Validate and decode a transition, then hand it to the engine.
    pub fn store_transition(
        &mut self,
        state: &[f32],
        action: Vec<u32>,
        reward: f32,
        next_state: &[f32],
        done: bool,
    ) -> Result<(), BridgeError> {
        let active = self.active.as_mut().ok_or(BridgeError::NotInitialized)?;
        let state = to_observation(state, &active.context)?;
        let next_state = to_observation(next_state, &active.context)?;
        active.context.validate_action(&action)?;
        active.engine.store_transition(Transition {
            state,
            action,
            reward,
            next_state,
            done,
        })?;
        Ok(())
    }

    /// Write the active engine to its checkpoint. Returns `false` when no
    /// task is active.
    pub fn persist_active(&mut self) -> Result<bool, EngineError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };
        active.engine.persist(&active.checkpoint)?;
        debug!(path = %active.checkpoint.display(), "persisted engine");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
