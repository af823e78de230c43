//! On-disk checkpoint for [`LinearPolicy`] engines.
//!
//! A checkpoint is a single JSON document. Writes go to a sibling temp file
//! that is renamed into place, so a crash never leaves a torn checkpoint.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use silkbridge_core::error::EngineError;
use silkbridge_core::hyperparams::{Hyperparameters, PolicyInput};
use silkbridge_core::task::TaskContext;

use crate::features::feature_dim;
use crate::model::LinearPolicy;

/// Current checkpoint format version.
pub const FORMAT_VERSION: u32 = 1;

/// Serialized engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    /// Task identifier at the time of saving, as the client sent it.
    pub task_id: String,
    pub policy_input: PolicyInput,
    pub hyperparameters: Hyperparameters,
    pub policy: LinearPolicy,
    /// Completed PPO updates.
    #[serde(default)]
    pub updates: u64,
}

impl Checkpoint {
    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| EngineError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| EngineError::io(path, e))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let bytes = fs::read(path).map_err(|e| EngineError::io(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Reject a checkpoint whose shapes do not fit `ctx`.
    pub fn check_compatible(&self, ctx: &TaskContext, path: &Path) -> Result<(), EngineError> {
        let incompatible = |reason: String| EngineError::IncompatibleCheckpoint {
            path: path.to_path_buf(),
            reason,
        };

        if self.format_version != FORMAT_VERSION {
            return Err(incompatible(format!(
                "format version {} (expected {FORMAT_VERSION})",
                self.format_version
            )));
        }
        if self.policy.action_shape() != ctx.action_shape() {
            return Err(incompatible(format!(
                "action_shape {:?} (task has {:?})",
                self.policy.action_shape(),
                ctx.action_shape()
            )));
        }
        let expected_input = Hyperparameters::for_layout(ctx.layout()).policy_input;
        if self.policy_input != expected_input {
            return Err(incompatible(format!(
                "policy input {:?} (task layout {} needs {expected_input:?})",
                self.policy_input,
                ctx.layout()
            )));
        }
        let expected_dim = feature_dim(self.policy_input, ctx);
        if self.policy.feature_dim() != expected_dim {
            return Err(incompatible(format!(
                "feature_dim {} (task needs {expected_dim})",
                self.policy.feature_dim()
            )));
        }
        if !self.policy.is_consistent() {
            return Err(incompatible("parameter count does not match shape".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use silkbridge_core::types::{Layout, TaskSpec};

    fn checkpoint_for(ctx: &TaskContext) -> Checkpoint {
        let hp = Hyperparameters::for_layout(ctx.layout());
        Checkpoint {
            format_version: FORMAT_VERSION,
            task_id: ctx.task_id().to_string(),
            policy_input: hp.policy_input,
            policy: LinearPolicy::zeros(
                feature_dim(hp.policy_input, ctx),
                ctx.action_shape().to_vec(),
            )
            .unwrap(),
            hyperparameters: hp,
            updates: 3,
        }
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hornet").join("checkpoint");
        let ctx = TaskContext::from_spec(&TaskSpec::flat("Hornet", 4, vec![3, 2])).unwrap();
        let ckpt = checkpoint_for(&ctx);

        ckpt.save(&path).unwrap();
        assert!(path.is_file());
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(Checkpoint::load(&path).unwrap(), ckpt);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Checkpoint::load(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }

    #[test]
    fn load_garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            Checkpoint::load(&path).unwrap_err(),
            EngineError::Checkpoint(_)
        ));
    }

    #[test]
    fn compatible_with_own_task() {
        let ctx = TaskContext::from_spec(&TaskSpec::split("t", 7, vec![2], 3, 2, 2)).unwrap();
        let ckpt = checkpoint_for(&ctx);
        assert_eq!(ckpt.policy_input, PolicyInput::VectorGrid);
        ckpt.check_compatible(&ctx, Path::new("x")).unwrap();
    }

    #[test]
    fn different_action_shape_is_incompatible() {
        let a = TaskContext::from_spec(&TaskSpec::flat("t", 4, vec![3])).unwrap();
        let b = TaskContext::from_spec(&TaskSpec::flat("t", 4, vec![5])).unwrap();
        let err = checkpoint_for(&a).check_compatible(&b, Path::new("x")).unwrap_err();
        assert!(matches!(err, EngineError::IncompatibleCheckpoint { .. }));
    }

    #[test]
    fn different_obs_dim_is_incompatible() {
        let a = TaskContext::from_spec(&TaskSpec::flat("t", 4, vec![3])).unwrap();
        let b = TaskContext::from_spec(&TaskSpec::flat("t", 6, vec![3])).unwrap();
        assert!(checkpoint_for(&a).check_compatible(&b, Path::new("x")).is_err());
    }

    #[test]
    fn layout_change_is_incompatible() {
        let flat = TaskContext::from_spec(&TaskSpec::flat("t", 7, vec![2])).unwrap();
        let split = TaskContext::from_spec(&TaskSpec::split("t", 7, vec![2], 3, 2, 2)).unwrap();
        assert_eq!(split.layout(), Layout::Split);
        let err = checkpoint_for(&flat)
            .check_compatible(&split, Path::new("x"))
            .unwrap_err();
        assert!(err.to_string().contains("policy input"));
    }
}
