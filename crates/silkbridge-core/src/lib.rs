// silkbridge-core: Task context, observation codec, engine traits, config and errors.

pub mod codec;
pub mod config;
pub mod error;
pub mod hyperparams;
pub mod task;
pub mod traits;
pub mod types;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        codec::to_observation,
        config::BridgeConfig,
        error::{BridgeError, ConfigError, EngineError, SpecError, ValidationError},
        hyperparams::{Hyperparameters, PolicyInput},
        task::{CheckpointStore, InitOutcome, TaskContext, TaskManager, normalize_task_id},
        traits::{EngineProvider, PolicyEngine},
        types::{Grid, Layout, Observation, TaskSpec, Transition},
    };
}
