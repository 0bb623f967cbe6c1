//! Checkpoint persistence for training runs
//!
//! Provides versioned checkpoint writing, a movable best-checkpoint link,
//! strict or lenient loading into a live model, and weight-only
//! simplification for deployment.

pub mod format;
pub mod state;
pub mod store;

pub use format::{CheckpointHeader, CheckpointKind, CHECKPOINT_EXTENSION};
pub use state::{Checkpoint, Module, Optimizer, OptimizerState, ParameterStore, TrainingMeta};
pub use store::{
    inspect_checkpoint, load_checkpoint, save_checkpoint, simplify_checkpoint,
    versioned_filename, CheckpointStore, CheckpointSummary, LoadMode, LoadOutcome,
    BEST_CHECKPOINT_NAME,
};
