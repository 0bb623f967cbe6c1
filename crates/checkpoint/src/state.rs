//! In-memory checkpoint contents and the model / optimizer seams

use runtime_core::{Epoch, Error, Result, StateDict, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Persisted snapshot of model parameters and optional training state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Parameter name to tensor
    pub state_dict: StateDict,

    /// Optimizer internal state
    pub optimizer: Option<OptimizerState>,

    /// Epoch the snapshot was taken at
    pub epoch: Option<Epoch>,

    /// Best top-1 precision seen so far
    pub best_prec1: Option<f64>,
}

impl Checkpoint {
    /// Weights-only checkpoint
    pub fn new(state_dict: StateDict) -> Self {
        Self {
            state_dict,
            optimizer: None,
            epoch: None,
            best_prec1: None,
        }
    }

    /// Snapshot a live model
    pub fn from_module<M: Module + ?Sized>(model: &M) -> Self {
        Self::new(model.state_dict())
    }

    pub fn with_optimizer(mut self, state: OptimizerState) -> Self {
        self.optimizer = Some(state);
        self
    }

    pub fn with_epoch(mut self, epoch: Epoch) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn with_best_prec1(mut self, best_prec1: f64) -> Self {
        self.best_prec1 = Some(best_prec1);
        self
    }

    /// Training metadata carried by this checkpoint
    pub fn meta(&self) -> TrainingMeta {
        TrainingMeta {
            epoch: self.epoch,
            best_prec1: self.best_prec1,
        }
    }

    /// Drop every ignored parameter. Fails on the first name that is not
    /// present in the state dict.
    pub fn remove_ignored<S: AsRef<str>>(&mut self, ignores: &[S]) -> Result<()> {
        for ignore in ignores {
            let key = ignore.as_ref();
            if self.state_dict.remove(key).is_none() {
                return Err(Error::KeyNotFound {
                    key: key.to_string(),
                });
            }
            info!(key = %key, "Ignoring parameter");
        }
        Ok(())
    }

    /// Total number of scalar weights
    pub fn num_elements(&self) -> usize {
        self.state_dict.values().map(Tensor::numel).sum()
    }
}

/// Epoch and best score recorded in a checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMeta {
    pub epoch: Option<Epoch>,
    pub best_prec1: Option<f64>,
}

/// Optimizer internal state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    /// Number of optimizer steps taken
    pub step: u64,

    /// Scalar hyperparameters (learning rate, momentum, ...)
    pub hyper: BTreeMap<String, f64>,

    /// Per-parameter buffers (moments, velocities)
    pub buffers: StateDict,
}

/// Model whose parameters can be snapshotted and restored by name
pub trait Module {
    /// Parameter names with their shapes
    fn named_parameters(&self) -> Vec<(String, Vec<usize>)>;

    /// Copy of every parameter
    fn state_dict(&self) -> StateDict;

    /// Replace one parameter in place
    fn set_parameter(&mut self, name: &str, value: Tensor) -> Result<()>;
}

/// Optimizer whose internal state can be persisted
pub trait Optimizer {
    fn state(&self) -> OptimizerState;

    fn load_state(&mut self, state: OptimizerState) -> Result<()>;
}

/// Plain named-parameter container implementing [`Module`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterStore {
    params: StateDict,
}

impl ParameterStore {
    pub fn new(params: StateDict) -> Self {
        Self { params }
    }

    /// Register a parameter, replacing any previous value
    pub fn insert(&mut self, name: impl Into<String>, value: Tensor) {
        self.params.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.params.get(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl Module for ParameterStore {
    fn named_parameters(&self) -> Vec<(String, Vec<usize>)> {
        self.params
            .iter()
            .map(|(name, t)| (name.clone(), t.shape().to_vec()))
            .collect()
    }

    fn state_dict(&self) -> StateDict {
        self.params.clone()
    }

    fn set_parameter(&mut self, name: &str, value: Tensor) -> Result<()> {
        let slot = self.params.get_mut(name).ok_or_else(|| Error::KeyNotFound {
            key: name.to_string(),
        })?;
        if slot.shape() != value.shape() {
            return Err(Error::ShapeMismatch {
                name: name.to_string(),
                checkpoint: value.shape().to_vec(),
                model: slot.shape().to_vec(),
            });
        }
        *slot = value;
        Ok(())
    }
}
