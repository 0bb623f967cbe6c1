//! End-to-end training simulation test
//!
//! Drives a toy classifier through several epochs the way a training script
//! would: process-group bootstrap, per-batch meters and top-k accuracy,
//! versioned checkpoints with best tracking, then a resume that restores
//! weights and optimizer state from the best link.

use anyhow::Result;
use checkpoint::{
    Checkpoint, CheckpointStore, LoadMode, Module, Optimizer, OptimizerState, ParameterStore,
};
use ndarray::{Array1, Array2};
use runtime_core::config::CheckpointConfig;
use runtime_core::{ProcessGroup, ProcessGroupConfig, Tensor};
use std::collections::BTreeMap;
use tempfile::tempdir;
use train_metrics::{accuracy, AverageMeter};

const CLASSES: usize = 5;
const BATCH: usize = 8;

/// Minimal momentum-SGD stand-in with a step counter
#[derive(Default)]
struct Sgd {
    lr: f64,
    step: u64,
}

impl Optimizer for Sgd {
    fn state(&self) -> OptimizerState {
        let mut hyper = BTreeMap::new();
        hyper.insert("lr".to_string(), self.lr);
        OptimizerState {
            step: self.step,
            hyper,
            ..Default::default()
        }
    }

    fn load_state(&mut self, state: OptimizerState) -> runtime_core::Result<()> {
        self.step = state.step;
        self.lr = state.hyper.get("lr").copied().unwrap_or(self.lr);
        Ok(())
    }
}

/// Scores whose quality improves with `epoch`: the target class gets a
/// bonus that grows each epoch, so accuracy climbs monotonically.
fn fake_batch(epoch: u64, batch: usize) -> (Array2<f32>, Array1<usize>) {
    let target = Array1::from_shape_fn(BATCH, |i| (i + batch) % CLASSES);
    let output = Array2::from_shape_fn((BATCH, CLASSES), |(i, c)| {
        let noise = ((i * 7 + c * 3 + batch) % 11) as f32 / 10.0;
        if c == target[i] {
            noise + epoch as f32 * 0.3
        } else {
            noise
        }
    });
    (output, target)
}

fn model() -> ParameterStore {
    let mut model = ParameterStore::default();
    model.insert("encoder.weight", Tensor::zeros(vec![16, 4]));
    model.insert("classifier.weight", Tensor::zeros(vec![CLASSES, 16]));
    model.insert("classifier.bias", Tensor::zeros(vec![CLASSES]));
    model
}

#[test]
fn test_training_run_and_resume() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let group = ProcessGroup::init(ProcessGroupConfig {
        rank: 0,
        world_size: 1,
        backend: runtime_core::Backend::Gloo,
        ..Default::default()
    })?;
    assert!(group.is_primary());
    assert_eq!(group.local_device(), 0);

    let dir = tempdir()?;
    let store = CheckpointStore::new(CheckpointConfig {
        dir: dir.path().join("checkpoints"),
        basename: "toy".to_string(),
        strict: true,
    })?;

    let mut net = model();
    let mut optimizer = Sgd {
        lr: 0.1,
        step: 0,
    };
    let mut top1 = AverageMeter::new(4);
    let mut top3 = AverageMeter::new(4);
    let mut best_prec1 = 0.0;
    let mut best_epoch = 0;

    for epoch in 0..5u64 {
        top1.reset();
        top3.reset();
        for batch in 0..4 {
            let (output, target) = fake_batch(epoch, batch);
            let res = accuracy(&output, &target, &[1, 3])?;
            top1.update(res[0]);
            top3.update(res[1]);
            optimizer.step += 1;
            assert!(res[1] >= res[0]);
        }

        // Every parameter drifts a little each epoch
        let drifted: Vec<_> = net
            .named_parameters()
            .into_iter()
            .map(|(name, shape)| (name, Tensor::full(shape, epoch as f32)))
            .collect();
        for (name, tensor) in drifted {
            net.set_parameter(&name, tensor)?;
        }

        tracing::info!(
            epoch,
            top1 = top1.avg(),
            top3 = top3.avg(),
            step = optimizer.step,
            "Epoch finished"
        );

        let is_best = top1.avg() > best_prec1;
        if is_best {
            best_prec1 = top1.avg();
            best_epoch = epoch;
        }

        if group.is_primary() {
            let state = Checkpoint::from_module(&net)
                .with_epoch(epoch)
                .with_best_prec1(best_prec1)
                .with_optimizer(optimizer.state());
            store.save(&state, epoch, is_best)?;
        }
    }

    assert!(best_prec1 > 50.0);
    for epoch in 0..5 {
        assert!(store.versioned_path(epoch).is_file());
    }
    assert_eq!(store.best_target(), Some(store.versioned_path(best_epoch)));

    // Resume from the best checkpoint into a fresh model and optimizer
    let mut resumed = model();
    let mut resumed_opt = Sgd::default();
    let outcome = store.load_best(
        &mut resumed,
        LoadMode::FullRestore {
            optimizer: &mut resumed_opt,
        },
    )?;

    assert_eq!(outcome.meta.epoch, Some(best_epoch));
    assert_eq!(outcome.meta.best_prec1, Some(best_prec1));
    assert_eq!(resumed_opt.lr, 0.1);
    assert_eq!(resumed_opt.step, (best_epoch + 1) * 4);
    assert_eq!(
        resumed.get("encoder.weight").unwrap().data()[0],
        best_epoch as f32
    );

    // The group is process-wide
    let again = ProcessGroup::init(ProcessGroupConfig::default());
    assert!(again.is_err());

    Ok(())
}

#[test]
fn test_meter_tracks_recent_batches() -> Result<()> {
    let mut meter = AverageMeter::new(2);
    for batch in 0..3 {
        let (output, target) = fake_batch(10, batch);
        meter.update(accuracy(&output, &target, &[1])?[0]);
    }
    assert_eq!(meter.count(), 2);
    assert_eq!(meter.avg(), 100.0);
    Ok(())
}
