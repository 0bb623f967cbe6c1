use anyhow::Result;
use checkpoint::{
    inspect_checkpoint, load_checkpoint, save_checkpoint, simplify_checkpoint, Checkpoint,
    CheckpointKind, LoadMode, Module, ParameterStore, BEST_CHECKPOINT_NAME,
};
use features::{read_features, write_features, Features, InstanceCount};
use ndarray::{array, Array1, Array2};
use runtime_core::{Error, StateDict, Tensor, ToolkitConfig};
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn backbone_with_head(classes: usize) -> ParameterStore {
    let mut model = ParameterStore::default();
    model.insert("conv1.weight", Tensor::full(vec![8, 3], 0.1));
    model.insert("conv1.bias", Tensor::zeros(vec![8]));
    model.insert("fc.weight", Tensor::full(vec![classes, 8], 0.2));
    model.insert("fc.bias", Tensor::zeros(vec![classes]));
    model
}

#[test]
fn test_checkpoint_lifecycle() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let prefix = dir.path().join("runs").join("resnet");

    let model = backbone_with_head(10);
    let first = save_checkpoint(
        &Checkpoint::from_module(&model).with_epoch(1).with_best_prec1(40.0),
        &prefix,
        1,
        true,
    )?;
    let second = save_checkpoint(
        &Checkpoint::from_module(&model).with_epoch(2).with_best_prec1(40.0),
        &prefix,
        2,
        false,
    )?;

    assert!(first.ends_with("resnet_epoch_1.ckpt"));
    assert!(second.ends_with("resnet_epoch_2.ckpt"));

    // Epoch 2 was not best, so the link still resolves to epoch 1
    let best = dir.path().join("runs").join(BEST_CHECKPOINT_NAME);
    let summary = inspect_checkpoint(&best)?;
    assert_eq!(summary.meta.epoch, Some(1));
    assert_eq!(summary.kind, CheckpointKind::Full);
    assert_eq!(summary.num_parameters, 4);

    let mut restored = backbone_with_head(10);
    restored.insert("conv1.weight", Tensor::zeros(vec![8, 3]));
    let outcome = load_checkpoint(&best, &mut restored, LoadMode::Weights, true)?;
    assert_eq!(outcome.meta.best_prec1, Some(40.0));
    assert_eq!(restored, model);

    // Simplifying drops the training metadata
    let weights = simplify_checkpoint(&best, None, &[] as &[&str])?;
    assert_eq!(inspect_checkpoint(&weights)?.kind, CheckpointKind::WeightsOnly);

    Ok(())
}

#[test]
fn test_finetune_with_new_head() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let pretrained = backbone_with_head(1000);
    let path = save_checkpoint(
        &Checkpoint::from_module(&pretrained).with_epoch(90),
        dir.path().join("imagenet"),
        90,
        false,
    )?;

    // A 10-class head cannot take the 1000-class weights
    let mut model = backbone_with_head(10);
    let err = load_checkpoint(&path, &mut model, LoadMode::Weights, false).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));

    let outcome = load_checkpoint(
        &path,
        &mut model,
        LoadMode::filtered(["fc.weight", "fc.bias"]),
        false,
    )?;
    assert_eq!(outcome.missing, vec!["fc.bias", "fc.weight"]);
    assert!(outcome.unexpected.is_empty());
    assert_eq!(outcome.meta.epoch, Some(90));
    assert_eq!(model.get("fc.weight").unwrap().shape(), &[10, 8]);
    assert_eq!(model.get("conv1.weight").unwrap().data()[0], 0.1);

    // Strict mode refuses the same partial state dict
    let simplified = simplify_checkpoint(&path, None, &["fc.weight", "fc.bias"])?;
    let err = load_checkpoint(&simplified, &mut model, LoadMode::Weights, true).unwrap_err();
    assert!(matches!(err, Error::StateDictMismatch { .. }));

    Ok(())
}

#[test]
fn test_simplify_drops_training_state() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let model = backbone_with_head(4);
    let path = save_checkpoint(
        &Checkpoint::from_module(&model)
            .with_epoch(12)
            .with_best_prec1(77.5)
            .with_optimizer(Default::default()),
        dir.path().join("ckpt"),
        12,
        false,
    )?;
    assert_eq!(inspect_checkpoint(&path)?.kind, CheckpointKind::Full);

    let output = dir.path().join("deploy").join("weights.ckpt");
    let written = simplify_checkpoint(&path, Some(output.as_path()), &["conv1.bias"])?;
    assert_eq!(written, output);

    let summary = inspect_checkpoint(&output)?;
    assert_eq!(summary.kind, CheckpointKind::WeightsOnly);
    assert_eq!(summary.num_parameters, 3);
    assert!(!summary.has_optimizer);
    assert_eq!(summary.meta.epoch, None);

    let err = simplify_checkpoint(&path, None, &["nonexistent"]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot find nonexistent in checkpoint state_dict"
    );
    Ok(())
}

#[test]
fn test_corrupted_checkpoint() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("broken.ckpt");
    std::fs::write(&path, b"TKCK\x01")?;

    let err = inspect_checkpoint(&path).unwrap_err();
    assert!(err.is_corruption());

    let mut model = ParameterStore::new(StateDict::new());
    let err = load_checkpoint(
        dir.path().join("absent.ckpt"),
        &mut model,
        LoadMode::Weights,
        true,
    )
    .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[test]
fn test_feature_files() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("embeddings").join("lfw.bin");
    runtime_core::fs::ensure_parent(&path)?;

    let embeddings: Array2<f32> = Array2::from_shape_fn((6, 4), |(i, j)| (i * 4 + j) as f32);
    let bytes = write_features(&path, &embeddings)?;
    assert_eq!(bytes, 6 * 4 * 4);

    let all = read_features::<f32, _>(&path, InstanceCount::All, 4)?;
    assert_eq!(all, Features::Matrix(embeddings.clone()));

    let head = read_features::<f32, _>(&path, InstanceCount::Exact(2), 4)?;
    assert_eq!(head.shape(), (2, 4));
    assert_eq!(head.into_matrix().row(1).to_vec(), vec![4.0, 5.0, 6.0, 7.0]);

    // The same bytes viewed as one long column
    let flat = read_features::<f32, _>(&path, InstanceCount::All, 1)?;
    assert_eq!(flat, Features::Vector(Array1::from_iter((0..24).map(|v| v as f32))));

    let err = read_features::<f32, _>(&path, InstanceCount::Exact(7), 4).unwrap_err();
    assert!(matches!(err, Error::InvalidFeatureFile { .. }));

    let unit = train_metrics::normalize(&embeddings, 1)?;
    for row in unit.rows() {
        let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(row.iter().all(|v| *v == 0.0) || (norm - 1.0).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn test_f64_features() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("scores.bin");
    write_features(&path, &array![0.25f64, -1.5, 3.0])?;

    let scores = read_features::<f64, _>(&path, InstanceCount::All, 1)?;
    assert_eq!(scores, Features::Vector(array![0.25, -1.5, 3.0]));
    Ok(())
}

#[test]
fn test_config_drives_store_layout() -> Result<()> {
    let dir = tempdir()?;
    let config_path = dir.path().join("trainkit.json");
    let ckpt_dir = dir.path().join("ckpts");
    std::fs::write(
        &config_path,
        format!(
            r#"{{"checkpoint": {{"dir": {:?}, "basename": "vit", "strict": false}}}}"#,
            ckpt_dir.display().to_string()
        ),
    )?;

    let config = ToolkitConfig::from_json_file(&config_path)?;
    assert_eq!(config.checkpoint.prefix(), ckpt_dir.join("vit"));
    assert!(!config.checkpoint.strict);
    assert_eq!(config.process_group.master_port, 29500);

    let store = checkpoint::CheckpointStore::new(config.checkpoint)?;
    assert!(ckpt_dir.is_dir());

    let model = backbone_with_head(3);
    let path = store.save(&Checkpoint::from_module(&model), 5, true)?;
    assert_eq!(path, store.versioned_path(5));
    assert_eq!(store.best_target(), Some(path));

    // Lenient store tolerates an extra model parameter
    let mut bigger = backbone_with_head(3);
    bigger.insert("aux.weight", Tensor::zeros(vec![2]));
    let outcome = store.load_best(&mut bigger, LoadMode::Weights)?;
    assert_eq!(outcome.missing, vec!["aux.weight"]);
    assert_eq!(bigger.named_parameters().len(), 5);
    Ok(())
}
