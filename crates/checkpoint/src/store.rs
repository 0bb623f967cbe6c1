//! Checkpoint store: versioned save, best-link tracking, load and simplify

use chrono::{DateTime, Utc};
use runtime_core::config::CheckpointConfig;
use runtime_core::fs::{ensure_dirs, ensure_parent};
use runtime_core::{Epoch, Error, Result, StateDict};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::format::{self, CheckpointKind, CHECKPOINT_EXTENSION};
use crate::state::{Checkpoint, Module, Optimizer, TrainingMeta};

/// Name of the link that tracks the best checkpoint
pub const BEST_CHECKPOINT_NAME: &str = "model_best.ckpt";

/// `{basename}_epoch_{epoch}.ckpt`
pub fn versioned_filename(basename: &str, epoch: Epoch) -> String {
    format!("{}_epoch_{}.{}", basename, epoch, CHECKPOINT_EXTENSION)
}

/// What to restore besides the weights.
///
/// Dropping parameters and restoring optimizer state are exclusive: an
/// optimizer state refers to the full parameter set.
pub enum LoadMode<'a> {
    /// Weights only
    Weights,

    /// Weights minus the named parameters
    Filtered { ignores: Vec<String> },

    /// Weights plus optimizer state
    FullRestore { optimizer: &'a mut dyn Optimizer },
}

impl<'a> LoadMode<'a> {
    /// Weights minus the given parameter names
    pub fn filtered<I, S>(ignores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LoadMode::Filtered {
            ignores: ignores.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Debug for LoadMode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Weights => write!(f, "Weights"),
            LoadMode::Filtered { ignores } => {
                f.debug_struct("Filtered").field("ignores", ignores).finish()
            }
            LoadMode::FullRestore { .. } => write!(f, "FullRestore"),
        }
    }
}

/// Result of loading a checkpoint into a model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOutcome {
    /// Epoch and best score stored in the checkpoint
    pub meta: TrainingMeta,

    /// Model parameters absent from the checkpoint (lenient mode only)
    pub missing: Vec<String>,

    /// Checkpoint entries the model has no slot for (lenient mode only)
    pub unexpected: Vec<String>,
}

/// Save `state` as `<folder>/<basename>_epoch_<epoch>.ckpt` where
/// `target` is the prefix `<folder>/<basename>`.
///
/// When `is_best` is set, `model_best.ckpt` in the same folder is re-pointed
/// at the new file. Earlier versioned files are never touched.
#[instrument(skip_all, fields(prefix = %target.as_ref().display(), epoch = epoch, is_best = is_best))]
pub fn save_checkpoint<P: AsRef<Path>>(
    state: &Checkpoint,
    target: P,
    epoch: Epoch,
    is_best: bool,
) -> Result<PathBuf> {
    let target = target.as_ref();
    let basename = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidArgument {
            message: format!("checkpoint target has no basename: {}", target.display()),
        })?;
    let folder = target.parent().unwrap_or_else(|| Path::new(""));
    ensure_dirs(folder, &[""])?;

    let filename = versioned_filename(&basename, epoch);
    let path = folder.join(&filename);
    info!(path = %path.display(), epoch, "Saving checkpoint");

    let size_bytes = format::write_file(&path, state)?;

    if is_best {
        link_best(folder, &filename)?;
    }

    info!(
        path = %path.display(),
        size_bytes,
        is_best,
        "Checkpoint saved"
    );
    Ok(path)
}

/// Point `folder/model_best.ckpt` at `filename`.
///
/// The new link is created under a unique temporary name and renamed over
/// the old one, so readers see either the previous link or the new one.
fn link_best(folder: &Path, filename: &str) -> Result<()> {
    let best = folder.join(BEST_CHECKPOINT_NAME);
    let temp = folder.join(format!(".{}.{}.tmp", BEST_CHECKPOINT_NAME, Uuid::new_v4()));

    symlink(Path::new(filename), &temp).map_err(|e| Error::Storage {
        message: format!("Failed to create link {}: {}", temp.display(), e),
    })?;

    if let Err(e) = std::fs::rename(&temp, &best) {
        let _ = std::fs::remove_file(&temp);
        return Err(Error::Storage {
            message: format!("Failed to replace {}: {}", best.display(), e),
        });
    }

    debug!(link = %best.display(), file = %filename, "Best checkpoint link updated");
    Ok(())
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

/// Load a checkpoint into `model`.
///
/// In strict mode the model's parameter names and the checkpoint's keys
/// must match exactly. In lenient mode mismatched names are logged and
/// skipped. Shapes must agree for every name present on both sides.
#[instrument(skip_all, fields(path = %path.as_ref().display(), strict = strict))]
pub fn load_checkpoint<P, M>(
    path: P,
    model: &mut M,
    mode: LoadMode<'_>,
    strict: bool,
) -> Result<LoadOutcome>
where
    P: AsRef<Path>,
    M: Module + ?Sized,
{
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::CheckpointNotFound {
            path: path.display().to_string(),
        });
    }

    info!(path = %path.display(), ?mode, "Loading checkpoint");
    let (_, mut checkpoint) = format::read_file(path)?;
    let meta = checkpoint.meta();

    let optimizer = match mode {
        LoadMode::Weights => None,
        LoadMode::Filtered { ignores } => {
            checkpoint.remove_ignored(&ignores)?;
            None
        }
        LoadMode::FullRestore { optimizer } => {
            let state = checkpoint.optimizer.take().ok_or_else(|| Error::MissingField {
                field: "optimizer".to_string(),
            })?;
            Some((optimizer, state))
        }
    };

    let (missing, unexpected) = apply_state_dict(model, checkpoint.state_dict, strict)?;

    if let Some((optimizer, state)) = optimizer {
        optimizer.load_state(state)?;
        info!(
            path = %path.display(),
            epoch = ?meta.epoch,
            best_prec1 = ?meta.best_prec1,
            "Restored optimizer state"
        );
    }

    Ok(LoadOutcome {
        meta,
        missing,
        unexpected,
    })
}

/// Copy matching tensors into the model. Nothing is written when a
/// strict-mode or shape check fails.
fn apply_state_dict<M: Module + ?Sized>(
    model: &mut M,
    state_dict: StateDict,
    strict: bool,
) -> Result<(Vec<String>, Vec<String>)> {
    let model_params: BTreeMap<String, Vec<usize>> =
        model.named_parameters().into_iter().collect();

    let missing: Vec<String> = model_params
        .keys()
        .filter(|name| !state_dict.contains_key(*name))
        .cloned()
        .collect();
    let unexpected: Vec<String> = state_dict
        .keys()
        .filter(|name| !model_params.contains_key(*name))
        .cloned()
        .collect();

    if strict && (!missing.is_empty() || !unexpected.is_empty()) {
        return Err(Error::StateDictMismatch {
            missing,
            unexpected,
        });
    }

    for (name, tensor) in &state_dict {
        if let Some(shape) = model_params.get(name) {
            if shape.as_slice() != tensor.shape() {
                return Err(Error::ShapeMismatch {
                    name: name.clone(),
                    checkpoint: tensor.shape().to_vec(),
                    model: shape.clone(),
                });
            }
        }
    }

    for (name, tensor) in state_dict {
        if model_params.contains_key(&name) {
            model.set_parameter(&name, tensor)?;
        }
    }

    for name in &missing {
        warn!(parameter = %name, "Parameter not loaded");
    }
    for name in &unexpected {
        warn!(parameter = %name, "Skipping unexpected checkpoint entry");
    }

    Ok((missing, unexpected))
}

/// Strip a checkpoint down to its state dict, minus `ignores`, and write it
/// to `output` (default: `<path>_simplified`). Returns the output path.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn simplify_checkpoint<P, S>(path: P, output: Option<&Path>, ignores: &[S]) -> Result<PathBuf>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::CheckpointNotFound {
            path: path.display().to_string(),
        });
    }

    info!(path = %path.display(), "Loading checkpoint");
    let (_, checkpoint) = format::read_file(path)?;
    let mut simplified = Checkpoint::new(checkpoint.state_dict);

    if let Err(e) = simplified.remove_ignored(ignores) {
        for (name, tensor) in &simplified.state_dict {
            debug!(parameter = %name, shape = ?tensor.shape(), "Available parameter");
        }
        return Err(e);
    }

    let output = match output {
        Some(output) => output.to_path_buf(),
        None => {
            let mut raw = path.as_os_str().to_owned();
            raw.push("_simplified");
            PathBuf::from(raw)
        }
    };

    ensure_parent(&output)?;
    info!(output = %output.display(), "Saving simplified checkpoint");
    format::write_file(&output, &simplified)?;
    Ok(output)
}

/// Summary of a checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointSummary {
    pub path: PathBuf,
    pub kind: CheckpointKind,
    pub version: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    pub num_parameters: usize,
    pub num_elements: usize,
    pub meta: TrainingMeta,
    pub has_optimizer: bool,
}

impl fmt::Display for CheckpointSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "path:        {}", self.path.display())?;
        writeln!(f, "kind:        {:?} (v{})", self.kind, self.version)?;
        if let Some(created_at) = self.created_at {
            writeln!(f, "created:     {}", created_at.to_rfc3339())?;
        }
        writeln!(f, "size:        {} bytes", self.size_bytes)?;
        writeln!(f, "parameters:  {}", self.num_parameters)?;
        writeln!(f, "elements:    {}", self.num_elements)?;
        if let Some(epoch) = self.meta.epoch {
            writeln!(f, "epoch:       {}", epoch)?;
        }
        if let Some(best) = self.meta.best_prec1 {
            writeln!(f, "best_prec1:  {:.3}", best)?;
        }
        write!(f, "optimizer:   {}", if self.has_optimizer { "yes" } else { "no" })
    }
}

/// Read a checkpoint file and summarize it
pub fn inspect_checkpoint<P: AsRef<Path>>(path: P) -> Result<CheckpointSummary> {
    let path = path.as_ref();
    let (header, checkpoint) = format::read_file(path)?;
    let size_bytes = std::fs::metadata(path)?.len();

    Ok(CheckpointSummary {
        path: path.to_path_buf(),
        kind: header.kind,
        version: header.version,
        created_at: header.created_at,
        size_bytes,
        num_parameters: checkpoint.state_dict.len(),
        num_elements: checkpoint.num_elements(),
        meta: checkpoint.meta(),
        has_optimizer: checkpoint.optimizer.is_some(),
    })
}

/// Checkpoint directory bound to one run's basename
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    config: CheckpointConfig,
}

impl CheckpointStore {
    /// Create the store, making its directory if needed
    pub fn new(config: CheckpointConfig) -> Result<Self> {
        if config.basename.is_empty() {
            return Err(Error::InvalidConfig {
                message: "checkpoint basename must not be empty".to_string(),
            });
        }
        ensure_dirs(&config.dir, &[""])?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Path of the checkpoint for `epoch`
    pub fn versioned_path(&self, epoch: Epoch) -> PathBuf {
        self.config
            .dir
            .join(versioned_filename(&self.config.basename, epoch))
    }

    /// Path of the best-checkpoint link
    pub fn best_path(&self) -> PathBuf {
        self.config.dir.join(BEST_CHECKPOINT_NAME)
    }

    /// Resolved target of the best link, if any
    pub fn best_target(&self) -> Option<PathBuf> {
        std::fs::read_link(self.best_path())
            .ok()
            .map(|target| self.config.dir.join(target))
    }

    pub fn save(&self, state: &Checkpoint, epoch: Epoch, is_best: bool) -> Result<PathBuf> {
        save_checkpoint(state, self.config.prefix(), epoch, is_best)
    }

    /// Load with the store's strictness setting
    pub fn load<P, M>(&self, path: P, model: &mut M, mode: LoadMode<'_>) -> Result<LoadOutcome>
    where
        P: AsRef<Path>,
        M: Module + ?Sized,
    {
        load_checkpoint(path, model, mode, self.config.strict)
    }

    pub fn load_best<M: Module + ?Sized>(
        &self,
        model: &mut M,
        mode: LoadMode<'_>,
    ) -> Result<LoadOutcome> {
        self.load(self.best_path(), model, mode)
    }
}
