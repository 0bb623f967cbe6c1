//! Filesystem helpers

use crate::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Create `path/<subdir>` for every subdir. An empty subdir stands for
/// `path` itself and an empty `path` is a no-op.
pub fn ensure_dirs<P: AsRef<Path>>(path: P, subdirs: &[&str]) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Ok(());
    }

    for sd in subdirs {
        let dir = if sd.is_empty() {
            path.to_path_buf()
        } else {
            path.join(sd)
        };
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| Error::Storage {
                message: format!("Failed to create directory {:?}: {}", dir, e),
            })?;
            debug!(dir = %dir.display(), "Created directory");
        }
    }
    Ok(())
}

/// Create the parent directory of `path` when it has a non-empty one
pub fn ensure_parent<P: AsRef<Path>>(path: P) -> Result<()> {
    match path.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dirs(parent, &[""]),
        _ => Ok(()),
    }
}
