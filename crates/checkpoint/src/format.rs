//! On-disk checkpoint codec
//!
//! A checkpoint file is a fixed little-endian header followed by the
//! bincode-encoded [`Checkpoint`]:
//!
//! ```text
//! magic        4 bytes  "TKCK"
//! version      u32
//! kind         u8
//! created_at   i64      unix millis
//! payload_len  u64
//! payload      payload_len bytes
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use runtime_core::{Error, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::state::Checkpoint;

/// Magic bytes for checkpoint files
pub const CHECKPOINT_MAGIC: [u8; 4] = *b"TKCK";

/// Checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// File extension for checkpoint files
pub const CHECKPOINT_EXTENSION: &str = "ckpt";

/// Size of the fixed header in bytes
pub const HEADER_LEN: usize = 4 + 4 + 1 + 8 + 8;

/// What a checkpoint file carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CheckpointKind {
    /// Weights plus optimizer state and/or training metadata
    Full = 0,

    /// Weights only
    WeightsOnly = 1,
}

impl CheckpointKind {
    /// Kind implied by the contents of a checkpoint
    pub fn of(checkpoint: &Checkpoint) -> Self {
        if checkpoint.optimizer.is_some()
            || checkpoint.epoch.is_some()
            || checkpoint.best_prec1.is_some()
        {
            CheckpointKind::Full
        } else {
            CheckpointKind::WeightsOnly
        }
    }

    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(CheckpointKind::Full),
            1 => Some(CheckpointKind::WeightsOnly),
            _ => None,
        }
    }
}

/// Checkpoint file header
#[derive(Debug, Clone)]
pub struct CheckpointHeader {
    pub version: u32,
    pub kind: CheckpointKind,
    pub created_at: Option<DateTime<Utc>>,
    pub payload_len: u64,
}

/// Encode a checkpoint into header + payload
pub fn encode(checkpoint: &Checkpoint) -> Result<Bytes> {
    let payload = bincode::serialize(checkpoint)?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(&CHECKPOINT_MAGIC);
    buf.put_u32_le(CHECKPOINT_VERSION);
    buf.put_u8(CheckpointKind::of(checkpoint) as u8);
    buf.put_i64_le(Utc::now().timestamp_millis());
    buf.put_u64_le(payload.len() as u64);
    buf.put_slice(&payload);

    Ok(buf.freeze())
}

/// Parse the fixed header, leaving `data` positioned at the payload
fn decode_header(path: &Path, data: &mut &[u8]) -> Result<CheckpointHeader> {
    let corrupted = |reason: String| Error::CheckpointCorrupted {
        path: path.display().to_string(),
        reason,
    };

    if data.len() < HEADER_LEN {
        return Err(corrupted(format!(
            "file is {} bytes, shorter than the {} byte header",
            data.len(),
            HEADER_LEN
        )));
    }

    let mut magic = [0u8; 4];
    data.copy_to_slice(&mut magic);
    if magic != CHECKPOINT_MAGIC {
        return Err(corrupted("invalid checkpoint magic".to_string()));
    }

    let version = data.get_u32_le();
    if version != CHECKPOINT_VERSION {
        warn!(
            path = %path.display(),
            "Checkpoint version mismatch: expected {}, got {}", CHECKPOINT_VERSION, version
        );
    }

    let raw_kind = data.get_u8();
    let kind = CheckpointKind::from_u8(raw_kind)
        .ok_or_else(|| corrupted(format!("unknown checkpoint kind {}", raw_kind)))?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(data.get_i64_le());
    let payload_len = data.get_u64_le();

    if (data.remaining() as u64) < payload_len {
        return Err(corrupted(format!(
            "payload truncated: expected {} bytes, found {}",
            payload_len,
            data.remaining()
        )));
    }

    Ok(CheckpointHeader {
        version,
        kind,
        created_at,
        payload_len,
    })
}

/// Decode a full checkpoint file image
pub fn decode(path: &Path, mut data: &[u8]) -> Result<(CheckpointHeader, Checkpoint)> {
    let header = decode_header(path, &mut data)?;
    let payload = &data[..header.payload_len as usize];
    let checkpoint =
        bincode::deserialize(payload).map_err(|e| Error::CheckpointCorrupted {
            path: path.display().to_string(),
            reason: format!("payload decode failed: {}", e),
        })?;
    Ok((header, checkpoint))
}

/// Read and decode a checkpoint file
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_file(path: &Path) -> Result<(CheckpointHeader, Checkpoint)> {
    let data = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::CheckpointNotFound {
            path: path.display().to_string(),
        },
        _ => Error::Io(e),
    })?;
    debug!(size_bytes = data.len(), "Read checkpoint file");
    decode(path, &data)
}

/// Sibling temp path used for atomic writes
fn temp_path(path: &Path) -> PathBuf {
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        Uuid::new_v4()
    );
    path.with_file_name(temp_name)
}

/// Write a checkpoint atomically (temp file, fsync, rename). Returns the
/// number of bytes written. The parent directory must exist.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_file(path: &Path, checkpoint: &Checkpoint) -> Result<u64> {
    let start = std::time::Instant::now();
    let data = encode(checkpoint)?;
    let temp_path = temp_path(path);

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(Error::Storage {
            message: format!("Failed to write checkpoint {}: {}", path.display(), e),
        });
    }

    let size = data.len() as u64;
    debug!(
        size_bytes = size,
        elapsed_ms = start.elapsed().as_millis(),
        "Checkpoint file written"
    );
    Ok(size)
}
