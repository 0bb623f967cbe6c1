//! Toolkit configuration types

use crate::{Dtype, Error, ProcessGroupConfig, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main toolkit configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    /// Process group settings
    pub process_group: ProcessGroupConfig,

    /// Checkpoint settings
    pub checkpoint: CheckpointConfig,

    /// Feature file settings
    pub features: FeatureConfig,
}

impl ToolkitConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

/// Checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Directory that holds versioned checkpoints and the best link
    pub dir: PathBuf,

    /// Filename prefix for versioned checkpoints
    pub basename: String,

    /// Require an exact parameter-name match on load
    pub strict: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./checkpoints"),
            basename: "checkpoint".to_string(),
            strict: true,
        }
    }
}

impl CheckpointConfig {
    /// Path prefix `<dir>/<basename>` handed to the save routine
    pub fn prefix(&self) -> PathBuf {
        self.dir.join(&self.basename)
    }
}

/// Feature file configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Element type of raw feature files
    pub dtype: Dtype,

    /// Log shapes of every feature file read
    pub verbose: bool,
}

/// Duration serialization helper for human-readable formats
pub(crate) mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
