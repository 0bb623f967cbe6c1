//! Process-group bootstrap
//!
//! Resolves rank, world size and the local device for one worker process.
//! The collective-communication backend is driven by the caller; this module
//! only validates the wiring and hands back an explicit handle instead of
//! mutating process-wide environment state.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Collective-communication backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// NVIDIA collective library
    #[default]
    Nccl,

    /// CPU backend
    Gloo,

    /// Message-passing interface
    Mpi,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Nccl => write!(f, "nccl"),
            Backend::Gloo => write!(f, "gloo"),
            Backend::Mpi => write!(f, "mpi"),
        }
    }
}

/// Process group configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessGroupConfig {
    /// Rendezvous host of rank 0
    pub master_addr: String,

    /// Rendezvous port of rank 0
    pub master_port: u16,

    /// Rank of this process
    pub rank: u32,

    /// Total number of processes
    pub world_size: u32,

    /// GPUs available on each node
    pub gpus_per_node: u32,

    /// Communication backend
    pub backend: Backend,

    /// Rendezvous timeout
    #[serde(with = "crate::config::humantime_serde")]
    pub init_timeout: Duration,
}

impl Default for ProcessGroupConfig {
    fn default() -> Self {
        Self {
            master_addr: "127.0.0.1".to_string(),
            master_port: 29500,
            rank: 0,
            world_size: 1,
            gpus_per_node: 1,
            backend: Backend::default(),
            init_timeout: Duration::from_secs(1800),
        }
    }
}

impl ProcessGroupConfig {
    /// Build a config from the launcher variables `MASTER_ADDR`,
    /// `MASTER_PORT`, `RANK` and `WORLD_SIZE`. The environment is only read.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(addr) = lookup("MASTER_ADDR") {
            config.master_addr = addr;
        }
        if let Some(port) = lookup("MASTER_PORT") {
            config.master_port = parse_var("MASTER_PORT", &port)?;
        }
        if let Some(rank) = lookup("RANK") {
            config.rank = parse_var("RANK", &rank)?;
        }
        if let Some(world_size) = lookup("WORLD_SIZE") {
            config.world_size = parse_var("WORLD_SIZE", &world_size)?;
        }
        Ok(config)
    }

    /// Check the wiring before any backend is touched
    pub fn validate(&self) -> Result<()> {
        if self.master_addr.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "master_addr must not be empty".to_string(),
            });
        }
        if self.world_size == 0 {
            return Err(Error::InvalidConfig {
                message: "world_size must be positive".to_string(),
            });
        }
        if self.rank >= self.world_size {
            return Err(Error::InvalidConfig {
                message: format!(
                    "rank {} out of range for world_size {}",
                    self.rank, self.world_size
                ),
            });
        }
        if self.gpus_per_node == 0 {
            return Err(Error::InvalidConfig {
                message: "gpus_per_node must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// `host:port` of the rendezvous endpoint
    pub fn master_endpoint(&self) -> String {
        format!("{}:{}", self.master_addr, self.master_port)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| Error::InvalidConfig {
        message: format!("{} is not a valid number: {:?}", name, raw),
    })
}

/// Handle to an initialized process group
#[derive(Debug, Clone)]
pub struct ProcessGroup {
    rank: u32,
    world_size: u32,
    local_device: u32,
    backend: Backend,
    master_endpoint: String,
}

impl ProcessGroup {
    /// Initialize the process group for this process.
    ///
    /// May be called at most once per process; later calls fail with
    /// [`Error::AlreadyInitialized`].
    pub fn init(config: ProcessGroupConfig) -> Result<Self> {
        config.validate()?;

        if INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyInitialized { rank: config.rank });
        }

        let group = Self {
            rank: config.rank,
            world_size: config.world_size,
            local_device: config.rank % config.gpus_per_node,
            backend: config.backend,
            master_endpoint: config.master_endpoint(),
        };

        info!(
            backend = %group.backend,
            rank = group.rank,
            world_size = group.world_size,
            device = group.local_device,
            master = %group.master_endpoint,
            "Process group initialized"
        );

        Ok(group)
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    /// Device index this rank is pinned to
    pub fn local_device(&self) -> u32 {
        self.local_device
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn master_endpoint(&self) -> &str {
        &self.master_endpoint
    }

    /// True for rank 0
    pub fn is_primary(&self) -> bool {
        self.rank == 0
    }
}
