//! Runtime Core - Foundation for the trainkit toolkit
//!
//! Provides core types, error handling, configuration and the
//! process-group bootstrap shared by the checkpoint and feature crates.

pub mod config;
pub mod error;
pub mod fs;
pub mod process_group;
pub mod types;

pub use config::ToolkitConfig;
pub use error::{Error, Result};
pub use process_group::{Backend, ProcessGroup, ProcessGroupConfig};
pub use types::*;
