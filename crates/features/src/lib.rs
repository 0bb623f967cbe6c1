//! Feature and evaluation-data I/O
//!
//! This crate provides:
//! - **Feature files**: headerless, row-major float matrices whose shape is
//!   supplied by the caller
//! - **Verification bins**: pickled `(images, labels)` pairs used for
//!   face-verification style evaluation
//! - **Image helpers**: decoding encoded payloads to RGB and JPEG export
//!
//! # Example
//!
//! ```no_run
//! use features::{read_features, write_features, Features, InstanceCount};
//! use ndarray::array;
//!
//! # fn example() -> runtime_core::Result<()> {
//! let embeddings = array![[1.0f32, 2.0], [3.0, 4.0]];
//! write_features("/tmp/embeddings.bin", &embeddings)?;
//!
//! let loaded = read_features::<f32, _>("/tmp/embeddings.bin", InstanceCount::Exact(2), 2)?;
//! assert_eq!(loaded, Features::Matrix(embeddings));
//! # Ok(())
//! # }
//! ```

mod feature_io;
mod images;
mod verification;

pub use feature_io::{
    read_features, read_features_verbose, write_features, FeatureElement, Features, InstanceCount,
};
pub use images::{decode_rgb, write_images};
pub use verification::{decode_verification_bin, parse_verification_bin, VerificationSet};

// Re-export types from runtime-core for convenience
pub use runtime_core::Dtype;
