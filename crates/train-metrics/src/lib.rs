//! Numeric helpers for training and evaluation loops
//!
//! - [`AverageMeter`]: running average over a bounded window
//! - [`accuracy`]: top-k precision of a batch of class scores
//! - [`normalize`]: L2 normalization of vectors and matrices

mod accuracy;
mod meter;
mod normalize;

pub use accuracy::accuracy;
pub use meter::AverageMeter;
pub use normalize::normalize;
