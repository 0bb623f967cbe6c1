//! Core type definitions shared across the toolkit

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Training epoch counter
pub type Epoch = u64;

/// Mapping from parameter name to its tensor value
pub type StateDict = BTreeMap<String, Tensor>;

/// Dense row-major f32 tensor
///
/// Deserialization goes through [`Tensor::new`], so a decoded tensor always
/// has `product(shape) == data.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Unchecked wire form of [`Tensor`]
#[derive(Deserialize)]
struct RawTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = Error;

    fn try_from(raw: RawTensor) -> Result<Self> {
        Tensor::new(raw.shape, raw.data)
    }
}

impl Tensor {
    /// Create a tensor, checking that the data fills the shape exactly
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| Error::InvalidArgument {
                message: format!("tensor shape {:?} overflows usize", shape),
            })?;
        if expected != data.len() {
            return Err(Error::InvalidArgument {
                message: format!(
                    "tensor of shape {:?} needs {} elements, got {}",
                    shape,
                    expected,
                    data.len()
                ),
            });
        }
        Ok(Self { shape, data })
    }

    /// Tensor filled with zeros
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    /// Tensor filled with a constant
    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![value; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Number of elements
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

/// Element type of a raw feature file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// 32-bit IEEE float
    #[default]
    F32,

    /// 64-bit IEEE float
    F64,
}

impl Dtype {
    /// Size of one element in bytes
    pub fn size(&self) -> usize {
        match self {
            Dtype::F32 => 4,
            Dtype::F64 => 8,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::F32 => write!(f, "f32"),
            Dtype::F64 => write!(f, "f64"),
        }
    }
}

impl FromStr for Dtype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "f32" | "float32" => Ok(Dtype::F32),
            "f64" | "float64" => Ok(Dtype::F64),
            other => Err(Error::InvalidArgument {
                message: format!("unsupported dtype: {}", other),
            }),
        }
    }
}
