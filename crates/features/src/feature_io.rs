//! Raw feature-vector files
//!
//! A feature file is `instance_count * feature_dim` little-endian floats
//! written back to back. Nothing about the shape is stored in the file; the
//! caller supplies it when reading.

use bytes::{Buf, BufMut, BytesMut};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Dimension};
use runtime_core::fs::ensure_parent;
use runtime_core::{Dtype, Error, Result};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Fixed-width float stored in feature files
pub trait FeatureElement: Copy + fmt::Debug + Send + Sync + 'static {
    /// Runtime tag of this element type
    const DTYPE: Dtype;

    /// Decode one element, advancing the buffer
    fn get<B: Buf>(buf: &mut B) -> Self;

    /// Encode one element
    fn put<B: BufMut>(self, buf: &mut B);

    fn to_f64(self) -> f64;
}

impl FeatureElement for f32 {
    const DTYPE: Dtype = Dtype::F32;

    fn get<B: Buf>(buf: &mut B) -> Self {
        buf.get_f32_le()
    }

    fn put<B: BufMut>(self, buf: &mut B) {
        buf.put_f32_le(self)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl FeatureElement for f64 {
    const DTYPE: Dtype = Dtype::F64;

    fn get<B: Buf>(buf: &mut B) -> Self {
        buf.get_f64_le()
    }

    fn put<B: BufMut>(self, buf: &mut B) {
        buf.put_f64_le(self)
    }

    fn to_f64(self) -> f64 {
        self
    }
}

/// How many rows to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceCount {
    /// Exactly this many rows
    Exact(usize),

    /// Every row in the file
    All,
}

impl InstanceCount {
    /// Map the conventional integer form: `-1` reads everything, positive
    /// values are exact counts.
    pub fn from_raw(raw: i64) -> Result<Self> {
        match raw {
            -1 => Ok(InstanceCount::All),
            n if n > 0 => Ok(InstanceCount::Exact(n as usize)),
            n => Err(Error::InvalidArgument {
                message: format!("instance count must be positive or -1, got {}", n),
            }),
        }
    }
}

/// Features read back from disk
#[derive(Debug, Clone, PartialEq)]
pub enum Features<T> {
    /// `(instance_count, feature_dim)` matrix, for `feature_dim > 1`
    Matrix(Array2<T>),

    /// Flat vector, for `feature_dim == 1`
    Vector(Array1<T>),
}

impl<T: Clone> Features<T> {
    /// `(rows, cols)`, treating a vector as a single column
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Features::Matrix(m) => m.dim(),
            Features::Vector(v) => (v.len(), 1),
        }
    }

    /// Always view the features as a matrix
    pub fn into_matrix(self) -> Array2<T> {
        match self {
            Features::Matrix(m) => m,
            Features::Vector(v) => v.insert_axis(Axis(1)),
        }
    }
}

/// Read a raw feature file.
///
/// With [`InstanceCount::Exact`] the first `n * feature_dim` elements are
/// read and the file must hold at least that many; trailing data is ignored.
/// With [`InstanceCount::All`] the file length must be a whole number of
/// rows.
pub fn read_features<T, P>(path: P, count: InstanceCount, feature_dim: usize) -> Result<Features<T>>
where
    T: FeatureElement,
    P: AsRef<Path>,
{
    read_features_verbose(path, count, feature_dim, false)
}

/// [`read_features`], logging the resulting shape at info level when
/// `verbose` is set
pub fn read_features_verbose<T, P>(
    path: P,
    count: InstanceCount,
    feature_dim: usize,
    verbose: bool,
) -> Result<Features<T>>
where
    T: FeatureElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if feature_dim == 0 {
        return Err(Error::InvalidArgument {
            message: "feature_dim must be positive".to_string(),
        });
    }
    if count == InstanceCount::Exact(0) {
        return Err(Error::InvalidArgument {
            message: "instance count must be positive or -1, got 0".to_string(),
        });
    }

    let invalid = |reason: String| Error::InvalidFeatureFile {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::StoragePathNotFound {
            path: path.display().to_string(),
        },
        _ => Error::Io(e),
    })?;

    let row_bytes = feature_dim
        .checked_mul(T::DTYPE.size())
        .ok_or_else(|| Error::InvalidArgument {
            message: format!("feature_dim {} overflows the row size", feature_dim),
        })?;
    let mut data = Vec::new();
    let rows = match count {
        InstanceCount::Exact(n) => {
            let file_len = file.metadata()?.len();
            let needed = match n.checked_mul(row_bytes) {
                Some(needed) => needed,
                None => {
                    return Err(invalid(format!(
                        "{} x {} {} overflows the addressable size, file has {} bytes",
                        n,
                        feature_dim,
                        T::DTYPE,
                        file_len
                    )))
                }
            };
            file.take(needed as u64).read_to_end(&mut data)?;
            if data.len() < needed {
                return Err(invalid(format!(
                    "expected {} bytes for {} x {} {}, file has {}",
                    needed,
                    n,
                    feature_dim,
                    T::DTYPE,
                    data.len()
                )));
            }
            n
        }
        InstanceCount::All => {
            let mut file = file;
            file.read_to_end(&mut data)?;
            if data.len() % row_bytes != 0 {
                return Err(invalid(format!(
                    "{} bytes is not a whole number of {}-byte rows",
                    data.len(),
                    row_bytes
                )));
            }
            data.len() / row_bytes
        }
    };

    let mut buf = data.as_slice();
    let values: Vec<T> = (0..rows * feature_dim).map(|_| T::get(&mut buf)).collect();

    let features = if feature_dim > 1 {
        let matrix = Array2::from_shape_vec((rows, feature_dim), values)
            .map_err(|e| invalid(e.to_string()))?;
        Features::Matrix(matrix)
    } else {
        Features::Vector(Array1::from_vec(values))
    };

    if verbose {
        info!(
            path = %path.display(),
            shape = ?features.shape(),
            dtype = %T::DTYPE,
            "Read features"
        );
    } else {
        debug!(
            path = %path.display(),
            shape = ?features.shape(),
            dtype = %T::DTYPE,
            "Read features"
        );
    }
    Ok(features)
}

/// Write features in logical row-major order with no header. Returns the
/// number of bytes written.
pub fn write_features<T, S, D, P>(path: P, features: &ArrayBase<S, D>) -> Result<u64>
where
    T: FeatureElement,
    S: Data<Elem = T>,
    D: Dimension,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    ensure_parent(path)?;

    let mut buf = BytesMut::with_capacity(features.len() * T::DTYPE.size());
    for &value in features.iter() {
        value.put(&mut buf);
    }

    std::fs::write(path, &buf).map_err(|e| Error::Storage {
        message: format!("Failed to write features to {}: {}", path.display(), e),
    })?;

    info!(
        path = %path.display(),
        shape = ?features.shape(),
        size_bytes = buf.len(),
        "Saved features"
    );
    Ok(buf.len() as u64)
}
