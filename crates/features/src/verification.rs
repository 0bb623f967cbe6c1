//! Verification bin files
//!
//! A verification bin is a pickled 2-tuple `(images, labels)` where
//! `images` holds encoded image byte strings and `labels` holds one integer
//! (or bool) per consecutive image pair.

use image::RgbImage;
use runtime_core::{Error, Result};
use serde_pickle::{DeOptions, Value};
use std::path::Path;
use tracing::info;

use crate::images::decode_rgb;

/// Decoded verification set
#[derive(Debug, Clone)]
pub struct VerificationSet {
    /// Images, two per label
    pub images: Vec<RgbImage>,

    /// One label per image pair
    pub labels: Vec<i64>,
}

impl VerificationSet {
    pub fn num_pairs(&self) -> usize {
        self.labels.len()
    }

    /// `(first, second, label)` for every pair
    pub fn pairs(&self) -> impl Iterator<Item = (&RgbImage, &RgbImage, i64)> {
        self.images
            .chunks_exact(2)
            .zip(self.labels.iter())
            .map(|(pair, &label)| (&pair[0], &pair[1], label))
    }
}

fn codec(message: String) -> Error {
    Error::Codec { message }
}

/// Parse the pickle stream into raw image payloads and labels, enforcing
/// two images per label. Images are not decoded.
pub fn parse_verification_bin(data: &[u8]) -> Result<(Vec<Vec<u8>>, Vec<i64>)> {
    let value = serde_pickle::value_from_slice(data, DeOptions::new())
        .map_err(|e| codec(format!("Failed to unpickle verification bin: {}", e)))?;

    let [bins, labels] = match value {
        Value::Tuple(items) | Value::List(items) => {
            <[Value; 2]>::try_from(items).map_err(|items| {
                codec(format!(
                    "expected an (images, labels) pair, got {} items",
                    items.len()
                ))
            })?
        }
        other => {
            return Err(codec(format!(
                "expected an (images, labels) pair, got {}",
                describe(&other)
            )))
        }
    };

    let bins = into_sequence(bins, "images")?
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Bytes(b) => Ok(b),
            other => Err(codec(format!(
                "image {} is {}, expected bytes",
                i,
                describe(&other)
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    let labels = into_sequence(labels, "labels")?
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::I64(n) => Ok(n),
            Value::Bool(b) => Ok(b as i64),
            other => Err(codec(format!(
                "label {} is {}, expected an integer",
                i,
                describe(&other)
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    if bins.len() != 2 * labels.len() {
        return Err(Error::InvariantViolation {
            message: format!(
                "verification bin holds {} images for {} labels, expected {}",
                bins.len(),
                labels.len(),
                2 * labels.len()
            ),
        });
    }

    Ok((bins, labels))
}

/// Load a verification bin and decode every image to RGB
pub fn decode_verification_bin<P: AsRef<Path>>(path: P) -> Result<VerificationSet> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::StoragePathNotFound {
            path: path.display().to_string(),
        },
        _ => Error::Io(e),
    })?;

    let (bins, labels) = parse_verification_bin(&data)?;
    let images = bins
        .iter()
        .map(|b| decode_rgb(b))
        .collect::<Result<Vec<_>>>()?;

    info!(
        path = %path.display(),
        images = images.len(),
        pairs = labels.len(),
        "Loaded verification bin"
    );
    Ok(VerificationSet { images, labels })
}

fn into_sequence(value: Value, what: &str) -> Result<Vec<Value>> {
    match value {
        Value::List(items) | Value::Tuple(items) => Ok(items),
        other => Err(codec(format!(
            "{} must be a list, got {}",
            what,
            describe(&other)
        ))),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::None => "None",
        Value::Bool(_) => "a bool",
        Value::I64(_) | Value::Int(_) => "an int",
        Value::F64(_) => "a float",
        Value::Bytes(_) => "bytes",
        Value::String(_) => "a string",
        Value::List(_) => "a list",
        Value::Tuple(_) => "a tuple",
        Value::Dict(_) => "a dict",
        _ => "a set",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use serde_pickle::SerOptions;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn png_bytes(shade: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(6, 6, Rgb([shade, shade, shade]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn pickle(images: Vec<Vec<u8>>, labels: Vec<Value>) -> Vec<u8> {
        let value = Value::Tuple(vec![
            Value::List(images.into_iter().map(Value::Bytes).collect()),
            Value::List(labels),
        ]);
        serde_pickle::value_to_vec(&value, SerOptions::new()).unwrap()
    }

    #[test]
    fn test_decode_bin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lfw.bin");
        let data = pickle(
            (0..4).map(|i| png_bytes(i * 50)).collect(),
            vec![Value::Bool(true), Value::I64(0)],
        );
        std::fs::write(&path, data).unwrap();

        let set = decode_verification_bin(&path).unwrap();
        assert_eq!(set.images.len(), 4);
        assert_eq!(set.labels, vec![1, 0]);
        assert_eq!(set.num_pairs(), 2);

        let pairs: Vec<_> = set.pairs().collect();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].0.get_pixel(0, 0), &Rgb([100, 100, 100]));
        assert_eq!(pairs[1].2, 0);
    }

    #[test]
    fn test_ratio_violation() {
        let data = pickle(
            (0..3).map(|i| png_bytes(i * 10)).collect(),
            vec![Value::I64(1), Value::I64(0)],
        );
        let err = parse_verification_bin(&data).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation { .. }));
    }

    #[test]
    fn test_wrong_structure() {
        let data =
            serde_pickle::value_to_vec(&Value::List(vec![Value::I64(1)]), SerOptions::new())
                .unwrap();
        let err = parse_verification_bin(&data).unwrap_err();
        assert!(matches!(err, Error::Codec { .. }));

        let err = parse_verification_bin(b"not a pickle").unwrap_err();
        assert!(matches!(err, Error::Codec { .. }));
    }

    #[test]
    fn test_bad_label_type() {
        let data = pickle(vec![png_bytes(0), png_bytes(1)], vec![Value::F64(0.5)]);
        let err = parse_verification_bin(&data).unwrap_err();
        assert!(err.to_string().contains("label 0"));
    }
}
