//! Image decode and JPEG export

use image::{ImageFormat, RgbImage};
use runtime_core::fs::ensure_dirs;
use runtime_core::{Error, Result};
use std::path::Path;
use tracing::{debug, info};

/// Decode an encoded image payload (JPEG, PNG, BMP) into RGB8
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).map_err(|e| Error::Codec {
        message: format!("Failed to decode image: {}", e),
    })?;
    Ok(image.to_rgb8())
}

/// Write every image to `{folder}/{index}.jpg`, creating `folder` if needed.
/// Returns the number of images written.
pub fn write_images<P: AsRef<Path>>(images: &[RgbImage], folder: P) -> Result<usize> {
    let folder = folder.as_ref();
    ensure_dirs(folder, &[""])?;

    for (i, image) in images.iter().enumerate() {
        let path = folder.join(format!("{}.jpg", i));
        image
            .save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|e| Error::Codec {
                message: format!("Failed to write {}: {}", path.display(), e),
            })?;
        debug!(path = %path.display(), "Wrote image");
    }

    info!(folder = %folder.display(), count = images.len(), "Saved images");
    Ok(images.len())
}
