use std::fs::read;
use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;

/// Read the source into memory and decode it. The raw bytes are returned
/// alongside the image so orientation correction and the no-gain guard
/// can reuse them without a second read.
pub fn decode_source(path: &Path) -> Result<(DynamicImage, Vec<u8>)> {
    let bytes =
        read(path).context(format!("failed to read file into memory: {path:?}"))?;

    let image = image::load_from_memory(&bytes)
        .context(format!("failed to decode image: {path:?}"))?;

    Ok((image, bytes))
}
