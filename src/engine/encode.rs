use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, Rgb, RgbImage};

use crate::presets::{OutputFormat, QualityPreset};

/// Pick the output format for one preset: the preset's explicit format
/// wins; otherwise WebP when the tier allows lossy encoding; otherwise
/// the universal fallbacks, PNG when transparency must survive and JPEG
/// when it need not.
pub fn select_format(preset: &QualityPreset, has_alpha: bool) -> OutputFormat {
    if let Some(format) = preset.primary_format {
        return format;
    }
    if preset.allows_lossy() {
        return OutputFormat::WebP;
    }
    if has_alpha {
        OutputFormat::Png
    } else {
        OutputFormat::Jpeg
    }
}

/// Composite transparent pixels onto a white background. Only called when
/// the target format cannot represent alpha.
pub fn flatten_to_white(image: &DynamicImage) -> DynamicImage {
    let rgba = image.to_rgba8();
    let mut flat = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        let blend = |channel: u8| -> u8 {
            ((channel as u32 * alpha + 255 * (255 - alpha)) / 255) as u8
        };
        flat.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    DynamicImage::ImageRgb8(flat)
}

/// Encode one variant into memory so the caller can apply the no-gain
/// guard before anything touches the disk.
///
/// The WebP encoder shipped by the `image` crate is lossless-only;
/// quality and effort apply to the JPEG and PNG paths.
pub fn encode_variant(
    image: &DynamicImage,
    format: OutputFormat,
    preset: &QualityPreset,
    lossless_threshold: u8,
) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, preset.quality);
            image
                .write_with_encoder(encoder)
                .context("jpeg encoder failed")?;
        }
        OutputFormat::Png => {
            let compression = if preset.wants_lossless(lossless_threshold) || preset.effort >= 7 {
                CompressionType::Best
            } else {
                CompressionType::Fast
            };
            let encoder = PngEncoder::new_with_quality(&mut buffer, compression, PngFilter::Adaptive);
            image
                .write_with_encoder(encoder)
                .context("png encoder failed")?;
        }
        OutputFormat::WebP => {
            let encoder = WebPEncoder::new_lossless(&mut buffer);
            image
                .write_with_encoder(encoder)
                .context("webp encoder failed")?;
        }
    }
    Ok(buffer.into_inner())
}

/// Write via a temp sibling plus atomic rename so a half-written
/// derivative is never observable at its final path.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("derivative path {path:?} has no parent directory"))?;
    fs::create_dir_all(parent)
        .context(format!("failed to create directory tree {parent:?}"))?;

    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("derivative path {path:?} has no file name"))?;
    let tmp = parent.join(format!(".{file_name}.tmp-{:04x}", rand::random::<u16>()));

    fs::write(&tmp, bytes).context(format!("failed to write temp file {tmp:?}"))?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err).context(format!("failed to rename {tmp:?} into place"));
    }
    Ok(())
}
