pub mod decode;
pub mod encode;
pub mod orientation;
pub mod resize;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use image::DynamicImage;
use log::{info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::common::errors::HandlerError;
use crate::config::PipelineConfig;
use crate::engine::decode::decode_source;
use crate::engine::encode::{encode_variant, flatten_to_white, select_format, write_atomic};
use crate::engine::orientation::apply_orientation;
use crate::engine::resize::box_fit;
use crate::presets::{OutputFormat, QualityPreset, SizeBox, SizeTag};
use crate::resolve::{PathExt, derivative_path};

/// One derivative produced (or deliberately skipped) for a source.
#[derive(Debug, Clone)]
pub struct Variant {
    pub tag: SizeTag,
    pub format: OutputFormat,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bytes_written: u64,
    /// Set when the encoded variant was neither smaller than the source
    /// nor a format change, so nothing was written.
    pub no_gain: bool,
}

/// Everything derived from one source in one `process` run. Fully
/// recomputable from the source and the policy; never persisted.
#[derive(Debug, Clone)]
pub struct DerivativeSet {
    pub source_path: PathBuf,
    pub variants: Vec<Variant>,
}

impl DerivativeSet {
    pub fn written(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter().filter(|variant| !variant.no_gain)
    }
}

/// Computes the canonical derivative set for a source image under a named
/// quality tier. Deterministic for identical source bytes and policy.
pub struct DerivationEngine {
    config: Arc<PipelineConfig>,
    pool: ThreadPool,
}

impl DerivationEngine {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        // Dedicated pool so encode work never contends with the caller's
        // global rayon pool.
        let pool = ThreadPoolBuilder::new()
            .thread_name(|i| format!("pixelmill-encode-{i}"))
            .build()
            .expect("failed to build encode thread pool");
        Self { config, pool }
    }

    /// Derive every configured size for `source` under `policy_name`.
    ///
    /// A single variant failure (unavailable encoder, I/O hiccup) is
    /// logged and skipped; only an unreadable source fails the whole task.
    pub fn process(
        &self,
        source: &Path,
        policy_name: &str,
    ) -> Result<DerivativeSet, HandlerError> {
        let preset = self.lookup_preset(policy_name)?;

        let (image, source_bytes) =
            decode_source(source).map_err(|err| HandlerError::FatalDecode {
                path: source.to_path_buf(),
                source: err,
            })?;
        let image = apply_orientation(image, &source_bytes);

        let has_alpha = image.color().has_alpha();
        let format = select_format(preset, has_alpha);
        let image = if has_alpha && !format.supports_alpha() {
            flatten_to_white(&image)
        } else {
            image
        };

        let source_len = source_bytes.len() as u64;
        let source_ext = source.ext_lower();
        let tags: Vec<(SizeTag, SizeBox)> = self
            .config
            .sizes
            .iter()
            .filter(|(tag, _)| **tag != SizeTag::Original)
            .map(|(tag, bbox)| (*tag, *bbox))
            .collect();

        let variants: Vec<Variant> = self.pool.install(|| {
            tags.par_iter()
                .filter_map(|(tag, bbox)| {
                    self.render_variant(
                        source, &image, *tag, *bbox, format, preset, source_len, &source_ext,
                    )
                })
                .collect()
        });

        let set = DerivativeSet {
            source_path: source.to_path_buf(),
            variants,
        };
        info!(
            "derived {} of {} variants for {source:?} (policy {policy_name})",
            set.written().count(),
            set.variants.len(),
        );
        Ok(set)
    }

    fn lookup_preset(&self, policy_name: &str) -> Result<&QualityPreset, HandlerError> {
        if let Some(preset) = self.config.preset(policy_name) {
            return Ok(preset);
        }
        warn!(
            "unknown quality policy {policy_name:?}, falling back to {:?}",
            self.config.default_policy
        );
        self.config
            .preset(&self.config.default_policy)
            .ok_or_else(|| {
                HandlerError::Other(anyhow!(
                    "default quality policy {:?} is not configured",
                    self.config.default_policy
                ))
            })
    }

    #[allow(clippy::too_many_arguments)]
    fn render_variant(
        &self,
        source: &Path,
        image: &DynamicImage,
        tag: SizeTag,
        bbox: SizeBox,
        format: OutputFormat,
        preset: &QualityPreset,
        source_len: u64,
        source_ext: &str,
    ) -> Option<Variant> {
        let (width, height) = box_fit(
            image.width(),
            image.height(),
            bbox.max_width,
            bbox.max_height,
        );
        let resized = if (width, height) == (image.width(), image.height()) {
            image.clone()
        } else {
            image.resize_exact(width, height, preset.resample.filter_type())
        };

        let encoded = match encode_variant(
            &resized,
            format,
            preset,
            self.config.lossless_threshold,
        ) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    "skipping variant {}/{} for {source:?}: {err:#}",
                    tag.as_str(),
                    format.ext()
                );
                return None;
            }
        };

        let path = derivative_path(source, tag, format);
        if encoded.len() as u64 >= source_len && format.ext() == source_ext {
            info!(
                "no gain for {}/{} of {source:?} ({} >= {source_len} bytes), not writing",
                tag.as_str(),
                format.ext(),
                encoded.len()
            );
            return Some(Variant {
                tag,
                format,
                path,
                width,
                height,
                bytes_written: 0,
                no_gain: true,
            });
        }

        if let Err(err) = write_atomic(&path, &encoded) {
            warn!(
                "skipping variant {}/{} for {source:?}: {err:#}",
                tag.as_str(),
                format.ext()
            );
            return None;
        }

        Some(Variant {
            tag,
            format,
            path,
            width,
            height,
            bytes_written: encoded.len() as u64,
            no_gain: false,
        })
    }
}
