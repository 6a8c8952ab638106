use image::ImageFormat;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::common::LOSSLESS_QUALITY_THRESHOLD;

/// Named size classes a source can be derived into. `Original` is a
/// resolver-only tag: it maps to the untouched source file and never
/// produces a derivative.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SizeTag {
    Xs,
    Sm,
    Md,
    Lg,
    Xl,
    Full,
    Original,
}

impl SizeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeTag::Xs => "xs",
            SizeTag::Sm => "sm",
            SizeTag::Md => "md",
            SizeTag::Lg => "lg",
            SizeTag::Xl => "xl",
            SizeTag::Full => "full",
            SizeTag::Original => "original",
        }
    }
}

/// Maximum bounding box for one size tag. Sources smaller than the box
/// keep their dimensions; derivation never upscales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBox {
    pub max_width: u32,
    pub max_height: u32,
}

impl SizeBox {
    pub const fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
        }
    }

    /// Box used for the `full` tag: re-encode at source dimensions.
    pub const UNBOUNDED: Self = Self::new(u32::MAX, u32::MAX);
}

/// Output formats the engine can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    pub fn ext(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    pub fn supports_alpha(&self) -> bool {
        match self {
            OutputFormat::Jpeg => false,
            OutputFormat::Png | OutputFormat::WebP => true,
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::WebP => ImageFormat::WebP,
        }
    }
}

/// Resampling filter choice, serializable so presets can live in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl ResampleFilter {
    pub fn filter_type(&self) -> FilterType {
        match self {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// A named bundle of encoding parameters. Static configuration, not
/// runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityPreset {
    pub name: String,
    /// Explicit output format; `None` lets the engine pick by tier and
    /// transparency.
    pub primary_format: Option<OutputFormat>,
    pub quality: u8,
    pub effort: u8,
    pub lossless: bool,
    pub resample: ResampleFilter,
}

impl QualityPreset {
    /// Lossless encoding is only honored when the preset both asks for it
    /// and sits at or above the quality threshold.
    pub fn wants_lossless(&self, threshold: u8) -> bool {
        self.lossless && self.quality >= threshold
    }

    /// A tier below the lossless threshold is allowed to encode lossily.
    pub fn allows_lossy(&self) -> bool {
        !self.lossless || self.quality < LOSSLESS_QUALITY_THRESHOLD
    }
}

pub fn default_presets() -> Vec<QualityPreset> {
    vec![
        QualityPreset {
            name: "thumbnail".to_string(),
            primary_format: Some(OutputFormat::Jpeg),
            quality: 70,
            effort: 3,
            lossless: false,
            resample: ResampleFilter::Triangle,
        },
        QualityPreset {
            name: "standard".to_string(),
            primary_format: None,
            quality: 82,
            effort: 4,
            lossless: false,
            resample: ResampleFilter::Lanczos3,
        },
        QualityPreset {
            name: "high".to_string(),
            primary_format: None,
            quality: 90,
            effort: 6,
            lossless: false,
            resample: ResampleFilter::Lanczos3,
        },
        QualityPreset {
            name: "archival".to_string(),
            primary_format: Some(OutputFormat::Png),
            quality: 97,
            effort: 9,
            lossless: true,
            resample: ResampleFilter::Lanczos3,
        },
    ]
}
