use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgb, RgbImage, Rgba, RgbaImage};

use pixelmill::common::errors::HandlerError;
use pixelmill::config::PipelineConfig;
use pixelmill::engine::DerivationEngine;
use pixelmill::presets::{SizeBox, SizeTag};
use pixelmill::resolve;

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    let mut sizes = BTreeMap::new();
    sizes.insert(SizeTag::Sm, SizeBox::new(300, 300));
    sizes.insert(SizeTag::Md, SizeBox::new(600, 600));
    config.sizes = sizes;
    config
}

fn engine() -> DerivationEngine {
    DerivationEngine::new(Arc::new(test_config()))
}

fn write_rgb_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(width, height, Rgb([90, 120, 200]))
        .save(&path)
        .unwrap();
    path
}

#[test]
fn derivatives_respect_size_bounds_and_aspect_ratio() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_rgb_png(dir.path(), "photo.png", 900, 600);

    let set = engine().process(&source, "standard").unwrap();
    assert_eq!(set.variants.len(), 2);
    for variant in &set.variants {
        assert!(variant.width <= 600 && variant.height <= 600);
        assert!(variant.width <= 900 && variant.height <= 600);
    }

    let sm = set.variants.iter().find(|v| v.tag == SizeTag::Sm).unwrap();
    assert_eq!((sm.width, sm.height), (300, 200));
    let md = set.variants.iter().find(|v| v.tag == SizeTag::Md).unwrap();
    assert_eq!((md.width, md.height), (600, 400));

    for variant in set.written() {
        let decoded = image::open(&variant.path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (variant.width, variant.height));
    }
}

#[test]
fn small_sources_are_never_upscaled() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_rgb_png(dir.path(), "tiny.png", 120, 80);

    let set = engine().process(&source, "standard").unwrap();
    for variant in &set.variants {
        assert_eq!((variant.width, variant.height), (120, 80));
    }
}

#[test]
fn process_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_rgb_png(dir.path(), "photo.png", 900, 600);
    let engine = engine();

    let first = engine.process(&source, "standard").unwrap();
    let second = engine.process(&source, "standard").unwrap();

    let paths = |set: &pixelmill::engine::DerivativeSet| {
        let mut p: Vec<_> = set.variants.iter().map(|v| v.path.clone()).collect();
        p.sort();
        p
    };
    assert_eq!(paths(&first), paths(&second));

    // No orphaned extra variants accumulate across runs.
    let namespace = resolve::namespace_dir(&source);
    let files = std::fs::read_dir(&namespace).unwrap().count();
    assert_eq!(files, first.written().count());
}

#[test]
fn transparency_survives_alpha_capable_formats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logo.png");
    let mut rgba = RgbaImage::from_pixel(400, 400, Rgba([200, 30, 30, 255]));
    rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
    rgba.save(&path).unwrap();

    // "standard" has no explicit format and allows lossy, so WebP keeps
    // the alpha channel.
    let set = engine().process(&path, "standard").unwrap();
    for variant in set.written() {
        assert_eq!(variant.path.extension().unwrap(), "webp");
    }
}

#[test]
fn transparency_is_flattened_for_jpeg_presets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logo.png");
    let mut rgba = RgbaImage::from_pixel(400, 400, Rgba([200, 30, 30, 255]));
    rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
    rgba.save(&path).unwrap();

    // "thumbnail" pins JPEG, which cannot carry alpha.
    let set = engine().process(&path, "thumbnail").unwrap();
    assert!(set.written().count() > 0);
    for variant in set.written() {
        assert_eq!(variant.path.extension().unwrap(), "jpg");
        let decoded = image::open(&variant.path).unwrap();
        assert!(!decoded.color().has_alpha());
    }
}

#[test]
fn unknown_policy_falls_back_to_the_default() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_rgb_png(dir.path(), "photo.png", 500, 500);
    let set = engine().process(&source, "no-such-policy").unwrap();
    assert!(!set.variants.is_empty());
}

#[test]
fn unreadable_source_is_a_fatal_decode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.jpg");
    std::fs::write(&path, b"these are not image bytes").unwrap();

    match engine().process(&path, "standard") {
        Err(HandlerError::FatalDecode { path: failed, .. }) => assert_eq!(failed, path),
        other => panic!("expected FatalDecode, got {other:?}"),
    }
}

#[test]
fn no_half_written_artifacts_are_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_rgb_png(dir.path(), "photo.png", 900, 600);
    engine().process(&source, "standard").unwrap();

    let namespace = resolve::namespace_dir(&source);
    for entry in std::fs::read_dir(&namespace).unwrap() {
        let name = entry.unwrap().file_name().into_string().unwrap();
        assert!(!name.contains(".tmp-"), "leftover temp file {name}");
    }
}

#[test]
fn delete_derivatives_counts_files_and_tolerates_absence() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_rgb_png(dir.path(), "photo.png", 900, 600);
    let set = engine().process(&source, "standard").unwrap();
    let written = set.written().count();
    assert!(written > 0);

    assert_eq!(resolve::delete_derivatives(&source).unwrap(), written);
    assert!(!resolve::namespace_dir(&source).exists());
    assert!(source.is_file(), "original must never be touched");

    // Absent namespace is success with zero deleted.
    assert_eq!(resolve::delete_derivatives(&source).unwrap(), 0);
}
