//! Pure mapping from a source image to its derivative locations.
//!
//! Every derivative of a source lives inside a sibling namespace
//! directory keyed by the full source file name, so deleting that one
//! directory removes all derivatives without touching the original and
//! two sources in the same directory can never collide.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::common::DERIVATIVE_NAMESPACE_SUFFIX;
use crate::presets::{OutputFormat, SizeTag};

pub trait PathExt {
    fn ext_lower(&self) -> String;
}

impl PathExt for Path {
    fn ext_lower(&self) -> String {
        self.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// The namespace directory holding every derivative of `source`:
/// `{source_dir}/{file_name}.drv`.
pub fn namespace_dir(source: &Path) -> PathBuf {
    let file_name = source
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    source.with_file_name(format!("{file_name}{DERIVATIVE_NAMESPACE_SUFFIX}"))
}

/// Pure mapping `(source, size_tag, format) -> path`. Identical arguments
/// always yield the identical path; distinct triples never collide.
///
/// `SizeTag::Original` maps to the source file itself, which is also the
/// graceful-degradation fallback for consumers of missing derivatives.
pub fn derivative_path(source: &Path, tag: SizeTag, format: OutputFormat) -> PathBuf {
    if tag == SizeTag::Original {
        return source.to_path_buf();
    }
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    namespace_dir(source).join(format!("{stem}_{}.{}", tag.as_str(), format.ext()))
}

/// Remove the whole derivative namespace of `source`, returning how many
/// files were deleted. A missing namespace is success with zero deleted.
pub fn delete_derivatives(source: &Path) -> Result<usize> {
    let namespace = namespace_dir(source);
    if !namespace.exists() {
        return Ok(0);
    }

    let deleted = WalkDir::new(&namespace)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .count();

    fs::remove_dir_all(&namespace)
        .context(format!("failed to remove derivative namespace {namespace:?}"))?;
    log::info!("deleted {deleted} derivatives under {namespace:?}");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivative_path_is_pure() {
        let source = Path::new("/data/upload/photo.jpg");
        let a = derivative_path(source, SizeTag::Sm, OutputFormat::WebP);
        let b = derivative_path(source, SizeTag::Sm, OutputFormat::WebP);
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/data/upload/photo.jpg.drv/photo_sm.webp"));
    }

    #[test]
    fn distinct_triples_never_collide() {
        let one = Path::new("/data/a.png");
        let two = Path::new("/data/a.jpg");
        let mut seen = std::collections::HashSet::new();
        for source in [one, two] {
            for tag in [SizeTag::Xs, SizeTag::Sm, SizeTag::Full] {
                for format in [OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::WebP] {
                    assert!(seen.insert(derivative_path(source, tag, format)));
                }
            }
        }
    }

    #[test]
    fn original_tag_resolves_to_source() {
        let source = Path::new("/data/upload/photo.jpg");
        assert_eq!(
            derivative_path(source, SizeTag::Original, OutputFormat::Jpeg),
            source
        );
    }
}
