use std::io::Cursor;

use image::DynamicImage;

/// Bake the EXIF orientation into the pixel data so every derivative is
/// upright regardless of the viewer. Sources without EXIF (or with an
/// unreadable segment) pass through untouched.
pub fn apply_orientation(image: DynamicImage, source_bytes: &[u8]) -> DynamicImage {
    match read_orientation(source_bytes) {
        Some(2) => image.fliph(),
        Some(3) => image.rotate180(),
        Some(4) => image.flipv(),
        Some(5) => image.rotate90().fliph(),
        Some(6) => image.rotate90(),
        Some(7) => image.rotate270().fliph(),
        Some(8) => image.rotate270(),
        _ => image,
    }
}

fn read_orientation(source_bytes: &[u8]) -> Option<u16> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(source_bytes))
        .ok()?;
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(|value| value as u16)
}
