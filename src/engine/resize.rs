/// Fit `(width, height)` into the bounding box, preserving aspect ratio.
/// A source that already fits keeps its dimensions; derivation never
/// upscales.
pub fn box_fit(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let width_ratio = max_width as f64 / width as f64;
    let height_ratio = max_height as f64 / height as f64;
    let ratio = width_ratio.min(height_ratio);
    let fitted_width = ((width as f64 * ratio).round() as u32).max(1);
    let fitted_height = ((height as f64 * ratio).round() as u32).max(1);
    (fitted_width.min(max_width), fitted_height.min(max_height))
}

#[cfg(test)]
mod tests {
    use super::box_fit;

    #[test]
    fn landscape_bounded_by_width() {
        assert_eq!(box_fit(3000, 2000, 300, 300), (300, 200));
    }

    #[test]
    fn portrait_bounded_by_height() {
        assert_eq!(box_fit(2000, 3000, 600, 600), (400, 600));
    }

    #[test]
    fn small_source_is_never_upscaled() {
        assert_eq!(box_fit(120, 80, 640, 640), (120, 80));
    }

    #[test]
    fn degenerate_thin_strip_stays_at_least_one_pixel() {
        assert_eq!(box_fit(10000, 2, 100, 100), (100, 1));
    }
}
