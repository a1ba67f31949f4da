//! Click-marker overlay for audit screenshots.
//!
//! Before a click is dispatched, the screenshot the detector examined gets a
//! red ring at the chosen coordinates so a human reviewing the artifacts can
//! see what was clicked. Failures here are logged and never fail the flow.

use std::path::Path;

use anyhow::Context;
use image::Rgba;

const RING_RADIUS: i64 = 12;
const RING_THICKNESS: i64 = 3;
const RING_COLOR: Rgba<u8> = Rgba([220, 0, 0, 255]);

/// Draw a ring centered at `(x, y)` onto the image at `path`, in place.
pub fn draw_marker(path: &Path, x: u32, y: u32) -> anyhow::Result<()> {
    let mut img = image::open(path)
        .with_context(|| format!("failed to open screenshot {}", path.display()))?
        .into_rgba8();

    let (width, height) = (img.width() as i64, img.height() as i64);
    let (cx, cy) = (x as i64, y as i64);

    let outer = RING_RADIUS + RING_THICKNESS;
    for dy in -outer..=outer {
        for dx in -outer..=outer {
            let dist_sq = dx * dx + dy * dy;
            let inner_sq = RING_RADIUS * RING_RADIUS;
            let outer_sq = outer * outer;
            if dist_sq < inner_sq || dist_sq > outer_sq {
                continue;
            }
            let px = cx + dx;
            let py = cy + dy;
            if px >= 0 && px < width && py >= 0 && py < height {
                img.put_pixel(px as u32, py as u32, RING_COLOR);
            }
        }
    }

    img.save(path)
        .with_context(|| format!("failed to write marked screenshot {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn blank_png(path: &Path, w: u32, h: u32) {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn marker_changes_pixels_around_the_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_1.png");
        blank_png(&path, 100, 100);

        draw_marker(&path, 50, 50).unwrap();

        let img = image::open(&path).unwrap().into_rgba8();
        assert_eq!(*img.get_pixel(50 + RING_RADIUS as u32 + 1, 50), RING_COLOR);
        // The center stays untouched.
        assert_eq!(*img.get_pixel(50, 50), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn marker_near_the_edge_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_1.png");
        blank_png(&path, 40, 40);

        draw_marker(&path, 0, 0).unwrap();
        draw_marker(&path, 39, 39).unwrap();
    }

    #[test]
    fn missing_screenshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(draw_marker(&dir.path().join("nope.png"), 10, 10).is_err());
    }
}
