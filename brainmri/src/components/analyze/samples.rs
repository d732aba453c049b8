//! Random sample grid.

use super::metadata::ClassDirectory;
use crate::errors::{PipelineError, Result};
use crate::utils::ensure_parent;
use image::imageops::{self, FilterType};
use image::{ImageReader, Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;
use tracing::{info, warn};

const THUMBNAIL: u32 = 128;
const GAP: u32 = 8;
const LABEL_STRIP: u32 = 16;

/// Row marker colors, one per class in order.
const ROW_COLORS: [[u8; 3]; 8] = [
    [52, 152, 219],
    [231, 76, 60],
    [46, 204, 113],
    [243, 156, 18],
    [155, 89, 182],
    [26, 188, 156],
    [52, 73, 94],
    [230, 126, 34],
];

/// Draws `per_class` images per class at random (with replacement) into a
/// grid with one row per class, and saves it as PNG.
///
/// Returns `Ok(false)` without writing anything when there are no classes.
pub fn write_sample_grid<R: Rng + ?Sized>(
    classes: &[ClassDirectory],
    per_class: usize,
    path: &Path,
    rng: &mut R,
) -> Result<bool> {
    if classes.is_empty() {
        warn!("No subfolders found. Cannot visualize images.");
        return Ok(false);
    }

    let columns = per_class as u32;
    let rows = classes.len() as u32;
    let width = LABEL_STRIP + GAP + columns * (THUMBNAIL + GAP);
    let height = GAP + rows * (THUMBNAIL + GAP);
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

    for (row, class) in classes.iter().enumerate() {
        let y = GAP + row as u32 * (THUMBNAIL + GAP);
        let color = Rgb(ROW_COLORS[row % ROW_COLORS.len()]);
        for dy in 0..THUMBNAIL {
            for dx in 0..LABEL_STRIP {
                canvas.put_pixel(dx, y + dy, color);
            }
        }
        info!(row, class = %class.label, "Sample grid row");

        for column in 0..columns {
            let Some(file) = class.files.choose(rng) else {
                continue;
            };
            let thumb = ImageReader::open(file)
                .map_err(|e| PipelineError::io(file, e))?
                .with_guessed_format()
                .map_err(|e| PipelineError::io(file, e))?
                .decode()
                .map_err(|e| PipelineError::image(file, e))?
                .resize_exact(THUMBNAIL, THUMBNAIL, FilterType::Triangle)
                .to_rgb8();
            let x = LABEL_STRIP + GAP + column * (THUMBNAIL + GAP);
            imageops::overlay(&mut canvas, &thumb, i64::from(x), i64::from(y));
        }
    }

    ensure_parent(path)?;
    canvas.save(path).map_err(|e| PipelineError::image(path, e))?;
    info!("Image samples saved to: {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::analyze::metadata::discover_classes;
    use crate::testing::{write_image_tree, ImageTreeSpec};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::TempDir;

    #[test]
    fn test_grid_dimensions() {
        let dir = TempDir::new().unwrap();
        write_image_tree(
            &dir.path().join("data"),
            &[ImageTreeSpec::png("no", 2), ImageTreeSpec::png("yes", 1)],
        )
        .unwrap();
        let classes = discover_classes(&dir.path().join("data")).unwrap();
        let out = dir.path().join("samples.png");

        let written = write_sample_grid(&classes, 3, &out, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();

        assert!(written);
        let grid = image::open(&out).unwrap();
        assert_eq!(grid.width(), LABEL_STRIP + GAP + 3 * (THUMBNAIL + GAP));
        assert_eq!(grid.height(), GAP + 2 * (THUMBNAIL + GAP));
    }

    #[test]
    fn test_no_classes_skips_grid() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("samples.png");

        let written = write_sample_grid(&[], 3, &out, &mut rand::thread_rng()).unwrap();

        assert!(!written);
        assert!(!out.exists());
    }
}
