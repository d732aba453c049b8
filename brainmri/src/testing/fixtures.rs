//! Synthetic image trees.

use crate::errors::{PipelineError, Result};
use image::{ImageFormat, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// One class directory of a synthetic tree.
#[derive(Debug, Clone)]
pub struct ImageTreeSpec {
    /// Class directory name.
    pub class: String,
    /// Number of images written.
    pub count: usize,
    /// Image `(width, height)`.
    pub size: (u32, u32),
    /// Container format.
    pub format: ImageFormat,
}

impl ImageTreeSpec {
    /// A class of `count` 16x16 PNG images.
    #[must_use]
    pub fn png(class: impl Into<String>, count: usize) -> Self {
        Self {
            class: class.into(),
            count,
            size: (16, 16),
            format: ImageFormat::Png,
        }
    }

    /// Overrides the image size.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    /// Overrides the container format.
    #[must_use]
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }
}

/// Writes `root/<class>/<class>_<i>.<ext>` for every spec and returns the
/// written paths. Pixel values vary with class and index so images differ.
pub fn write_image_tree(root: &Path, specs: &[ImageTreeSpec]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (class_index, spec) in specs.iter().enumerate() {
        let dir = root.join(&spec.class);
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        let ext = spec.format.extensions_str().first().copied().unwrap_or("png");

        for i in 0..spec.count {
            let seed = (class_index * 97 + i * 13) as u32;
            let img = RgbImage::from_fn(spec.size.0, spec.size.1, |x, y| {
                let v = (x + y + seed) % 256;
                Rgb([v as u8, ((v * 3) % 256) as u8, ((v * 7) % 256) as u8])
            });
            let path = dir.join(format!("{}_{i:03}.{ext}", spec.class));
            img.save_with_format(&path, spec.format)
                .map_err(|e| PipelineError::image(&path, e))?;
            written.push(path);
        }
    }
    Ok(written)
}
