//! Random training-time augmentations.
//!
//! Layers operate on host-side CHW `f32` buffers in `0..=255`, one image at
//! a time, before batching. Geometric layers resample bilinearly and fill
//! out-of-range pixels by reflection.

use super::dataset::{ImageDataset, CHANNELS};
use crate::config::{AugmentationConfig, AugmentationParams};
use crate::errors::{PipelineError, Result};
use crate::utils::ensure_parent;
use burn::data::dataset::Dataset;
use image::{imageops, Rgb, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// Gap between preview cells, in pixels.
const PREVIEW_GAP: u32 = 4;

/// Axes a [`AugmentationLayer::RandomFlip`] may mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipMode {
    /// Left-right.
    Horizontal,
    /// Top-bottom.
    Vertical,
    /// Each axis independently.
    HorizontalAndVertical,
}

impl fmt::Display for FlipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Horizontal => write!(f, "horizontal"),
            Self::Vertical => write!(f, "vertical"),
            Self::HorizontalAndVertical => write!(f, "horizontal_and_vertical"),
        }
    }
}

/// One random transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer", rename_all = "snake_case")]
pub enum AugmentationLayer {
    /// Mirrors with probability one half per axis.
    RandomFlip {
        /// Axes considered.
        mode: FlipMode,
    },
    /// Rotates by an angle drawn from `[-factor * 2π, factor * 2π]`.
    RandomRotation {
        /// Fraction of a full turn.
        factor: f32,
    },
    /// Scales each axis by `1 + U(-factor, factor)`; positive zooms out.
    RandomZoom {
        /// Vertical factor.
        height_factor: f32,
        /// Horizontal factor.
        width_factor: f32,
    },
    /// Adds a delta drawn from `[-factor * 255, factor * 255]`.
    RandomBrightness {
        /// Fraction of the value range.
        factor: f32,
    },
    /// Scales deviations from the per-channel mean by `U(lower, upper)`.
    RandomContrast {
        /// Smallest contrast factor.
        lower: f32,
        /// Largest contrast factor.
        upper: f32,
    },
    /// Shifts by `U(-factor, factor)` of each dimension.
    RandomTranslation {
        /// Vertical fraction.
        height_factor: f32,
        /// Horizontal fraction.
        width_factor: f32,
    },
}

impl AugmentationLayer {
    /// Short layer name used in summaries.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RandomFlip { .. } => "random_flip",
            Self::RandomRotation { .. } => "random_rotation",
            Self::RandomZoom { .. } => "random_zoom",
            Self::RandomBrightness { .. } => "random_brightness",
            Self::RandomContrast { .. } => "random_contrast",
            Self::RandomTranslation { .. } => "random_translation",
        }
    }

    /// Applies the layer to a CHW image of `[height, width]`.
    pub fn apply<R: Rng + ?Sized>(&self, image: &[f32], size: [usize; 2], rng: &mut R) -> Vec<f32> {
        let [height, width] = size;
        let (h, w) = (height as f32, width as f32);
        match *self {
            Self::RandomFlip { mode } => {
                let flip_x = matches!(mode, FlipMode::Horizontal | FlipMode::HorizontalAndVertical)
                    && rng.gen_bool(0.5);
                let flip_y = matches!(mode, FlipMode::Vertical | FlipMode::HorizontalAndVertical)
                    && rng.gen_bool(0.5);
                flip(image, size, flip_x, flip_y)
            }
            Self::RandomRotation { factor } => {
                let angle = symmetric(rng, factor * 2.0 * PI);
                let (sin, cos) = angle.sin_cos();
                let (cx, cy) = ((w - 1.0) / 2.0, (h - 1.0) / 2.0);
                warp(image, size, |x, y| {
                    let (dx, dy) = (x - cx, y - cy);
                    (cx + dx * cos + dy * sin, cy - dx * sin + dy * cos)
                })
            }
            Self::RandomZoom {
                height_factor,
                width_factor,
            } => {
                let zoom_y = 1.0 + symmetric(rng, height_factor);
                let zoom_x = 1.0 + symmetric(rng, width_factor);
                let (cx, cy) = ((w - 1.0) / 2.0, (h - 1.0) / 2.0);
                warp(image, size, |x, y| (cx + (x - cx) * zoom_x, cy + (y - cy) * zoom_y))
            }
            Self::RandomBrightness { factor } => {
                let delta = symmetric(rng, factor * 255.0);
                image.iter().map(|v| (v + delta).clamp(0.0, 255.0)).collect()
            }
            Self::RandomContrast { lower, upper } => {
                let factor = if upper > lower {
                    rng.gen_range(lower..=upper)
                } else {
                    lower
                };
                adjust_contrast(image, factor)
            }
            Self::RandomTranslation {
                height_factor,
                width_factor,
            } => {
                let shift_y = symmetric(rng, height_factor) * h;
                let shift_x = symmetric(rng, width_factor) * w;
                warp(image, size, |x, y| (x - shift_x, y - shift_y))
            }
        }
    }
}

impl fmt::Display for AugmentationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RandomFlip { mode } => write!(f, "random flip layer with mode: {mode}"),
            Self::RandomRotation { factor } => write!(f, "random rotation layer with factor: {factor}"),
            Self::RandomZoom {
                height_factor,
                width_factor,
            } => write!(
                f,
                "random zoom layer with height factor: {height_factor} and width factor: {width_factor}"
            ),
            Self::RandomBrightness { factor } => write!(f, "random brightness layer with factor: {factor}"),
            Self::RandomContrast { lower, upper } => write!(
                f,
                "random contrast layer with lower factor: {lower} and upper factor: {upper}"
            ),
            Self::RandomTranslation {
                height_factor,
                width_factor,
            } => write!(
                f,
                "random translation layer with height factor: {height_factor} and width factor: {width_factor}"
            ),
        }
    }
}

/// Ordered list of augmentation layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AugmentationPipeline {
    layers: Vec<AugmentationLayer>,
}

impl AugmentationPipeline {
    /// Builds the pipeline from toggles and strengths, logging every layer.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_params(params: &AugmentationParams) -> Self {
        info!("Building data augmentation pipeline...");
        let mut pipeline = Self::default();

        let mode = match (params.random_flip_horizontal, params.random_flip_vertical) {
            (true, true) => Some(FlipMode::HorizontalAndVertical),
            (true, false) => Some(FlipMode::Horizontal),
            (false, true) => Some(FlipMode::Vertical),
            (false, false) => None,
        };
        if let Some(mode) = mode {
            pipeline.add(AugmentationLayer::RandomFlip { mode });
        }
        if params.random_rotation {
            pipeline.add(AugmentationLayer::RandomRotation {
                factor: params.random_rotation_factor as f32,
            });
        }
        if params.random_zoom_height || params.random_zoom_width {
            pipeline.add(AugmentationLayer::RandomZoom {
                height_factor: if params.random_zoom_height {
                    params.random_zoom_height_factor as f32
                } else {
                    0.0
                },
                width_factor: if params.random_zoom_width {
                    params.random_zoom_width_factor as f32
                } else {
                    0.0
                },
            });
        }
        if params.random_brightness {
            pipeline.add(AugmentationLayer::RandomBrightness {
                factor: params.random_brightness_factor as f32,
            });
        }
        if params.random_contrast {
            pipeline.add(AugmentationLayer::RandomContrast {
                lower: params.random_contrast_lower_factor as f32,
                upper: params.random_contrast_upper_factor as f32,
            });
        }
        if params.random_translation_height || params.random_translation_width {
            pipeline.add(AugmentationLayer::RandomTranslation {
                height_factor: if params.random_translation_height {
                    params.random_translation_height_factor as f32
                } else {
                    0.0
                },
                width_factor: if params.random_translation_width {
                    params.random_translation_width_factor as f32
                } else {
                    0.0
                },
            });
        }

        info!("Data augmentation pipeline built successfully.");
        info!("Data augmentation pipeline summary:");
        for line in pipeline.summary().lines() {
            info!("{line}");
        }
        pipeline
    }

    fn add(&mut self, layer: AugmentationLayer) {
        info!("Added {layer}");
        self.layers.push(layer);
    }

    /// The layers in application order.
    #[must_use]
    pub fn layers(&self) -> &[AugmentationLayer] {
        &self.layers
    }

    /// Whether the pipeline is the identity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// One line per layer, numbered.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!("Augmentation pipeline: {} layers\n", self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            out.push_str(&format!("  {:>2}. {:<20} {layer}\n", i + 1, layer.name()));
        }
        out
    }

    /// Applies every layer in order.
    pub fn apply<R: Rng + ?Sized>(&self, image: &[f32], size: [usize; 2], rng: &mut R) -> Vec<f32> {
        self.layers
            .iter()
            .fold(image.to_vec(), |current, layer| layer.apply(&current, size, rng))
    }
}

/// Builds the augmentation pipeline and its preview.
#[derive(Debug, Clone)]
pub struct DataAugmentation {
    config: AugmentationConfig,
}

impl DataAugmentation {
    /// Creates the builder.
    #[must_use]
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Builds the pipeline from the configured toggles.
    #[must_use]
    pub fn augmentation(&self) -> AugmentationPipeline {
        AugmentationPipeline::from_params(&self.config.params)
    }

    /// Writes a 3x3 grid of augmentations of the first training image.
    ///
    /// Returns the written path, or `None` when no preview path is configured
    /// or the training split is empty.
    pub fn show_aug<R: Rng + ?Sized>(
        &self,
        pipeline: &AugmentationPipeline,
        rng: &mut R,
    ) -> Result<Option<PathBuf>> {
        let Some(path) = self.config.preview_path.clone() else {
            return Ok(None);
        };
        let dataset = ImageDataset::load(&self.config.training_dir)?;
        let Some(first) = dataset.get(0) else {
            warn!("Training dataset is empty. Skipping augmentation preview.");
            return Ok(None);
        };

        let size = dataset.image_size();
        let [height, width] = size;
        let (cell_w, cell_h) = (dimension(width)?, dimension(height)?);
        let side = |cell: u32| 3 * cell + 2 * PREVIEW_GAP;
        let mut canvas = RgbImage::from_pixel(side(cell_w), side(cell_h), Rgb([255, 255, 255]));

        for i in 0..9u32 {
            let augmented = pipeline.apply(&first.image, size, rng);
            let tile = chw_to_rgb(&augmented, size, cell_w, cell_h);
            let x = (i % 3) * (cell_w + PREVIEW_GAP);
            let y = (i / 3) * (cell_h + PREVIEW_GAP);
            imageops::overlay(&mut canvas, &tile, i64::from(x), i64::from(y));
        }

        ensure_parent(&path)?;
        canvas.save(&path).map_err(|e| PipelineError::image(&path, e))?;
        info!("Augmentation preview saved to: {}", path.display());
        Ok(Some(path))
    }
}

fn dimension(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| PipelineError::Dataset(format!("image dimension {value} is too large")))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn chw_to_rgb(image: &[f32], size: [usize; 2], width: u32, height: u32) -> RgbImage {
    let plane = size[0] * size[1];
    RgbImage::from_fn(width, height, |x, y| {
        let p = y as usize * size[1] + x as usize;
        let channel = |c: usize| image[c * plane + p].round().clamp(0.0, 255.0) as u8;
        Rgb([channel(0), channel(1), channel(2)])
    })
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, bound: f32) -> f32 {
    if bound > 0.0 {
        rng.gen_range(-bound..=bound)
    } else {
        0.0
    }
}

fn flip(image: &[f32], size: [usize; 2], flip_x: bool, flip_y: bool) -> Vec<f32> {
    let [height, width] = size;
    let plane = height * width;
    let mut out = vec![0.0; image.len()];
    for c in 0..CHANNELS {
        for y in 0..height {
            let sy = if flip_y { height - 1 - y } else { y };
            for x in 0..width {
                let sx = if flip_x { width - 1 - x } else { x };
                out[c * plane + y * width + x] = image[c * plane + sy * width + sx];
            }
        }
    }
    out
}

fn adjust_contrast(image: &[f32], factor: f32) -> Vec<f32> {
    let plane = image.len() / CHANNELS;
    if plane == 0 {
        return image.to_vec();
    }
    image
        .chunks_exact(plane)
        .flat_map(|channel| {
            let mean = channel.iter().sum::<f32>() / plane as f32;
            channel
                .iter()
                .map(move |v| ((v - mean) * factor + mean).clamp(0.0, 255.0))
        })
        .collect()
}

/// Mirrors an index into `0..n` (`d c b a | a b c d | d c b a`).
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn reflect(index: i64, n: usize) -> usize {
    let n = n as i64;
    let period = 2 * n;
    let m = index.rem_euclid(period);
    (if m >= n { period - 1 - m } else { m }) as usize
}

/// Resamples every channel through `source`, which maps an output pixel to
/// the input coordinate it reads from.
#[allow(clippy::cast_possible_truncation)]
fn warp(image: &[f32], size: [usize; 2], source: impl Fn(f32, f32) -> (f32, f32)) -> Vec<f32> {
    let [height, width] = size;
    let plane = height * width;
    let mut out = vec![0.0; image.len()];

    for y in 0..height {
        for x in 0..width {
            let (sx, sy) = source(x as f32, y as f32);
            let (x0, y0) = (sx.floor(), sy.floor());
            let (fx, fy) = (sx - x0, sy - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);
            let (xa, xb) = (reflect(x0, width), reflect(x0 + 1, width));
            let (ya, yb) = (reflect(y0, height), reflect(y0 + 1, height));

            for c in 0..CHANNELS {
                let at = |yy: usize, xx: usize| image[c * plane + yy * width + xx];
                out[c * plane + y * width + x] = at(ya, xa) * (1.0 - fx) * (1.0 - fy)
                    + at(ya, xb) * fx * (1.0 - fy)
                    + at(yb, xa) * (1.0 - fx) * fy
                    + at(yb, xb) * fx * fy;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::dataset::ElementSpec;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn ramp(size: [usize; 2]) -> Vec<f32> {
        (0..size[0] * size[1] * CHANNELS).map(|v| (v % 256) as f32).collect()
    }

    fn only(params: impl FnOnce(&mut AugmentationParams)) -> AugmentationParams {
        let mut p = AugmentationParams {
            random_flip_horizontal: false,
            random_rotation: false,
            random_zoom_height: false,
            random_brightness: false,
            random_contrast: false,
            random_translation_height: false,
            random_translation_width: false,
            ..AugmentationParams::default()
        };
        params(&mut p);
        p
    }

    #[test]
    fn test_default_params_build_six_layers() {
        let pipeline = AugmentationPipeline::from_params(&AugmentationParams::default());
        let names: Vec<_> = pipeline.layers().iter().map(AugmentationLayer::name).collect();
        assert_eq!(
            names,
            vec![
                "random_flip",
                "random_rotation",
                "random_zoom",
                "random_brightness",
                "random_contrast",
                "random_translation"
            ]
        );
        assert_eq!(
            pipeline.layers()[0],
            AugmentationLayer::RandomFlip {
                mode: FlipMode::Horizontal
            }
        );
        assert!(pipeline.summary().starts_with("Augmentation pipeline: 6 layers"));
    }

    #[test]
    fn test_flip_mode_selection() {
        let both = AugmentationPipeline::from_params(&only(|p| {
            p.random_flip_horizontal = true;
            p.random_flip_vertical = true;
        }));
        assert_eq!(
            both.layers(),
            &[AugmentationLayer::RandomFlip {
                mode: FlipMode::HorizontalAndVertical
            }]
        );
        assert!(AugmentationPipeline::from_params(&only(|_| {})).is_empty());
    }

    #[test]
    fn test_disabled_zoom_axis_has_zero_factor() {
        let pipeline = AugmentationPipeline::from_params(&only(|p| {
            p.random_zoom_width = true;
            p.random_zoom_width_factor = 0.3;
        }));
        assert_eq!(
            pipeline.layers(),
            &[AugmentationLayer::RandomZoom {
                height_factor: 0.0,
                width_factor: 0.3
            }]
        );
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let image = ramp([4, 4]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(AugmentationPipeline::default().apply(&image, [4, 4], &mut rng), image);
    }

    #[test]
    fn test_zero_strength_geometry_is_identity() {
        let image = ramp([5, 4]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for layer in [
            AugmentationLayer::RandomRotation { factor: 0.0 },
            AugmentationLayer::RandomZoom {
                height_factor: 0.0,
                width_factor: 0.0,
            },
            AugmentationLayer::RandomTranslation {
                height_factor: 0.0,
                width_factor: 0.0,
            },
        ] {
            let out = layer.apply(&image, [5, 4], &mut rng);
            for (a, b) in out.iter().zip(&image) {
                assert!((a - b).abs() < 1e-3, "{layer} changed the image");
            }
        }
    }

    #[test]
    fn test_flip_horizontal_mirrors_rows() {
        let image = ramp([1, 3]);
        let out = flip(&image, [1, 3], true, false);
        assert_eq!(&out[..3], &[2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_brightness_stays_in_range() {
        let image = vec![0.0, 128.0, 255.0];
        let layer = AugmentationLayer::RandomBrightness { factor: 0.5 };
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..20 {
            let out = layer.apply(&image, [1, 1], &mut rng);
            assert!(out.iter().all(|v| (0.0..=255.0).contains(v)));
        }
    }

    #[test]
    fn test_contrast_keeps_channel_mean() {
        let image = vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0, 110.0, 120.0];
        let out = adjust_contrast(&image, 1.5);
        let mean = |s: &[f32]| s.iter().sum::<f32>() / s.len() as f32;
        assert!((mean(&out[..4]) - mean(&image[..4])).abs() < 1e-4);
        assert!((out[0] - 2.5).abs() < 1e-4);
    }

    #[test]
    fn test_reflect_indices() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(2, 4), 2);
    }

    #[test]
    fn test_preview_grid_written() {
        let dir = tempfile::tempdir().unwrap();
        let training_dir = dir.path().join("train_dataset");
        let spec = ElementSpec {
            image_size: [4, 6],
            batch_size: 1,
            class_names: vec!["no".to_string()],
            labels: vec![0],
            paths: vec![PathBuf::from("no/a.png")],
        };
        ImageDataset::new(spec, vec![100; 4 * 6 * 3])
            .unwrap()
            .save(&training_dir)
            .unwrap();

        let preview_path = dir.path().join("augmentation_preview.png");
        let builder = DataAugmentation::new(AugmentationConfig {
            training_dir,
            preview_path: Some(preview_path.clone()),
            params: AugmentationParams::default(),
        });
        let pipeline = builder.augmentation();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let written = builder.show_aug(&pipeline, &mut rng).unwrap();
        assert_eq!(written, Some(preview_path.clone()));
        let preview = image::open(&preview_path).unwrap();
        assert_eq!(preview.width(), 3 * 6 + 2 * PREVIEW_GAP);
        assert_eq!(preview.height(), 3 * 4 + 2 * PREVIEW_GAP);
    }

    #[test]
    fn test_preview_skipped_without_path() {
        let builder = DataAugmentation::new(AugmentationConfig {
            training_dir: PathBuf::from("/nonexistent"),
            preview_path: None,
            params: AugmentationParams::default(),
        });
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(builder.show_aug(&builder.augmentation(), &mut rng).unwrap(), None);
    }
}
