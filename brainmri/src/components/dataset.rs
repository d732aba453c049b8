//! Serialized image splits and their burn `Dataset`/`Batcher` integration.
//!
//! A split is a directory holding `element_spec.json` (shape, class names,
//! labels and source paths) and `images.bin` (raw `u8` pixels, HWC, one image
//! after the other). Items are converted to CHW `f32` in `0..=255` on access;
//! normalization happens inside the model.

use crate::errors::{PipelineError, Result};
use crate::utils::{create_directories, load_json, save_json};
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Metadata file of a split directory.
pub const ELEMENT_SPEC_FILE: &str = "element_spec.json";

/// Pixel file of a split directory.
pub const IMAGES_FILE: &str = "images.bin";

/// Number of color channels stored per pixel.
pub const CHANNELS: usize = 3;

/// Shape and labeling of a serialized split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSpec {
    /// `[height, width]` of every image.
    pub image_size: [usize; 2],
    /// Batch size the split was prepared with.
    pub batch_size: usize,
    /// Class names, index = label.
    pub class_names: Vec<String>,
    /// Label of each image, in storage order.
    pub labels: Vec<usize>,
    /// Source file of each image, in storage order.
    pub paths: Vec<PathBuf>,
}

impl ElementSpec {
    /// Number of bytes one image occupies in `images.bin`.
    #[must_use]
    pub fn image_len(&self) -> usize {
        self.image_size[0] * self.image_size[1] * CHANNELS
    }
}

/// One image ready for batching.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    /// Flattened CHW pixels in `0..=255`.
    pub image: Vec<f32>,
    /// Class label.
    pub label: usize,
}

impl ImageItem {
    /// Converts interleaved HWC bytes to a CHW item.
    #[must_use]
    pub fn from_hwc(pixels: &[u8], label: usize) -> Self {
        let plane = pixels.len() / CHANNELS;
        let mut image = vec![0.0f32; pixels.len()];
        for (p, px) in pixels.chunks_exact(CHANNELS).enumerate() {
            for (c, value) in px.iter().enumerate() {
                image[c * plane + p] = f32::from(*value);
            }
        }
        Self { image, label }
    }
}

/// A split loaded in memory.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    spec: ElementSpec,
    pixels: Vec<u8>,
}

impl ImageDataset {
    /// Builds a split from its spec and concatenated HWC pixels.
    pub fn new(spec: ElementSpec, pixels: Vec<u8>) -> Result<Self> {
        let expected = spec.labels.len() * spec.image_len();
        if pixels.len() != expected {
            return Err(PipelineError::Dataset(format!(
                "expected {expected} pixel bytes for {} images, found {}",
                spec.labels.len(),
                pixels.len()
            )));
        }
        if spec.paths.len() != spec.labels.len() {
            return Err(PipelineError::Dataset(format!(
                "{} labels but {} source paths",
                spec.labels.len(),
                spec.paths.len()
            )));
        }
        if let Some(label) = spec.labels.iter().find(|l| **l >= spec.class_names.len()) {
            return Err(PipelineError::Dataset(format!(
                "label {label} out of range for {} classes",
                spec.class_names.len()
            )));
        }
        Ok(Self { spec, pixels })
    }

    /// Writes the split to `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        create_directories(&[dir])?;
        save_json(&dir.join(ELEMENT_SPEC_FILE), &self.spec)?;
        let images = dir.join(IMAGES_FILE);
        std::fs::write(&images, &self.pixels).map_err(|e| PipelineError::io(&images, e))?;
        info!(
            path = %dir.display(),
            images = self.spec.labels.len(),
            "Dataset saved"
        );
        Ok(())
    }

    /// Reads a split previously written by [`save`](Self::save).
    pub fn load(dir: &Path) -> Result<Self> {
        let spec: ElementSpec = load_json(&dir.join(ELEMENT_SPEC_FILE))?;
        let images = dir.join(IMAGES_FILE);
        let pixels = std::fs::read(&images).map_err(|e| PipelineError::io(&images, e))?;
        let dataset = Self::new(spec, pixels)?;
        info!(
            path = %dir.display(),
            images = dataset.spec.labels.len(),
            "Dataset loaded"
        );
        Ok(dataset)
    }

    /// Split metadata.
    #[must_use]
    pub fn spec(&self) -> &ElementSpec {
        &self.spec
    }

    /// Class names, index = label.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.spec.class_names
    }

    /// `[height, width]` of every image.
    #[must_use]
    pub fn image_size(&self) -> [usize; 2] {
        self.spec.image_size
    }

    /// Raw HWC bytes of image `index`.
    #[must_use]
    pub fn image_hwc(&self, index: usize) -> Option<&[u8]> {
        let len = self.spec.image_len();
        self.pixels.get(index * len..(index + 1) * len)
    }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let label = *self.spec.labels.get(index)?;
        self.image_hwc(index).map(|px| ImageItem::from_hwc(px, label))
    }

    fn len(&self) -> usize {
        self.spec.labels.len()
    }
}

/// A batch of images and binary targets.
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// `[batch, 3, height, width]`.
    pub images: Tensor<B, 4>,
    /// `[batch, 1]` labels.
    pub targets: Tensor<B, 2, Int>,
}

/// Stacks items into an [`ImageBatch`].
#[derive(Debug, Clone, Copy)]
pub struct ImageBatcher {
    image_size: [usize; 2],
}

impl ImageBatcher {
    /// Creates a batcher for `[height, width]` images.
    #[must_use]
    pub fn new(image_size: [usize; 2]) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let [height, width] = self.image_size;

        let mut images_data = Vec::with_capacity(batch_size * CHANNELS * height * width);
        let mut targets_data = Vec::with_capacity(batch_size);
        for item in items {
            images_data.extend(item.image);
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, CHANNELS, height, width]),
            device,
        );
        let targets =
            Tensor::<B, 2, Int>::from_data(TensorData::new(targets_data, [batch_size, 1]), device);

        ImageBatch { images, targets }
    }
}

/// Splits `0..len` into batches of at most `batch_size` indices, shuffled
/// first when an RNG is given. The last batch may be short.
pub fn batch_indices<R: Rng + ?Sized>(
    len: usize,
    batch_size: usize,
    rng: Option<&mut R>,
) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..len).collect();
    if let Some(rng) = rng {
        indices.shuffle(rng);
    }
    indices
        .chunks(batch_size.max(1))
        .map(<[usize]>::to_vec)
        .collect()
}
