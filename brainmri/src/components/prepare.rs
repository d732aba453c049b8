//! Splits a labeled image tree into training and validation datasets.

use super::dataset::{ElementSpec, ImageDataset};
use crate::config::PrepareDatasetsConfig;
use crate::errors::{PipelineError, Result};
use crate::utils::write_text;
use image::imageops::FilterType;
use image::ImageReader;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

/// File extensions picked up when indexing a class directory.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["bmp", "gif", "jpeg", "jpg", "png"];

/// One labeled source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Image path.
    pub path: PathBuf,
    /// Index into the class names.
    pub label: usize,
}

/// Class names and samples of an image tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryIndex {
    /// Sorted subdirectory names.
    pub class_names: Vec<String>,
    /// Samples grouped by class, each group sorted by path.
    pub samples: Vec<Sample>,
}

/// Result of a preparation run. A split is `None` when `subset` excludes it.
#[derive(Debug, Clone)]
pub struct PreparedDatasets {
    /// Class names, index = label.
    pub class_names: Vec<String>,
    /// Training split.
    pub train: Option<ImageDataset>,
    /// Validation split.
    pub validation: Option<ImageDataset>,
}

/// Builds the serialized datasets.
#[derive(Debug, Clone)]
pub struct PrepareDatasets {
    config: PrepareDatasetsConfig,
}

impl PrepareDatasets {
    /// Creates the component.
    #[must_use]
    pub fn new(config: PrepareDatasetsConfig) -> Self {
        Self { config }
    }

    /// Indexes, shuffles, splits, decodes and persists the datasets.
    pub fn prepare_datasets(&self) -> Result<PreparedDatasets> {
        self.prepare_inner().map_err(|e| {
            error!(error = %e, "Error preparing datasets");
            e
        })
    }

    fn prepare_inner(&self) -> Result<PreparedDatasets> {
        let config = &self.config;
        info!("Loading image datasets from directory: {}", config.data_dir.display());
        let index = index_directory(&config.data_dir)?;
        info!(
            "Found {} files belonging to {} classes.",
            index.samples.len(),
            index.class_names.len()
        );

        let (train, validation) = split_samples(index.samples, config.validation_split, config.seed);
        info!("Using {} files for training.", train.len());
        info!("Using {} files for validation.", validation.len());

        let class_names_path = config.class_names_path();
        info!("Saving class names to file: {}", class_names_path.display());
        write_text(&class_names_path, &index.class_names.join("\n"))?;
        info!("Class names: {:?}", index.class_names);

        info!("Saving datasets to directory: {}", config.save_dir.display());
        let train = if config.subset.includes_training() {
            let dataset = self.build_split(&train, &index.class_names)?;
            dataset.save(&config.train_dir())?;
            Some(dataset)
        } else {
            None
        };
        let validation = if config.subset.includes_validation() {
            let dataset = self.build_split(&validation, &index.class_names)?;
            dataset.save(&config.val_dir())?;
            Some(dataset)
        } else {
            None
        };

        info!("Datasets prepared successfully");
        Ok(PreparedDatasets {
            class_names: index.class_names,
            train,
            validation,
        })
    }

    fn build_split(&self, samples: &[Sample], class_names: &[String]) -> Result<ImageDataset> {
        let [height, width] = self.config.image_size;
        let mut pixels = Vec::with_capacity(samples.len() * height * width * 3);
        for sample in samples {
            pixels.extend(load_resized(&sample.path, self.config.image_size)?);
        }
        let spec = ElementSpec {
            image_size: self.config.image_size,
            batch_size: self.config.batch_size,
            class_names: class_names.to_vec(),
            labels: samples.iter().map(|s| s.label).collect(),
            paths: samples.iter().map(|s| s.path.clone()).collect(),
        };
        ImageDataset::new(spec, pixels)
    }
}

/// Lists class subdirectories of `root` and the supported images below each.
pub fn index_directory(root: &Path) -> Result<DirectoryIndex> {
    let entries = std::fs::read_dir(root).map_err(|e| PipelineError::io(root, e))?;
    let mut class_dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(root, e))?;
        if entry.path().is_dir() {
            class_dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    class_dirs.sort();

    if class_dirs.is_empty() {
        return Err(PipelineError::Dataset(format!(
            "no class subdirectories found in {}",
            root.display()
        )));
    }

    let mut samples = Vec::new();
    for (label, (_, dir)) in class_dirs.iter().enumerate() {
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| dir.clone(), Path::to_path_buf);
                PipelineError::io(path, std::io::Error::other(e.to_string()))
            })?;
            if entry.file_type().is_file() && is_supported(entry.path()) {
                samples.push(Sample {
                    path: entry.into_path(),
                    label,
                });
            }
        }
    }

    if samples.is_empty() {
        return Err(PipelineError::Dataset(format!(
            "no images with extensions {SUPPORTED_EXTENSIONS:?} found in {}",
            root.display()
        )));
    }

    Ok(DirectoryIndex {
        class_names: class_dirs.into_iter().map(|(name, _)| name).collect(),
        samples,
    })
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Shuffles with a seeded ChaCha8 stream and holds out the last
/// `floor(validation_split * n)` samples for validation.
pub fn split_samples(mut samples: Vec<Sample>, validation_split: f64, seed: u64) -> (Vec<Sample>, Vec<Sample>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let num_val = ((validation_split * samples.len() as f64).floor() as usize).min(samples.len());
    let validation = samples.split_off(samples.len() - num_val);
    (samples, validation)
}

/// Decodes an image to RGB and resizes it bilinearly to `[height, width]`.
pub fn load_resized(path: &Path, image_size: [usize; 2]) -> Result<Vec<u8>> {
    let [height, width] = image_size;
    let to_u32 = |v: usize| {
        u32::try_from(v).map_err(|_| PipelineError::Dataset(format!("image dimension {v} is too large")))
    };

    let img = ImageReader::open(path)
        .map_err(|e| PipelineError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| PipelineError::io(path, e))?
        .decode()
        .map_err(|e| PipelineError::image(path, e))?;

    Ok(img
        .resize_exact(to_u32(width)?, to_u32(height)?, FilterType::Triangle)
        .to_rgb8()
        .into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LabelSource, Subset};
    use crate::testing::{write_image_tree, ImageTreeSpec};
    use pretty_assertions::assert_eq;

    fn config(root: &Path, subset: Subset) -> PrepareDatasetsConfig {
        PrepareDatasetsConfig {
            data_dir: root.join("brain_tumor"),
            save_dir: root.join("prepared"),
            validation_split: 0.2,
            image_size: [8, 8],
            batch_size: 4,
            labels: LabelSource::Inferred,
            subset,
            seed: 123,
        }
    }

    fn tree(root: &Path) {
        write_image_tree(
            &root.join("brain_tumor"),
            &[ImageTreeSpec::png("yes", 6), ImageTreeSpec::png("no", 4)],
        )
        .unwrap();
    }

    #[test]
    fn test_index_sorts_classes_and_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        tree(dir.path());
        std::fs::write(dir.path().join("brain_tumor/no/notes.txt"), "x").unwrap();

        let index = index_directory(&dir.path().join("brain_tumor")).unwrap();
        assert_eq!(index.class_names, vec!["no".to_string(), "yes".to_string()]);
        assert_eq!(index.samples.len(), 10);
        assert!(index.samples[..4].iter().all(|s| s.label == 0));
        assert!(index.samples[0].path.ends_with("no/no_000.png"));
    }

    #[test]
    fn test_index_without_classes_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = index_directory(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "dataset");
    }

    #[test]
    fn test_split_is_deterministic_and_floors() {
        let samples: Vec<Sample> = (0..11)
            .map(|i| Sample {
                path: PathBuf::from(format!("{i}.png")),
                label: i % 2,
            })
            .collect();

        let (train_a, val_a) = split_samples(samples.clone(), 0.2, 42);
        let (train_b, val_b) = split_samples(samples, 0.2, 42);
        assert_eq!(val_a.len(), 2);
        assert_eq!(train_a.len(), 9);
        assert_eq!(train_a, train_b);
        assert_eq!(val_a, val_b);
    }

    #[test]
    fn test_prepare_writes_both_splits() {
        let dir = tempfile::tempdir().unwrap();
        tree(dir.path());
        let config = config(dir.path(), Subset::Both);

        let prepared = PrepareDatasets::new(config.clone()).prepare_datasets().unwrap();
        let train = prepared.train.unwrap();
        let validation = prepared.validation.unwrap();
        assert_eq!(train.spec().labels.len(), 8);
        assert_eq!(validation.spec().labels.len(), 2);
        assert_eq!(train.image_hwc(0).unwrap().len(), 8 * 8 * 3);

        let names = std::fs::read_to_string(config.class_names_path()).unwrap();
        assert_eq!(names, "no\nyes");
        let reloaded = ImageDataset::load(&config.val_dir()).unwrap();
        assert_eq!(reloaded.spec(), validation.spec());
    }

    #[test]
    fn test_subset_training_only() {
        let dir = tempfile::tempdir().unwrap();
        tree(dir.path());
        let config = config(dir.path(), Subset::Training);

        let prepared = PrepareDatasets::new(config.clone()).prepare_datasets().unwrap();
        assert!(prepared.validation.is_none());
        assert!(config.train_dir().join("images.bin").exists());
        assert!(!config.val_dir().exists());
    }

    #[test]
    fn test_corrupt_image_aborts() {
        let dir = tempfile::tempdir().unwrap();
        tree(dir.path());
        std::fs::write(dir.path().join("brain_tumor/yes/broken.png"), b"not a png").unwrap();

        let err = PrepareDatasets::new(config(dir.path(), Subset::Both))
            .prepare_datasets()
            .unwrap_err();
        assert_eq!(err.kind(), "image");
    }
}
