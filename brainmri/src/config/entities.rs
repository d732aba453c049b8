//! Immutable parameter objects handed to each component.

use super::schema::{AugmentationParams, LabelSource, Subset, WeightsSource};
use crate::model::BackboneLayout;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parameters of the fetch component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchDataConfig {
    /// Stage output root.
    pub root_dir: PathBuf,
    /// Directory the archive is downloaded into.
    pub filepath: PathBuf,
    /// Directory the archive is extracted into.
    pub extract_path: PathBuf,
    /// Remote archive URL.
    pub data_url: String,
}

impl FetchDataConfig {
    /// Location of the downloaded archive.
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.filepath.join("file.zip")
    }
}

/// Parameters of the analyze component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeDataConfig {
    /// Root of the labeled image tree.
    pub data_folder: PathBuf,
    /// Quality and format report.
    pub image_quality_and_format: PathBuf,
    /// Class-balance report.
    pub image_counts_path: PathBuf,
    /// Metadata CSV.
    pub image_metadata_path: PathBuf,
    /// Accepted container formats (upper-case, e.g. `PNG`).
    pub allowed_formats: Vec<String>,
    /// Sample grid image.
    pub image_samples_path: PathBuf,
    /// Descriptive statistics text.
    pub image_stats_results_path: PathBuf,
    /// Directory for the five chart images.
    pub plots_path: PathBuf,
    /// Images drawn per class for the sample grid.
    pub samples_per_class: usize,
}

/// Parameters of the prepare-datasets component.
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareDatasetsConfig {
    /// Root of the labeled image tree.
    pub data_dir: PathBuf,
    /// Where class names and the serialized splits are written.
    pub save_dir: PathBuf,
    /// Fraction of samples held out for validation.
    pub validation_split: f64,
    /// Target `[height, width]`.
    pub image_size: [usize; 2],
    /// Batch size recorded with the datasets.
    pub batch_size: usize,
    /// Label discovery mode.
    pub labels: LabelSource,
    /// Which splits to persist.
    pub subset: Subset,
    /// Shuffle seed.
    pub seed: u64,
}

impl PrepareDatasetsConfig {
    /// Directory of the serialized training split.
    #[must_use]
    pub fn train_dir(&self) -> PathBuf {
        self.save_dir.join("train_dataset")
    }

    /// Directory of the serialized validation split.
    #[must_use]
    pub fn val_dir(&self) -> PathBuf {
        self.save_dir.join("val_dataset")
    }

    /// Class-name ordering file.
    #[must_use]
    pub fn class_names_path(&self) -> PathBuf {
        self.save_dir.join("class_names.txt")
    }
}

/// Parameters of the augmentation builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Serialized training split used for the preview grid.
    pub training_dir: PathBuf,
    /// Preview grid output, if one should be written.
    pub preview_path: Option<PathBuf>,
    /// Layer toggles and strengths.
    pub params: AugmentationParams,
}

/// Parameters of the base-model component.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseModelConfig {
    /// Output directory for summary, diagram and untrained model.
    pub root_dir: PathBuf,
    /// Initial backbone weights.
    pub weights: WeightsSource,
    /// Pretrained backbone weights, required for [`WeightsSource::Imagenet`].
    /// A `.safetensors` file in the torchvision layout or a burn record prefix.
    pub weights_path: Option<PathBuf>,
    /// Where to download `weights_path` from when it is absent.
    pub weights_url: Option<String>,
    /// Whether the backbone keeps its ImageNet classifier. Only `false` is supported.
    pub include_top: bool,
    /// `[height, width, channels]`.
    pub input_shape: [usize; 3],
    /// First backbone layer left trainable; `0` freezes the whole backbone.
    pub fine_tune_at: usize,
    /// Whether training batches are augmented.
    pub use_augmentation: bool,
    /// Backbone widths.
    pub backbone: BackboneLayout,
    /// Augmentation parameters.
    pub augmentation: AugmentationConfig,
}

impl BaseModelConfig {
    /// Prefix of the untrained model artifact (`.json` and `.mpk`).
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.root_dir.join("base_model")
    }

    /// Textual model summary.
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.root_dir.join("model_summary.txt")
    }

    /// Structural diagram.
    #[must_use]
    pub fn plot_path(&self) -> PathBuf {
        self.root_dir.join("model_plot.svg")
    }
}

/// Parameters of the callbacks component.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbacksConfig {
    /// Output directory; checkpoints and logs live beneath it.
    pub root_dir: PathBuf,
    /// Early-stopping patience in epochs.
    pub patience: usize,
    /// Learning-rate decay factor on plateau.
    pub factor: f64,
    /// Learning-rate floor.
    pub min_lr: f64,
}

impl CallbacksConfig {
    /// Best-checkpoint directory.
    #[must_use]
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.root_dir.join("ckpt")
    }

    /// Training-curve log directory.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.root_dir.join("logs")
    }

    /// Serialized callback list.
    #[must_use]
    pub fn callbacks_path(&self) -> PathBuf {
        self.root_dir.join("callbacks.json")
    }
}

/// Parameters of the transfer-learning component.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferLearningConfig {
    /// Output directory for the trained model and curves.
    pub root_dir: PathBuf,
    /// Serialized training split.
    pub train_dir: PathBuf,
    /// Serialized validation split.
    pub val_dir: PathBuf,
    /// Prefix of the untrained model artifact.
    pub base_model_path: PathBuf,
    /// Number of epochs.
    pub epochs: usize,
    /// Batch size used by the fit loop.
    pub batch_size: usize,
    /// Initial learning rate.
    pub learning_rate: f64,
    /// Serialized callback list.
    pub callback_path: PathBuf,
}

impl TransferLearningConfig {
    /// Prefix of the trained model artifact.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.root_dir.join("model")
    }
}
