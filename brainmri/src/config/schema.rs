//! Typed shape of the two YAML documents.
//!
//! Sections are optional at the document level so a partial configuration can
//! drive a single stage; a section that a stage needs but that is absent is
//! reported as [`ConfigError::MissingKey`](crate::errors::ConfigError) by the
//! accessor. Fields inside a present section are validated at load time.
//! Field names mirror the YAML keys one to one.

#![allow(missing_docs)]

use crate::model::BackboneLayout;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The resource/path document (`config/config.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDocument {
    /// Top-level artifacts root.
    pub root_dir: Option<PathBuf>,
    /// Fetch stage paths.
    pub data: Option<DataSection>,
    /// Analyze stage paths.
    pub info: Option<InfoSection>,
    /// Prepare-datasets stage paths.
    pub prepare_datasets: Option<PrepareDatasetsPaths>,
    /// Augmentation paths.
    pub data_augmentation: Option<AugmentationPaths>,
    /// Base-model stage paths.
    pub base_model: Option<BaseModelPaths>,
    /// Callbacks stage paths.
    pub callbacks: Option<CallbacksPaths>,
    /// Transfer-learning stage paths.
    pub transfer_learning: Option<TransferLearningPaths>,
}

/// The hyperparameter document (`params.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamsDocument {
    /// Dataset split parameters.
    pub prepare_datasets: Option<PrepareDatasetsParams>,
    /// Augmentation toggles and strengths.
    pub data_augmentation: Option<AugmentationParams>,
    /// Backbone and fine-tuning parameters.
    pub base_model: Option<BaseModelParams>,
    /// Training hook parameters.
    pub callbacks: Option<CallbacksParams>,
    /// Fit-loop parameters.
    pub transfer_learning: Option<TransferLearningParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSection {
    pub root_dir: PathBuf,
    pub filepath: PathBuf,
    pub extract_path: PathBuf,
    pub data_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InfoSection {
    pub root_dir: PathBuf,
    pub data_folder: PathBuf,
    pub image_quality_and_format: PathBuf,
    pub image_counts_path: PathBuf,
    pub image_metadata_path: PathBuf,
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<String>,
    pub image_samples_path: PathBuf,
    pub image_stats_results_path: PathBuf,
    pub plots_path: PathBuf,
    #[serde(default = "default_samples_per_class")]
    pub samples_per_class: usize,
}

fn default_allowed_formats() -> Vec<String> {
    vec!["JPEG".to_string(), "PNG".to_string()]
}

const fn default_samples_per_class() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrepareDatasetsPaths {
    pub root_dir: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub save_dir: PathBuf,
}

/// How class labels are obtained from the image directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// One class per subdirectory, sorted by name.
    #[default]
    Inferred,
}

/// Which splits the prepare stage persists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subset {
    /// Training and validation.
    #[default]
    Both,
    /// Training split only.
    Training,
    /// Validation split only.
    Validation,
}

impl Subset {
    /// Whether the training split is persisted.
    #[must_use]
    pub const fn includes_training(self) -> bool {
        matches!(self, Self::Both | Self::Training)
    }

    /// Whether the validation split is persisted.
    #[must_use]
    pub const fn includes_validation(self) -> bool {
        matches!(self, Self::Both | Self::Validation)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrepareDatasetsParams {
    pub validation_split: f64,
    pub image_size: [usize; 2],
    pub batch_size: usize,
    #[serde(default)]
    pub labels: LabelSource,
    #[serde(default)]
    pub subset: Subset,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AugmentationPaths {
    pub training_dir: PathBuf,
    pub preview_path: Option<PathBuf>,
}

/// Augmentation toggles and strengths. Defaults match the reference
/// training recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AugmentationParams {
    pub random_flip_horizontal: bool,
    pub random_flip_vertical: bool,
    pub random_rotation: bool,
    pub random_zoom_height: bool,
    pub random_zoom_width: bool,
    pub random_brightness: bool,
    pub random_contrast: bool,
    pub random_translation_height: bool,
    pub random_translation_width: bool,
    pub random_rotation_factor: f64,
    pub random_zoom_height_factor: f64,
    pub random_zoom_width_factor: f64,
    pub random_brightness_factor: f64,
    pub random_contrast_lower_factor: f64,
    pub random_contrast_upper_factor: f64,
    pub random_translation_height_factor: f64,
    pub random_translation_width_factor: f64,
}

impl Default for AugmentationParams {
    fn default() -> Self {
        Self {
            random_flip_horizontal: true,
            random_flip_vertical: false,
            random_rotation: true,
            random_zoom_height: true,
            random_zoom_width: false,
            random_brightness: true,
            random_contrast: true,
            random_translation_height: true,
            random_translation_width: true,
            random_rotation_factor: 0.2,
            random_zoom_height_factor: 0.2,
            random_zoom_width_factor: 0.0,
            random_brightness_factor: 0.2,
            random_contrast_lower_factor: 0.8,
            random_contrast_upper_factor: 1.2,
            random_translation_height_factor: 0.2,
            random_translation_width_factor: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseModelPaths {
    pub root_dir: PathBuf,
    pub weights_path: Option<PathBuf>,
    pub weights_url: Option<String>,
}

/// Source of the backbone's initial weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightsSource {
    /// Pretrained ImageNet weights loaded from `base_model.weights_path`.
    #[default]
    Imagenet,
    /// Random initialization.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseModelParams {
    #[serde(default)]
    pub weights: WeightsSource,
    #[serde(default)]
    pub include_top: bool,
    pub input_shape: [usize; 3],
    #[serde(default)]
    pub fine_tune_at: usize,
    #[serde(default = "default_true")]
    pub use_augmentation: bool,
    #[serde(default)]
    pub backbone: BackboneLayout,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallbacksPaths {
    pub root_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallbacksParams {
    pub patience: usize,
    pub factor: f64,
    pub min_lr: f64,
}

impl Default for CallbacksParams {
    fn default() -> Self {
        Self {
            patience: 5,
            factor: 0.1,
            min_lr: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferLearningPaths {
    pub root_dir: PathBuf,
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
    pub base_model_path: PathBuf,
    pub callback_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferLearningParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}
