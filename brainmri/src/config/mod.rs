//! Configuration loading and per-stage accessors.
//!
//! The [`ConfigurationManager`] parses both YAML documents once, creates every
//! `root_dir` declared anywhere in the resource document, and exposes one
//! `get_*_config` accessor per stage. Each accessor validates its section,
//! creates the stage's output directory, and returns an immutable parameter
//! object.

mod entities;
pub mod schema;

pub use entities::{
    AnalyzeDataConfig, AugmentationConfig, BaseModelConfig, CallbacksConfig, FetchDataConfig,
    PrepareDatasetsConfig, TransferLearningConfig,
};
pub use schema::{AugmentationParams, LabelSource, ParamsDocument, ResourceDocument, Subset, WeightsSource};

use crate::errors::{ConfigError, Result};
use crate::utils::create_directories;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default location of the resource document.
pub const CONFIG_FILE_PATH: &str = "config/config.yaml";

/// Default location of the hyperparameter document.
pub const PARAMS_FILE_PATH: &str = "params.yaml";

/// Environment variable overriding [`CONFIG_FILE_PATH`].
pub const CONFIG_PATH_ENV: &str = "BRAINMRI_CONFIG";

/// Environment variable overriding [`PARAMS_FILE_PATH`].
pub const PARAMS_PATH_ENV: &str = "BRAINMRI_PARAMS";

/// Loaded configuration shared by all stages of a run.
#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    config: ResourceDocument,
    params: ParamsDocument,
}

impl ConfigurationManager {
    /// Loads both documents and creates every declared `root_dir`.
    ///
    /// Directory creation is idempotent, so constructing the manager twice
    /// against the same documents never fails on pre-existing directories.
    pub fn new(config_path: impl AsRef<Path>, params_path: impl AsRef<Path>) -> Result<Self> {
        let (config, raw_config): (ResourceDocument, _) = load_document(config_path.as_ref())?;
        let (params, _): (ParamsDocument, _) = load_document(params_path.as_ref())?;

        let mut roots = Vec::new();
        collect_root_dirs(&raw_config, &mut roots);
        debug!(count = roots.len(), "Creating declared root directories");
        create_directories(&roots)?;

        Ok(Self { config, params })
    }

    /// Loads the documents from their default locations, honoring the
    /// `BRAINMRI_CONFIG` / `BRAINMRI_PARAMS` overrides.
    pub fn from_env() -> Result<Self> {
        let config_path = std::env::var_os(CONFIG_PATH_ENV)
            .map_or_else(|| PathBuf::from(CONFIG_FILE_PATH), PathBuf::from);
        let params_path = std::env::var_os(PARAMS_PATH_ENV)
            .map_or_else(|| PathBuf::from(PARAMS_FILE_PATH), PathBuf::from);
        info!(config = %config_path.display(), params = %params_path.display(), "Loading configuration");
        Self::new(config_path, params_path)
    }

    /// Parameters for the fetch stage.
    pub fn get_fetch_data_config(&self) -> Result<FetchDataConfig> {
        let config = self
            .config
            .data
            .as_ref()
            .ok_or_else(|| ConfigError::missing("config", "data"))?;
        if config.data_url.trim().is_empty() {
            return Err(ConfigError::invalid("data.data_url", "must not be empty").into());
        }
        create_directories(&[&config.root_dir])?;

        Ok(FetchDataConfig {
            root_dir: config.root_dir.clone(),
            filepath: config.filepath.clone(),
            extract_path: config.extract_path.clone(),
            data_url: config.data_url.clone(),
        })
    }

    /// Parameters for the analyze stage.
    pub fn get_analyze_data_config(&self) -> Result<AnalyzeDataConfig> {
        let config = self
            .config
            .info
            .as_ref()
            .ok_or_else(|| ConfigError::missing("config", "info"))?;
        if config.samples_per_class == 0 {
            return Err(ConfigError::invalid("info.samples_per_class", "must be at least 1").into());
        }
        create_directories(&[&config.root_dir, &config.plots_path])?;

        Ok(AnalyzeDataConfig {
            data_folder: config.data_folder.clone(),
            image_quality_and_format: config.image_quality_and_format.clone(),
            image_counts_path: config.image_counts_path.clone(),
            image_metadata_path: config.image_metadata_path.clone(),
            allowed_formats: config
                .allowed_formats
                .iter()
                .map(|f| f.trim().to_ascii_uppercase())
                .collect(),
            image_samples_path: config.image_samples_path.clone(),
            image_stats_results_path: config.image_stats_results_path.clone(),
            plots_path: config.plots_path.clone(),
            samples_per_class: config.samples_per_class,
        })
    }

    /// Parameters for the prepare-datasets stage.
    pub fn get_prepare_datasets_config(&self) -> Result<PrepareDatasetsConfig> {
        let config = self
            .config
            .prepare_datasets
            .as_ref()
            .ok_or_else(|| ConfigError::missing("config", "prepare_datasets"))?;
        let params = self
            .params
            .prepare_datasets
            .as_ref()
            .ok_or_else(|| ConfigError::missing("params", "prepare_datasets"))?;

        if !(params.validation_split > 0.0 && params.validation_split < 1.0) {
            return Err(ConfigError::invalid(
                "prepare_datasets.validation_split",
                format!("must be in (0, 1), got {}", params.validation_split),
            )
            .into());
        }
        if params.batch_size == 0 {
            return Err(ConfigError::invalid("prepare_datasets.batch_size", "must be at least 1").into());
        }
        if params.image_size.contains(&0) {
            return Err(ConfigError::invalid("prepare_datasets.image_size", "dimensions must be positive").into());
        }
        create_directories(&[&config.save_dir])?;

        Ok(PrepareDatasetsConfig {
            data_dir: config.data_dir.clone(),
            save_dir: config.save_dir.clone(),
            validation_split: params.validation_split,
            image_size: params.image_size,
            batch_size: params.batch_size,
            labels: params.labels,
            subset: params.subset,
            seed: params.seed,
        })
    }

    /// Parameters for the augmentation builder.
    pub fn get_data_augmentation_config(&self) -> Result<AugmentationConfig> {
        let config = self
            .config
            .data_augmentation
            .as_ref()
            .ok_or_else(|| ConfigError::missing("config", "data_augmentation"))?;
        let params = self.params.data_augmentation.clone().unwrap_or_default();
        validate_augmentation(&params)?;

        Ok(AugmentationConfig {
            training_dir: config.training_dir.clone(),
            preview_path: config.preview_path.clone(),
            params,
        })
    }

    /// Parameters for the base-model stage.
    pub fn get_base_model_config(&self) -> Result<BaseModelConfig> {
        let config = self
            .config
            .base_model
            .as_ref()
            .ok_or_else(|| ConfigError::missing("config", "base_model"))?;
        let params = self
            .params
            .base_model
            .as_ref()
            .ok_or_else(|| ConfigError::missing("params", "base_model"))?;

        if params.include_top {
            return Err(ConfigError::invalid(
                "base_model.include_top",
                "the ImageNet classifier head cannot be reused for binary classification",
            )
            .into());
        }
        if params.input_shape[2] != 3 {
            return Err(ConfigError::invalid("base_model.input_shape", "the backbone expects 3 channels").into());
        }
        if params.weights == WeightsSource::Imagenet && config.weights_path.is_none() {
            return Err(ConfigError::missing("config", "base_model.weights_path").into());
        }
        let augmentation = self.get_data_augmentation_config()?;
        create_directories(&[&config.root_dir])?;

        Ok(BaseModelConfig {
            root_dir: config.root_dir.clone(),
            weights: params.weights,
            weights_path: config.weights_path.clone(),
            weights_url: config.weights_url.clone().filter(|url| !url.trim().is_empty()),
            include_top: params.include_top,
            input_shape: params.input_shape,
            fine_tune_at: params.fine_tune_at,
            use_augmentation: params.use_augmentation,
            backbone: params.backbone,
            augmentation,
        })
    }

    /// Parameters for the callbacks stage.
    pub fn get_callbacks_config(&self) -> Result<CallbacksConfig> {
        let config = self
            .config
            .callbacks
            .as_ref()
            .ok_or_else(|| ConfigError::missing("config", "callbacks"))?;
        let params = self.params.callbacks.clone().unwrap_or_default();

        if !(params.factor > 0.0 && params.factor < 1.0) {
            return Err(ConfigError::invalid(
                "callbacks.factor",
                format!("must be in (0, 1), got {}", params.factor),
            )
            .into());
        }
        if params.min_lr < 0.0 {
            return Err(ConfigError::invalid("callbacks.min_lr", "must not be negative").into());
        }

        let callbacks = CallbacksConfig {
            root_dir: config.root_dir.clone(),
            patience: params.patience,
            factor: params.factor,
            min_lr: params.min_lr,
        };
        create_directories(&[
            &callbacks.root_dir,
            &callbacks.checkpoint_dir(),
            &callbacks.log_dir(),
        ])?;
        Ok(callbacks)
    }

    /// Parameters for the transfer-learning stage.
    pub fn get_transfer_learning_config(&self) -> Result<TransferLearningConfig> {
        let config = self
            .config
            .transfer_learning
            .as_ref()
            .ok_or_else(|| ConfigError::missing("config", "transfer_learning"))?;
        let params = self
            .params
            .transfer_learning
            .as_ref()
            .ok_or_else(|| ConfigError::missing("params", "transfer_learning"))?;

        if params.epochs == 0 {
            return Err(ConfigError::invalid("transfer_learning.epochs", "must be at least 1").into());
        }
        if params.batch_size == 0 {
            return Err(ConfigError::invalid("transfer_learning.batch_size", "must be at least 1").into());
        }
        if params.learning_rate <= 0.0 {
            return Err(ConfigError::invalid("transfer_learning.learning_rate", "must be positive").into());
        }
        create_directories(&[&config.root_dir])?;

        Ok(TransferLearningConfig {
            root_dir: config.root_dir.clone(),
            train_dir: config.train_dir.clone(),
            val_dir: config.val_dir.clone(),
            base_model_path: config.base_model_path.clone(),
            epochs: params.epochs,
            batch_size: params.batch_size,
            learning_rate: params.learning_rate,
            callback_path: config.callback_path.clone(),
        })
    }
}

fn validate_augmentation(params: &AugmentationParams) -> Result<()> {
    let non_negative = [
        ("random_rotation_factor", params.random_rotation_factor),
        ("random_zoom_height_factor", params.random_zoom_height_factor),
        ("random_zoom_width_factor", params.random_zoom_width_factor),
        ("random_brightness_factor", params.random_brightness_factor),
        ("random_translation_height_factor", params.random_translation_height_factor),
        ("random_translation_width_factor", params.random_translation_width_factor),
    ];
    for (key, value) in non_negative {
        if value < 0.0 {
            return Err(ConfigError::invalid(format!("data_augmentation.{key}"), "must not be negative").into());
        }
    }
    if params.random_contrast_lower_factor > params.random_contrast_upper_factor {
        return Err(ConfigError::invalid(
            "data_augmentation.random_contrast_lower_factor",
            "must not exceed random_contrast_upper_factor",
        )
        .into());
    }
    Ok(())
}

/// Reads and parses a YAML document, returning both the typed and raw forms.
fn load_document<T: DeserializeOwned>(path: &Path) -> Result<(T, serde_yaml::Value)> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    // An empty file parses to null; treat it as an empty mapping.
    let raw = if raw.is_null() {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    } else {
        raw
    };
    let typed = serde_yaml::from_value(raw.clone()).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok((typed, raw))
}

/// Collects every `root_dir` string value at any nesting level.
fn collect_root_dirs(value: &serde_yaml::Value, out: &mut Vec<PathBuf>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, child) in map {
                if key.as_str() == Some("root_dir") {
                    if let Some(dir) = child.as_str() {
                        out.push(PathBuf::from(dir));
                    }
                }
                collect_root_dirs(child, out);
            }
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                collect_root_dirs(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_documents(dir: &TempDir, config: &str, params: &str) -> (PathBuf, PathBuf) {
        let config_path = dir.path().join("config.yaml");
        let params_path = dir.path().join("params.yaml");
        std::fs::write(&config_path, config).unwrap();
        std::fs::write(&params_path, params).unwrap();
        (config_path, params_path)
    }

    fn sample_config(root: &Path) -> String {
        format!(
            r#"
root_dir: {root}/artifacts
data:
  root_dir: {root}/artifacts/data
  filepath: {root}/artifacts/data/download
  extract_path: {root}/artifacts/data/extracted
  data_url: https://example.com/brain.zip
callbacks:
  root_dir: {root}/artifacts/callbacks
transfer_learning:
  root_dir: {root}/artifacts/transfer
  train_dir: {root}/artifacts/prepare/train_dataset
  val_dir: {root}/artifacts/prepare/val_dataset
  base_model_path: {root}/artifacts/base/base_model
  callback_path: {root}/artifacts/callbacks/callbacks.json
"#,
            root = root.display()
        )
    }

    #[test]
    fn test_root_dirs_created_at_every_level() {
        let dir = TempDir::new().unwrap();
        let (config, params) = write_documents(&dir, &sample_config(dir.path()), "");

        ConfigurationManager::new(&config, &params).unwrap();

        assert!(dir.path().join("artifacts").is_dir());
        assert!(dir.path().join("artifacts/data").is_dir());
        assert!(dir.path().join("artifacts/callbacks").is_dir());
        assert!(dir.path().join("artifacts/transfer").is_dir());
    }

    #[test]
    fn test_construction_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (config, params) = write_documents(&dir, &sample_config(dir.path()), "");

        ConfigurationManager::new(&config, &params).unwrap();
        let again = ConfigurationManager::new(&config, &params).unwrap();
        again.get_fetch_data_config().unwrap();
        again.get_fetch_data_config().unwrap();
    }

    #[test]
    fn test_fetch_config_snapshot() {
        let dir = TempDir::new().unwrap();
        let (config, params) = write_documents(&dir, &sample_config(dir.path()), "");
        let manager = ConfigurationManager::new(&config, &params).unwrap();

        let fetch = manager.get_fetch_data_config().unwrap();
        assert_eq!(fetch.data_url, "https://example.com/brain.zip");
        assert_eq!(
            fetch.archive_path(),
            dir.path().join("artifacts/data/download/file.zip")
        );
    }

    #[test]
    fn test_missing_section_is_config_error() {
        let dir = TempDir::new().unwrap();
        let (config, params) = write_documents(&dir, &sample_config(dir.path()), "");
        let manager = ConfigurationManager::new(&config, &params).unwrap();

        let err = manager.get_prepare_datasets_config().unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("prepare_datasets"));
    }

    #[test]
    fn test_missing_field_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let (config, params) = write_documents(
            &dir,
            "data:\n  root_dir: /tmp/x\n  filepath: /tmp/x/d\n  extract_path: /tmp/x/e\n",
            "",
        );

        let err = ConfigurationManager::new(&config, &params).unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("data_url"));
    }

    #[test]
    fn test_missing_document_is_read_error() {
        let dir = TempDir::new().unwrap();
        let err = ConfigurationManager::new(dir.path().join("nope.yaml"), dir.path().join("nope2.yaml"))
            .unwrap_err();
        assert!(matches!(err, crate::errors::PipelineError::Config(ConfigError::Read { .. })));
    }

    #[test]
    fn test_callbacks_defaults_and_directories() {
        let dir = TempDir::new().unwrap();
        let (config, params) = write_documents(&dir, &sample_config(dir.path()), "");
        let manager = ConfigurationManager::new(&config, &params).unwrap();

        let callbacks = manager.get_callbacks_config().unwrap();
        assert_eq!(callbacks.patience, 5);
        assert!(callbacks.checkpoint_dir().is_dir());
        assert!(callbacks.log_dir().is_dir());
    }

    #[test]
    fn test_transfer_params_validated() {
        let dir = TempDir::new().unwrap();
        let (config, params) = write_documents(
            &dir,
            &sample_config(dir.path()),
            "transfer_learning:\n  epochs: 0\n  batch_size: 8\n  learning_rate: 0.001\n",
        );
        let manager = ConfigurationManager::new(&config, &params).unwrap();

        let err = manager.get_transfer_learning_config().unwrap_err();
        assert!(err.to_string().contains("transfer_learning.epochs"));
    }

    #[test]
    fn test_shipped_documents_point_at_downloadable_weights() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
        let (config, _): (ResourceDocument, _) = load_document(&root.join("config/config.yaml")).unwrap();
        let (params, _): (ParamsDocument, _) = load_document(&root.join("params.yaml")).unwrap();

        let base = config.base_model.unwrap();
        assert!(crate::model::is_safetensors(base.weights_path.as_deref().unwrap()));
        assert!(base.weights_url.unwrap().starts_with("https://"));
        assert_eq!(params.base_model.unwrap().fine_tune_at, 10);
    }

    #[test]
    fn test_collect_root_dirs_nested() {
        let value: serde_yaml::Value = serde_yaml::from_str(
            "root_dir: a\nouter:\n  root_dir: b\n  inner:\n    root_dir: c\nlist:\n  - root_dir: d\n",
        )
        .unwrap();
        let mut roots = Vec::new();
        collect_root_dirs(&value, &mut roots);

        let mut names: Vec<_> = roots.iter().map(|p| p.display().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }
}
