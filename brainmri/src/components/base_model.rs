//! Composes the untrained classifier and writes its summary, diagram and
//! record.

use super::augmentation::DataAugmentation;
use super::fetch::download_file;
use crate::backend::{default_device, InferenceBackend};
use crate::config::{BaseModelConfig, WeightsSource};
use crate::errors::{ConfigError, PipelineError, Result};
use crate::model::{
    self, artifact_path, is_safetensors, layer_table, render_diagram, render_summary, BackboneLayout,
    ClassifierConfig,
};
use crate::utils::{ensure_parent, write_text};
use burn::module::Module;
use burn::record::CompactRecorder;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// What [`BaseModel::build_model`] produced.
#[derive(Debug, Clone)]
pub struct BuiltModel {
    /// Saved architecture.
    pub classifier: ClassifierConfig,
    /// Text summary as written to disk.
    pub summary: String,
    /// Augmentation preview, when one was written.
    pub preview_path: Option<PathBuf>,
}

/// Builds the VGG16 transfer-learning classifier.
#[derive(Debug, Clone)]
pub struct BaseModel {
    config: BaseModelConfig,
}

impl BaseModel {
    /// Creates the component.
    #[must_use]
    pub fn new(config: BaseModelConfig) -> Self {
        Self { config }
    }

    /// Downloads the pretrained weights from `weights_url` when they are not
    /// on disk yet. Returns the downloaded file, if any.
    pub async fn fetch_weights(&self) -> Result<Option<PathBuf>> {
        let config = &self.config;
        let (WeightsSource::Imagenet, Some(path), Some(url)) =
            (config.weights, config.weights_path.as_ref(), config.weights_url.as_ref())
        else {
            return Ok(None);
        };
        let target = if is_safetensors(path) {
            path.clone()
        } else {
            artifact_path(path, "mpk")
        };
        if target.is_file() {
            info!("Pretrained weights found at: {}", target.display());
            return Ok(None);
        }
        ensure_parent(&target)?;
        download_file(url, &target).await.map_err(|e| {
            error!(url = %url, error = %e, "Error downloading pretrained weights");
            e
        })?;
        Ok(Some(target))
    }

    /// Composes, freezes and persists the model.
    pub fn build_model(&self) -> Result<BuiltModel> {
        self.build_inner().map_err(|e| {
            error!(error = %e, "Error building base model");
            e
        })
    }

    fn build_inner(&self) -> Result<BuiltModel> {
        let config = &self.config;

        let (augmentation, preview_path) = if config.use_augmentation {
            let builder = DataAugmentation::new(config.augmentation.clone());
            let pipeline = builder.augmentation();
            let preview = builder.show_aug(&pipeline, &mut rand::thread_rng())?;
            (Some(pipeline), preview)
        } else {
            (None, None)
        };

        let classifier = ClassifierConfig::new(config.input_shape, config.backbone)
            .with_fine_tune_at(config.fine_tune_at)
            .with_use_augmentation(config.use_augmentation)
            .with_augmentation(augmentation);
        classifier.validate()?;

        let device = default_device();
        let mut network = classifier.init::<InferenceBackend>(&device);
        match config.weights {
            WeightsSource::Imagenet => {
                let path = config
                    .weights_path
                    .as_ref()
                    .ok_or_else(|| ConfigError::missing("config", "base_model.weights_path"))?;
                info!("Loading pretrained backbone from: {}", path.display());
                let backbone = model::load_backbone::<InferenceBackend>(config.backbone, path, &device)?;
                network = network.with_backbone(backbone).freeze(config.backbone, config.fine_tune_at);
            }
            WeightsSource::None => info!("Backbone initialized with random weights"),
        }

        let summary = render_summary(&classifier);
        for line in summary.lines() {
            info!("{line}");
        }
        let summary_path = config.summary_path();
        write_text(&summary_path, &summary)?;
        info!("Model summary saved to: {}", summary_path.display());

        let plot_path = config.plot_path();
        write_text(&plot_path, &render_diagram(&classifier))?;
        info!("Model plot saved to: {}", plot_path.display());

        let rows = layer_table(&classifier);
        let trainable_variables = 2 * rows.iter().filter(|r| r.trainable && r.params > 0).count();
        let base_layers = config.backbone.layer_count();
        info!("Number of trainable variables: {trainable_variables}");
        info!("Number of layers in the base model: {base_layers}");

        model::save_model(network, &classifier, &config.model_path())?;

        Ok(BuiltModel {
            classifier,
            summary,
            preview_path,
        })
    }
}

/// Writes a randomly initialized backbone record, usable as `weights_path`
/// for smoke runs without the ImageNet weights.
pub fn write_random_backbone(layout: BackboneLayout, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let device = default_device();
    model::Vgg16Backbone::<InferenceBackend>::new(layout, 3, &device)
        .save_file(path, &CompactRecorder::new())
        .map_err(|e| PipelineError::Recorder(format!("{}: {e}", path.display())))
}
