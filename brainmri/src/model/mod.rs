//! Binary MRI classifier: VGG16 preprocessing, VGG16 backbone, global
//! average pooling and a single-logit dense head.
//!
//! The classifier is described by a [`ClassifierConfig`] saved next to its
//! record, so a trained or untrained model is always the pair
//! `<prefix>.json` + `<prefix>.mpk`.

pub mod import;
pub mod summary;
pub mod vgg;

pub use import::{convert_torchvision_weights, import_torchvision_backbone, is_safetensors};
pub use summary::{layer_table, render_diagram, render_summary, LayerInfo};
pub use vgg::{BackboneLayout, Vgg16Backbone};

use crate::components::augmentation::AugmentationPipeline;
use crate::errors::{ConfigError, PipelineError, Result};
use crate::utils::ensure_parent;
use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig,
    },
    record::CompactRecorder,
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};
use std::path::{Path, PathBuf};
use tracing::info;

/// ImageNet channel means in BGR order, on the `0..=255` scale.
pub const IMAGENET_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// Smallest spatial input the five pooling stages accept.
pub const MIN_INPUT_SIZE: usize = 32;

/// Architecture, freeze boundary and training-time augmentation.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// `[height, width, channels]`.
    pub input_shape: [usize; 3],
    /// Backbone widths.
    pub layout: BackboneLayout,
    /// First trainable entry of the backbone layer list (input, convolutions
    /// and pools); `0` freezes the backbone.
    #[config(default = "0")]
    pub fine_tune_at: usize,
    /// Whether training batches go through `augmentation`.
    #[config(default = "false")]
    pub use_augmentation: bool,
    /// Training-time augmentation.
    pub augmentation: Option<AugmentationPipeline>,
}

impl ClassifierConfig {
    /// Checks the input shape and the freeze boundary.
    pub fn validate(&self) -> Result<()> {
        let [height, width, channels] = self.input_shape;
        if channels != 3 {
            return Err(ConfigError::invalid("base_model.input_shape", "the backbone expects 3 channels").into());
        }
        if height < MIN_INPUT_SIZE || width < MIN_INPUT_SIZE {
            return Err(ConfigError::invalid(
                "base_model.input_shape",
                format!("height and width must be at least {MIN_INPUT_SIZE}, got {height}x{width}"),
            )
            .into());
        }
        let depth = self.layout.layer_count();
        if self.fine_tune_at > depth {
            return Err(ConfigError::invalid(
                "base_model.fine_tune_at",
                format!("the backbone has {depth} layers, got {}", self.fine_tune_at),
            )
            .into());
        }
        Ok(())
    }

    /// `[height, width]` of the expected images.
    #[must_use]
    pub fn image_size(&self) -> [usize; 2] {
        [self.input_shape[0], self.input_shape[1]]
    }

    /// The augmentation applied to training batches, if enabled.
    #[must_use]
    pub fn training_augmentation(&self) -> Option<&AugmentationPipeline> {
        self.augmentation.as_ref().filter(|_| self.use_augmentation)
    }

    /// Randomly initialized classifier with the freeze boundary applied.
    pub fn init<B: Backend>(&self, device: &B::Device) -> BrainClassifier<B> {
        BrainClassifier {
            backbone: Vgg16Backbone::new(self.layout, self.input_shape[2], device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head: LinearConfig::new(self.layout.output_channels(), 1).init(device),
        }
        .freeze(self.layout, self.fine_tune_at)
    }
}

/// VGG16 transfer-learning classifier producing one logit per image.
#[derive(Module, Debug)]
pub struct BrainClassifier<B: Backend> {
    backbone: Vgg16Backbone<B>,
    pool: AdaptiveAvgPool2d,
    head: Linear<B>,
}

impl<B: Backend> BrainClassifier<B> {
    /// Replaces the backbone, e.g. with pretrained weights.
    #[must_use]
    pub fn with_backbone(self, backbone: Vgg16Backbone<B>) -> Self {
        Self { backbone, ..self }
    }

    /// The convolutional backbone.
    pub fn backbone(&self) -> &Vgg16Backbone<B> {
        &self.backbone
    }

    /// Freezes the backbone up to `fine_tune_at`; the head stays trainable.
    #[must_use]
    pub fn freeze(self, layout: BackboneLayout, fine_tune_at: usize) -> Self {
        Self {
            backbone: self.backbone.freeze(layout, fine_tune_at),
            ..self
        }
    }

    /// `[batch, 3, h, w]` RGB in `0..=255` to `[batch, 1]` logits.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.backbone.forward(preprocess_input(images));
        let [batch, channels, _, _] = x.dims();
        let x = self.pool.forward(x).reshape([batch, channels]);
        self.head.forward(x)
    }

    /// Tumor probability per image.
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(images))
    }
}

/// Converts RGB to BGR and subtracts the ImageNet channel means.
pub fn preprocess_input<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN_BGR, &images.device()).reshape([1, 3, 1, 1]);
    images.flip([1]) - mean
}

/// `<prefix>.<extension>`, keeping any dots already in the prefix
/// (checkpoint names carry the validation accuracy).
#[must_use]
pub fn artifact_path(prefix: &Path, extension: &str) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// Writes `<prefix>.json` and `<prefix>.mpk`.
pub fn save_model<B: Backend>(model: BrainClassifier<B>, config: &ClassifierConfig, prefix: &Path) -> Result<()> {
    let config_path = artifact_path(prefix, "json");
    ensure_parent(&config_path)?;
    config
        .save(&config_path)
        .map_err(|e| PipelineError::io(&config_path, e))?;
    model
        .save_file(artifact_path(prefix, "mpk"), &CompactRecorder::new())
        .map_err(|e| PipelineError::Recorder(format!("{}: {e}", prefix.display())))?;
    info!("Model saved to: {}", prefix.display());
    Ok(())
}

/// Reads a model written by [`save_model`] and re-applies its freeze boundary.
pub fn load_model<B: Backend>(prefix: &Path, device: &B::Device) -> Result<(ClassifierConfig, BrainClassifier<B>)> {
    let config_path = artifact_path(prefix, "json");
    let config = ClassifierConfig::load(&config_path)
        .map_err(|e| PipelineError::Recorder(format!("{}: {e}", config_path.display())))?;
    config.validate()?;
    let model = config
        .init::<B>(device)
        .load_file(artifact_path(prefix, "mpk"), &CompactRecorder::new(), device)
        .map_err(|e| PipelineError::Recorder(format!("{}: {e}", prefix.display())))?
        .freeze(config.layout, config.fine_tune_at);
    info!("Model loaded from: {}", prefix.display());
    Ok((config, model))
}

/// Loads pretrained backbone weights: torchvision/timm `.safetensors`
/// files are imported, anything else is read as a burn record.
pub fn load_backbone<B: Backend>(
    layout: BackboneLayout,
    path: &Path,
    device: &B::Device,
) -> Result<Vgg16Backbone<B>> {
    if is_safetensors(path) {
        return import_torchvision_backbone(layout, path, device);
    }
    Vgg16Backbone::new(layout, 3, device)
        .load_file(path, &CompactRecorder::new(), device)
        .map_err(|e| PipelineError::Recorder(format!("{}: {e}", path.display())))
}
