//! Fit loop of the transfer-learning stage.
//!
//! [`TransferLearning::compile`] reloads everything the earlier stages wrote
//! and yields a [`CompiledModel`]; [`CompiledModel::fit`] consumes it and
//! yields a [`TrainedModel`]. There is no way back from trained to compiled.

use super::callbacks::{load_callbacks, EpochLogs, TrainingCallback, TrainingControl};
use super::dataset::{batch_indices, ImageBatcher, ImageDataset, ImageItem};
use crate::backend::{default_device, InferenceBackend, TrainingBackend};
use crate::charts::{self, DataSeries, PALETTE};
use crate::config::TransferLearningConfig;
use crate::errors::{PipelineError, Result};
use crate::model::{self, BrainClassifier, ClassifierConfig};
use crate::utils::save_json;
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    nn::loss::BinaryCrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::Backend, ElementConversion, Int, Tensor},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Logits at or above zero are a positive prediction, i.e. probability 0.5.
const DECISION_LOGIT: f32 = 0.0;

/// Per-epoch metric curves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// Mean training loss.
    pub loss: Vec<f64>,
    /// Training accuracy.
    pub accuracy: Vec<f64>,
    /// Mean validation loss.
    pub val_loss: Vec<f64>,
    /// Validation accuracy.
    pub val_accuracy: Vec<f64>,
    /// Learning rate used in each epoch.
    pub learning_rate: Vec<f64>,
}

impl History {
    fn push(&mut self, logs: &EpochLogs) {
        self.loss.push(logs.loss);
        self.accuracy.push(logs.accuracy);
        self.val_loss.push(logs.val_loss);
        self.val_accuracy.push(logs.val_accuracy);
        self.learning_rate.push(logs.learning_rate);
    }

    /// Number of completed epochs.
    #[must_use]
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }
}

/// Loads the artifacts of the previous stages.
#[derive(Debug, Clone)]
pub struct TransferLearning {
    config: TransferLearningConfig,
}

impl TransferLearning {
    /// Creates the component.
    #[must_use]
    pub fn new(config: TransferLearningConfig) -> Self {
        Self { config }
    }

    /// Reloads datasets, base model and callbacks and sets up the loss and
    /// optimizer.
    pub fn compile(self) -> Result<CompiledModel> {
        self.compile_inner().map_err(|e| {
            error!(error = %e, "Error compiling model");
            e
        })
    }

    fn compile_inner(self) -> Result<CompiledModel> {
        let config = self.config;
        let device = default_device();

        let train = ImageDataset::load(&config.train_dir)?;
        let validation = ImageDataset::load(&config.val_dir)?;
        info!(
            train = train.len(),
            validation = validation.len(),
            "Datasets loaded"
        );
        if train.is_empty() || validation.is_empty() {
            return Err(PipelineError::Dataset(
                "training and validation splits must both contain images".to_string(),
            ));
        }
        if train.class_names().len() > 2 {
            return Err(PipelineError::Dataset(format!(
                "binary classifier cannot learn {} classes",
                train.class_names().len()
            )));
        }

        let (classifier, model) = model::load_model::<TrainingBackend>(&config.base_model_path, &device)?;
        for dataset in [&train, &validation] {
            if dataset.image_size() != classifier.image_size() {
                return Err(PipelineError::Dataset(format!(
                    "images are {:?} but the model expects {:?}",
                    dataset.image_size(),
                    classifier.image_size()
                )));
            }
        }

        let callbacks: Vec<Box<dyn TrainingCallback>> = load_callbacks(&config.callback_path)?
            .iter()
            .map(|spec| spec.instantiate())
            .collect();

        info!(
            "Model compiled: loss=binary_crossentropy, optimizer=adam(learning_rate={}), metrics=[accuracy@0.5]",
            config.learning_rate
        );
        Ok(CompiledModel {
            config,
            classifier,
            model,
            train,
            validation,
            callbacks,
        })
    }
}

/// A model ready to train.
pub struct CompiledModel {
    config: TransferLearningConfig,
    classifier: ClassifierConfig,
    model: BrainClassifier<TrainingBackend>,
    train: ImageDataset,
    validation: ImageDataset,
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl fmt::Debug for CompiledModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledModel")
            .field("config", &self.config)
            .field("train", &self.train.len())
            .field("validation", &self.validation.len())
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

impl CompiledModel {
    /// Runs the configured number of epochs, or fewer if a callback stops
    /// training.
    pub fn fit(self) -> Result<TrainedModel> {
        self.fit_inner().map_err(|e| {
            error!(error = %e, "Error during training");
            e
        })
    }

    fn fit_inner(self) -> Result<TrainedModel> {
        let Self {
            config,
            classifier,
            mut model,
            train,
            validation,
            mut callbacks,
        } = self;
        let device = default_device();
        let image_size = classifier.image_size();
        let batcher = ImageBatcher::new(image_size);
        let loss_fn = BinaryCrossEntropyLossConfig::new().with_logits(true).init(&device);
        let mut optimizer = AdamConfig::new().init();
        let mut rng = rand::thread_rng();
        let augmentation = classifier.training_augmentation();

        let train_batch = recorded_batch_size(&train, config.batch_size);
        let val_batch = recorded_batch_size(&validation, config.batch_size);

        let mut control = TrainingControl::new(config.learning_rate);
        let mut history = History::default();
        for callback in &mut callbacks {
            callback.on_train_begin()?;
        }

        for epoch in 0..config.epochs {
            let learning_rate = control.learning_rate;
            info!("Epoch {}/{}", epoch + 1, config.epochs);

            let mut loss_sum = 0.0;
            let mut correct = 0;
            for indices in batch_indices(train.len(), train_batch, Some(&mut rng)) {
                let items: Vec<ImageItem> = indices
                    .iter()
                    .filter_map(|&i| train.get(i))
                    .map(|mut item| {
                        if let Some(pipeline) = augmentation {
                            item.image = pipeline.apply(&item.image, image_size, &mut rng);
                        }
                        item
                    })
                    .collect();
                let count = items.len();
                let batch = Batcher::<TrainingBackend, _, _>::batch(&batcher, items, &device);

                let logits = model.forward(batch.images);
                correct += count_correct(logits.clone(), batch.targets.clone());
                let loss = loss_fn.forward(logits, batch.targets);
                let batch_loss: f64 = loss.clone().into_scalar().elem();
                loss_sum += batch_loss * count as f64;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(learning_rate, model, grads);
            }

            let (val_loss, val_accuracy) = evaluate(&model.valid(), &validation, batcher, val_batch, &device);
            let logs = EpochLogs {
                epoch,
                loss: loss_sum / train.len() as f64,
                accuracy: correct as f64 / train.len() as f64,
                val_loss,
                val_accuracy,
                learning_rate,
            };
            info!(
                "loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4} - learning_rate: {}",
                logs.loss, logs.accuracy, logs.val_loss, logs.val_accuracy, logs.learning_rate
            );
            history.push(&logs);

            for callback in &mut callbacks {
                callback.on_epoch_end(&logs, &mut control)?;
            }
            if let Some(prefix) = control.checkpoint.take() {
                model::save_model(model.valid(), &classifier, &prefix)?;
            }
            if control.stop_training {
                info!("Training stopped after {} epochs", epoch + 1);
                break;
            }
        }

        Ok(TrainedModel {
            config,
            classifier,
            model: model.valid(),
            history,
        })
    }
}

/// Batch size the dataset was prepared with. A differing configured value
/// is reported and ignored.
fn recorded_batch_size(dataset: &ImageDataset, configured: usize) -> usize {
    let recorded = dataset.spec().batch_size;
    if recorded != configured {
        warn!(
            recorded,
            configured, "transfer_learning.batch_size differs from the prepared datasets; using the recorded batch size"
        );
    }
    recorded
}

/// Mean loss and accuracy over `dataset`, without gradients.
fn evaluate<B: Backend>(
    model: &BrainClassifier<B>,
    dataset: &ImageDataset,
    batcher: ImageBatcher,
    batch_size: usize,
    device: &B::Device,
) -> (f64, f64) {
    let loss_fn = BinaryCrossEntropyLossConfig::new().with_logits(true).init(device);
    let mut loss_sum = 0.0;
    let mut correct = 0;
    for indices in batch_indices::<rand::rngs::ThreadRng>(dataset.len(), batch_size, None) {
        let items: Vec<ImageItem> = indices.iter().filter_map(|&i| dataset.get(i)).collect();
        let count = items.len();
        let batch = Batcher::<B, _, _>::batch(&batcher, items, device);
        let logits = model.forward(batch.images);
        correct += count_correct(logits.clone(), batch.targets.clone());
        let batch_loss: f64 = loss_fn.forward(logits, batch.targets).into_scalar().elem();
        loss_sum += batch_loss * count as f64;
    }
    let total = dataset.len().max(1) as f64;
    (loss_sum / total, correct as f64 / total)
}

/// Predictions at probability 0.5 that match the targets.
fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2, Int>) -> usize {
    let hits: i64 = logits
        .greater_equal_elem(DECISION_LOGIT)
        .int()
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    usize::try_from(hits).unwrap_or_default()
}

/// A trained model and its curves.
#[derive(Debug)]
pub struct TrainedModel {
    config: TransferLearningConfig,
    classifier: ClassifierConfig,
    model: BrainClassifier<InferenceBackend>,
    history: History,
}

impl TrainedModel {
    /// Metric curves of the finished run.
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The trained network.
    #[must_use]
    pub fn model(&self) -> &BrainClassifier<InferenceBackend> {
        &self.model
    }

    /// Writes `model.json`, `model.mpk` and `history.json`.
    pub fn save_model(&self) -> Result<PathBuf> {
        let prefix = self.config.model_path();
        model::save_model(self.model.clone(), &self.classifier, &prefix)?;
        let history_path = self.config.root_dir.join("history.json");
        save_json(&history_path, &self.history)?;
        info!("Training history saved to: {}", history_path.display());
        Ok(prefix)
    }

    /// Writes `accuracy.svg` and `loss.svg`.
    pub fn save_plots(&self) -> Result<()> {
        let history = &self.history;
        let accuracy_path = self.config.root_dir.join("accuracy.svg");
        charts::line_chart(
            "Model Accuracy",
            "Epoch",
            "Accuracy",
            &[
                DataSeries::from_epochs("Train", &history.accuracy, PALETTE[0]),
                DataSeries::from_epochs("Validation", &history.val_accuracy, PALETTE[1]),
            ],
            &accuracy_path,
        )?;
        info!("Accuracy plot saved to: {}", accuracy_path.display());

        let loss_path = self.config.root_dir.join("loss.svg");
        charts::line_chart(
            "Model Loss",
            "Epoch",
            "Loss",
            &[
                DataSeries::from_epochs("Train", &history.loss, PALETTE[0]),
                DataSeries::from_epochs("Validation", &history.val_loss, PALETTE[1]),
            ],
            &loss_path,
        )?;
        info!("Loss plot saved to: {}", loss_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::callbacks::{Callbacks, TRAINING_LOG_COLUMNS};
    use crate::components::dataset::ElementSpec;
    use crate::config::CallbacksConfig;
    use crate::model::BackboneLayout;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn split(dir: &Path, labels: Vec<usize>, size: usize) {
        let paths = labels.iter().enumerate().map(|(i, _)| PathBuf::from(format!("{i}.png"))).collect();
        let pixels = labels
            .iter()
            .flat_map(|&label| vec![if label == 1 { 200u8 } else { 20 }; size * size * 3])
            .collect();
        let spec = ElementSpec {
            image_size: [size, size],
            batch_size: 2,
            class_names: vec!["no".to_string(), "yes".to_string()],
            labels,
            paths,
        };
        ImageDataset::new(spec, pixels).unwrap().save(dir).unwrap();
    }

    fn workspace(root: &Path, epochs: usize, patience: usize) -> TransferLearningConfig {
        split(&root.join("train"), vec![0, 1, 0, 1, 1, 0], 32);
        split(&root.join("val"), vec![0, 1], 32);

        let classifier = ClassifierConfig::new([32, 32, 3], BackboneLayout::Tiny).with_fine_tune_at(11);
        let base = classifier.init::<InferenceBackend>(&default_device());
        model::save_model(base, &classifier, &root.join("base_model/base_model")).unwrap();

        Callbacks::new(CallbacksConfig {
            root_dir: root.join("callbacks"),
            patience,
            factor: 0.5,
            min_lr: 1e-6,
        })
        .save_callbacks()
        .unwrap();

        TransferLearningConfig {
            root_dir: root.join("training"),
            train_dir: root.join("train"),
            val_dir: root.join("val"),
            base_model_path: root.join("base_model/base_model"),
            epochs,
            batch_size: 4,
            learning_rate: 1e-3,
            callback_path: root.join("callbacks/callbacks.json"),
        }
    }

    #[test]
    fn test_recorded_batch_size_wins_over_configured() {
        let dir = tempfile::tempdir().unwrap();
        split(&dir.path().join("train"), vec![0, 1, 0], 32);
        let dataset = ImageDataset::load(&dir.path().join("train")).unwrap();

        assert_eq!(recorded_batch_size(&dataset, 4), 2);
        assert_eq!(recorded_batch_size(&dataset, 2), 2);
    }

    #[test]
    fn test_count_correct_thresholds_at_half() {
        let device = Default::default();
        let logits = Tensor::<InferenceBackend, 2>::from_floats([[2.0], [-1.0], [0.0], [-0.1]], &device);
        let targets = Tensor::<InferenceBackend, 2, Int>::from_ints([[1], [1], [1], [0]], &device);
        assert_eq!(count_correct(logits, targets), 3);
    }

    #[test]
    fn test_fit_writes_model_history_and_plots() {
        let dir = tempfile::tempdir().unwrap();
        let config = workspace(dir.path(), 2, 10);

        let trained = TransferLearning::new(config.clone()).compile().unwrap().fit().unwrap();
        assert_eq!(trained.history().epochs(), 2);
        assert!(trained.history().val_accuracy.iter().all(|a| (0.0..=1.0).contains(a)));

        let prefix = trained.save_model().unwrap();
        trained.save_plots().unwrap();
        assert!(model::artifact_path(&prefix, "mpk").is_file());
        assert!(model::artifact_path(&prefix, "json").is_file());
        assert!(config.root_dir.join("history.json").is_file());
        assert!(config.root_dir.join("accuracy.svg").is_file());
        assert!(config.root_dir.join("loss.svg").is_file());

        let (reloaded, _) = model::load_model::<InferenceBackend>(&prefix, &default_device()).unwrap();
        assert_eq!(reloaded.fine_tune_at, 11);
    }

    #[test]
    fn test_callbacks_log_and_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = workspace(dir.path(), 2, 10);
        TransferLearning::new(config).compile().unwrap().fit().unwrap();

        let log = std::fs::read_to_string(dir.path().join("callbacks/logs/training_log.csv")).unwrap();
        let mut lines = log.lines();
        assert_eq!(lines.next(), Some(TRAINING_LOG_COLUMNS.join(",").as_str()));
        assert_eq!(lines.count(), 2);

        let checkpoints = std::fs::read_dir(dir.path().join("callbacks/ckpt")).unwrap().count();
        assert!(checkpoints >= 2);
    }

    #[test]
    fn test_image_size_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = workspace(dir.path(), 1, 10);
        split(&config.val_dir, vec![0, 1], 40);
        let err = TransferLearning::new(config).compile().unwrap_err();
        assert_eq!(err.kind(), "dataset");
    }

    #[test]
    fn test_missing_callbacks_fail_compile() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = workspace(dir.path(), 1, 10);
        config.callback_path = dir.path().join("nope.json");
        assert!(TransferLearning::new(config).compile().is_err());
    }
}
