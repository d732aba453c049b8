//! Training hooks: best checkpoint, CSV curve log, early stopping and
//! learning-rate decay on plateau.
//!
//! The callbacks stage serializes a list of [`CallbackSpec`]s; the training
//! stage reads it back and instantiates each spec as a [`TrainingCallback`].

use crate::config::CallbacksConfig;
use crate::errors::{PipelineError, Result};
use crate::utils::{ensure_parent, load_json, save_json};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Columns of the training log CSV.
pub const TRAINING_LOG_COLUMNS: [&str; 6] = ["epoch", "accuracy", "learning_rate", "loss", "val_accuracy", "val_loss"];

/// Minimum decrease of the monitored loss counted as improvement on plateau.
const PLATEAU_MIN_DELTA: f64 = 1e-4;

/// Metrics of one finished epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Mean training loss.
    pub loss: f64,
    /// Training accuracy.
    pub accuracy: f64,
    /// Mean validation loss.
    pub val_loss: f64,
    /// Validation accuracy.
    pub val_accuracy: f64,
    /// Learning rate used during the epoch.
    pub learning_rate: f64,
}

/// Quantity a callback watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    /// Lower is better.
    ValLoss,
    /// Higher is better.
    ValAccuracy,
}

impl Monitor {
    /// Reads the monitored value.
    #[must_use]
    pub fn value(self, logs: &EpochLogs) -> f64 {
        match self {
            Self::ValLoss => logs.val_loss,
            Self::ValAccuracy => logs.val_accuracy,
        }
    }

    /// Whether `current` beats `best` by more than `min_delta`.
    #[must_use]
    pub fn improved(self, current: f64, best: Option<f64>, min_delta: f64) -> bool {
        match (self, best) {
            (_, None) => !current.is_nan(),
            (Self::ValLoss, Some(best)) => current < best - min_delta,
            (Self::ValAccuracy, Some(best)) => current > best + min_delta,
        }
    }
}

/// Requests a callback can make to the fit loop.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingControl {
    /// Stop after the current epoch.
    pub stop_training: bool,
    /// Learning rate for the next epoch.
    pub learning_rate: f64,
    /// Save the model under this prefix.
    pub checkpoint: Option<PathBuf>,
}

impl TrainingControl {
    /// Fresh control block for the given learning rate.
    #[must_use]
    pub fn new(learning_rate: f64) -> Self {
        Self {
            stop_training: false,
            learning_rate,
            checkpoint: None,
        }
    }
}

/// A hook called by the fit loop.
pub trait TrainingCallback: Send + Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Called once before the first epoch.
    fn on_train_begin(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called after validation of every epoch.
    fn on_epoch_end(&mut self, logs: &EpochLogs, control: &mut TrainingControl) -> Result<()>;
}

/// Serializable description of one callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallbackSpec {
    /// Saves the model when the monitored value improves.
    ModelCheckpoint {
        /// Checkpoint directory.
        dir: PathBuf,
        /// Watched value.
        monitor: Monitor,
        /// Only save on improvement.
        save_best_only: bool,
    },
    /// Appends every epoch to a CSV file.
    TrainingLogger {
        /// CSV path.
        path: PathBuf,
    },
    /// Stops when the monitored value stalls.
    EarlyStopping {
        /// Watched value.
        monitor: Monitor,
        /// Epochs without improvement tolerated.
        patience: usize,
    },
    /// Decays the learning rate when the monitored value stalls.
    ReduceLrOnPlateau {
        /// Watched value.
        monitor: Monitor,
        /// Multiplier applied to the learning rate.
        factor: f64,
        /// Epochs without improvement tolerated.
        patience: usize,
        /// Learning-rate floor.
        min_lr: f64,
    },
}

impl CallbackSpec {
    /// Builds the runtime callback.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn TrainingCallback> {
        match self.clone() {
            Self::ModelCheckpoint {
                dir,
                monitor,
                save_best_only,
            } => Box::new(ModelCheckpoint::new(dir, monitor, save_best_only)),
            Self::TrainingLogger { path } => Box::new(TrainingLogger::new(path)),
            Self::EarlyStopping { monitor, patience } => Box::new(EarlyStopping::new(monitor, patience)),
            Self::ReduceLrOnPlateau {
                monitor,
                factor,
                patience,
                min_lr,
            } => Box::new(ReduceLrOnPlateau::new(monitor, factor, patience, min_lr)),
        }
    }
}

/// Saves `model-{epoch:02}-{val_accuracy:.2}` under `dir` on improvement.
#[derive(Debug)]
pub struct ModelCheckpoint {
    dir: PathBuf,
    monitor: Monitor,
    save_best_only: bool,
    best: Option<f64>,
}

impl ModelCheckpoint {
    /// Creates the callback.
    #[must_use]
    pub fn new(dir: PathBuf, monitor: Monitor, save_best_only: bool) -> Self {
        Self {
            dir,
            monitor,
            save_best_only,
            best: None,
        }
    }
}

impl TrainingCallback for ModelCheckpoint {
    fn name(&self) -> &'static str {
        "model_checkpoint"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, control: &mut TrainingControl) -> Result<()> {
        let current = self.monitor.value(logs);
        let improved = self.monitor.improved(current, self.best, 0.0);
        if improved {
            self.best = Some(current);
        }
        if improved || !self.save_best_only {
            let path = self
                .dir
                .join(format!("model-{:02}-{:.2}", logs.epoch + 1, logs.val_accuracy));
            info!(
                "Epoch {}: {:?} improved to {current:.5}, saving model to {}",
                logs.epoch + 1,
                self.monitor,
                path.display()
            );
            control.checkpoint = Some(path);
        }
        Ok(())
    }
}

/// Writes one CSV row per epoch.
#[derive(Debug)]
pub struct TrainingLogger {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
}

impl TrainingLogger {
    /// Creates the callback.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path, writer: None }
    }
}

impl TrainingCallback for TrainingLogger {
    fn name(&self) -> &'static str {
        "training_logger"
    }

    fn on_train_begin(&mut self) -> Result<()> {
        ensure_parent(&self.path)?;
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(TRAINING_LOG_COLUMNS)?;
        writer.flush().map_err(|e| PipelineError::io(&self.path, e))?;
        self.writer = Some(writer);
        Ok(())
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, _control: &mut TrainingControl) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(PipelineError::Model(format!(
                "training log {} written before training began",
                self.path.display()
            )));
        };
        writer.serialize((
            logs.epoch,
            logs.accuracy,
            logs.learning_rate,
            logs.loss,
            logs.val_accuracy,
            logs.val_loss,
        ))?;
        writer.flush().map_err(|e| PipelineError::io(&self.path, e))
    }
}

/// Stops training after `patience` epochs without improvement.
#[derive(Debug)]
pub struct EarlyStopping {
    monitor: Monitor,
    patience: usize,
    best: Option<f64>,
    wait: usize,
}

impl EarlyStopping {
    /// Creates the callback.
    #[must_use]
    pub fn new(monitor: Monitor, patience: usize) -> Self {
        Self {
            monitor,
            patience,
            best: None,
            wait: 0,
        }
    }
}

impl TrainingCallback for EarlyStopping {
    fn name(&self) -> &'static str {
        "early_stopping"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, control: &mut TrainingControl) -> Result<()> {
        let current = self.monitor.value(logs);
        if self.monitor.improved(current, self.best, 0.0) {
            self.best = Some(current);
            self.wait = 0;
            return Ok(());
        }
        self.wait += 1;
        if self.wait >= self.patience {
            info!("Epoch {}: early stopping", logs.epoch + 1);
            control.stop_training = true;
        }
        Ok(())
    }
}

/// Multiplies the learning rate by `factor` after `patience` stalled epochs,
/// never going below `min_lr`.
#[derive(Debug)]
pub struct ReduceLrOnPlateau {
    monitor: Monitor,
    factor: f64,
    patience: usize,
    min_lr: f64,
    best: Option<f64>,
    wait: usize,
}

impl ReduceLrOnPlateau {
    /// Creates the callback.
    #[must_use]
    pub fn new(monitor: Monitor, factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            monitor,
            factor,
            patience,
            min_lr,
            best: None,
            wait: 0,
        }
    }
}

impl TrainingCallback for ReduceLrOnPlateau {
    fn name(&self) -> &'static str {
        "reduce_lr_on_plateau"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, control: &mut TrainingControl) -> Result<()> {
        let current = self.monitor.value(logs);
        if self.monitor.improved(current, self.best, PLATEAU_MIN_DELTA) {
            self.best = Some(current);
            self.wait = 0;
            return Ok(());
        }
        self.wait += 1;
        if self.wait >= self.patience && control.learning_rate > self.min_lr {
            let reduced = (control.learning_rate * self.factor).max(self.min_lr);
            info!(
                "Epoch {}: ReduceLROnPlateau reducing learning rate to {reduced}.",
                logs.epoch + 1
            );
            control.learning_rate = reduced;
            self.wait = 0;
        }
        Ok(())
    }
}

/// Builds and persists the callback list.
#[derive(Debug, Clone)]
pub struct Callbacks {
    config: CallbacksConfig,
}

impl Callbacks {
    /// Creates the component.
    #[must_use]
    pub fn new(config: CallbacksConfig) -> Self {
        Self { config }
    }

    /// The fixed callback set for this configuration.
    #[must_use]
    pub fn get_callbacks(&self) -> Vec<CallbackSpec> {
        let config = &self.config;
        vec![
            CallbackSpec::ModelCheckpoint {
                dir: config.checkpoint_dir(),
                monitor: Monitor::ValAccuracy,
                save_best_only: true,
            },
            CallbackSpec::TrainingLogger {
                path: config.log_dir().join("training_log.csv"),
            },
            CallbackSpec::EarlyStopping {
                monitor: Monitor::ValLoss,
                patience: config.patience,
            },
            CallbackSpec::ReduceLrOnPlateau {
                monitor: Monitor::ValLoss,
                factor: config.factor,
                patience: config.patience / 2,
                min_lr: config.min_lr,
            },
        ]
    }

    /// Writes the callback list to `callbacks.json`.
    pub fn save_callbacks(&self) -> Result<Vec<CallbackSpec>> {
        let callbacks = self.get_callbacks();
        info!("Callbacks initialized successfully.");
        let path = self.config.callbacks_path();
        save_json(&path, &callbacks)?;
        info!("Callbacks saved to: {}", path.display());
        Ok(callbacks)
    }
}

/// Reads a callback list written by [`Callbacks::save_callbacks`].
pub fn load_callbacks(path: &Path) -> Result<Vec<CallbackSpec>> {
    let callbacks: Vec<CallbackSpec> = load_json(path)?;
    info!(count = callbacks.len(), "Callbacks loaded from: {}", path.display());
    Ok(callbacks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn logs(epoch: usize, val_loss: f64, val_accuracy: f64) -> EpochLogs {
        EpochLogs {
            epoch,
            loss: 0.5,
            accuracy: 0.7,
            val_loss,
            val_accuracy,
            learning_rate: 0.001,
        }
    }

    fn config(root: &Path) -> CallbacksConfig {
        CallbacksConfig {
            root_dir: root.to_path_buf(),
            patience: 5,
            factor: 0.1,
            min_lr: 1e-6,
        }
    }

    #[test]
    fn test_fixed_callback_set() {
        let dir = tempfile::tempdir().unwrap();
        let callbacks = Callbacks::new(config(dir.path())).get_callbacks();
        assert_eq!(callbacks.len(), 4);
        assert_eq!(
            callbacks[3],
            CallbackSpec::ReduceLrOnPlateau {
                monitor: Monitor::ValLoss,
                factor: 0.1,
                patience: 2,
                min_lr: 1e-6,
            }
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let saved = Callbacks::new(config.clone()).save_callbacks().unwrap();

        let loaded = load_callbacks(&config.callbacks_path()).unwrap();
        assert_eq!(loaded, saved);
        let json = std::fs::read_to_string(config.callbacks_path()).unwrap();
        assert!(json.contains("\"kind\": \"early_stopping\""));
    }

    #[test]
    fn test_early_stopping_after_patience() {
        let mut callback = EarlyStopping::new(Monitor::ValLoss, 2);
        let mut control = TrainingControl::new(0.001);

        callback.on_epoch_end(&logs(0, 1.0, 0.5), &mut control).unwrap();
        callback.on_epoch_end(&logs(1, 1.1, 0.5), &mut control).unwrap();
        assert!(!control.stop_training);
        callback.on_epoch_end(&logs(2, 1.2, 0.5), &mut control).unwrap();
        assert!(control.stop_training);
    }

    #[test]
    fn test_early_stopping_resets_on_improvement() {
        let mut callback = EarlyStopping::new(Monitor::ValLoss, 2);
        let mut control = TrainingControl::new(0.001);
        for (epoch, loss) in [1.0, 1.1, 0.9, 1.0].into_iter().enumerate() {
            callback.on_epoch_end(&logs(epoch, loss, 0.5), &mut control).unwrap();
        }
        assert!(!control.stop_training);
    }

    #[test]
    fn test_reduce_lr_respects_floor() {
        let mut callback = ReduceLrOnPlateau::new(Monitor::ValLoss, 0.1, 1, 5e-4);
        let mut control = TrainingControl::new(0.001);

        callback.on_epoch_end(&logs(0, 1.0, 0.5), &mut control).unwrap();
        callback.on_epoch_end(&logs(1, 1.0, 0.5), &mut control).unwrap();
        assert!((control.learning_rate - 5e-4).abs() < 1e-12);
        callback.on_epoch_end(&logs(2, 1.0, 0.5), &mut control).unwrap();
        assert!((control.learning_rate - 5e-4).abs() < 1e-12);
    }

    #[test]
    fn test_checkpoint_only_on_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let mut callback = ModelCheckpoint::new(dir.path().to_path_buf(), Monitor::ValAccuracy, true);
        let mut control = TrainingControl::new(0.001);

        callback.on_epoch_end(&logs(0, 1.0, 0.75), &mut control).unwrap();
        assert_eq!(control.checkpoint, Some(dir.path().join("model-01-0.75")));

        control.checkpoint = None;
        callback.on_epoch_end(&logs(1, 1.0, 0.70), &mut control).unwrap();
        assert_eq!(control.checkpoint, None);
    }

    #[test]
    fn test_training_logger_writes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/training_log.csv");
        let mut callback = TrainingLogger::new(path.clone());
        let mut control = TrainingControl::new(0.001);

        callback.on_train_begin().unwrap();
        callback.on_epoch_end(&logs(0, 0.25, 0.5), &mut control).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            content,
            "epoch,accuracy,learning_rate,loss,val_accuracy,val_loss\n0,0.7,0.001,0.5,0.5,0.25\n"
        );
    }

    #[test]
    fn test_spec_instantiates_matching_callback() {
        let spec = CallbackSpec::EarlyStopping {
            monitor: Monitor::ValLoss,
            patience: 3,
        };
        assert_eq!(spec.instantiate().name(), "early_stopping");
    }
}
