//! Stand-in stages for orchestrator tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::{PipelineError, Result};
use crate::stages::Stage;

/// Stage names in the order they ran, shared between several stages.
pub type RunLog = Arc<Mutex<Vec<String>>>;

/// Succeeds without touching the filesystem.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    calls: AtomicUsize,
    log: Option<RunLog>,
}

impl RecordingStage {
    /// Stage named `name` with no run log.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicUsize::new(0),
            log: None,
        }
    }

    /// Appends this stage's name to `log` on every run.
    #[must_use]
    pub fn with_log(mut self, log: RunLog) -> Self {
        self.log = Some(log);
        self
    }

    /// How many times `run` was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().push(self.name.clone());
        }
        Ok(())
    }
}

enum Failure {
    Model(String),
    MissingFile(String),
}

/// Always fails, either as a model error or as a missing input file.
pub struct FailingStage {
    name: String,
    failure: Failure,
}

impl FailingStage {
    /// Fails with [`PipelineError::Model`] carrying `message`.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure: Failure::Model(message.into()),
        }
    }

    /// Fails the way a stage does when an upstream artifact is absent.
    #[must_use]
    pub fn missing_file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure: Failure::MissingFile(path.into()),
        }
    }
}

impl std::fmt::Debug for FailingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailingStage").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<()> {
        Err(match &self.failure {
            Failure::Model(message) => PipelineError::Model(message.clone()),
            Failure::MissingFile(path) => PipelineError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shared_log_keeps_run_order() {
        let log = RunLog::default();
        let fetch = RecordingStage::new("fetch").with_log(log.clone());
        let analyze = RecordingStage::new("analyze").with_log(log.clone());

        fetch.run().await.unwrap();
        analyze.run().await.unwrap();
        fetch.run().await.unwrap();

        assert_eq!(fetch.call_count(), 2);
        assert_eq!(*log.lock(), vec!["fetch", "analyze", "fetch"]);
    }

    #[tokio::test]
    async fn test_failure_kinds() {
        let model = FailingStage::new("train", "nan loss").run().await.unwrap_err();
        assert_eq!(model.kind(), "model");

        let io = FailingStage::missing_file("prepare", "artifacts/train_dataset")
            .run()
            .await
            .unwrap_err();
        assert_eq!(io.kind(), "io");
    }
}
