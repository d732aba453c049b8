//! Sequential pipeline execution.

use crate::errors::Result;
use crate::events::{get_event_sink, stage_payload, types, EventSink};
use crate::stages::{Stage, StageResult};
use crate::utils::{generate_uuid, now_utc};
use serde::Serialize;
use serde_json::json;
use std::error::Error as _;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// A validated, ordered list of stages.
pub struct Pipeline {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

/// In-memory record of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Correlation id of the run.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// One result per executed stage, in order.
    pub results: Vec<StageResult>,
}

impl Pipeline {
    pub(super) fn new(
        name: String,
        stages: Vec<Arc<dyn Stage>>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name,
            stages,
            event_sink,
        }
    }

    /// Pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a built pipeline.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage once, in registration order.
    ///
    /// Stops at the first failing stage and returns its error unchanged;
    /// later stages never run.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = generate_uuid();
        let span = info_span!("pipeline", pipeline = %self.name, run_id = %run_id);
        self.run_stages(run_id).instrument(span).await
    }

    async fn run_stages(&self, run_id: Uuid) -> Result<RunSummary> {
        let sink = &self.event_sink;
        sink.emit(
            types::PIPELINE_STARTED,
            Some(json!({ "run_id": run_id.to_string(), "pipeline": self.name, "stages": self.stages.len() })),
        )
        .await;

        let mut results = Vec::with_capacity(self.stages.len());
        for (index, stage) in self.stages.iter().enumerate() {
            let name = stage.name();
            let payload = stage_payload(run_id, &self.name, name, index);
            let started_at = now_utc();

            info!(">>>>>> stage {name} started <<<<<<");
            sink.emit(types::STAGE_STARTED, Some(payload.clone())).await;

            match stage.run().await {
                Ok(()) => {
                    info!(">>>>>> stage {name} completed <<<<<<\n\nx==========x");
                    let result = StageResult::completed(name, started_at);
                    let mut data = payload;
                    data["duration_ms"] = json!(result.duration_ms());
                    sink.emit(types::STAGE_COMPLETED, Some(data)).await;
                    results.push(result);
                }
                Err(err) => {
                    let chain = error_chain(&err);
                    error!(stage = %name, error = ?err, kind = err.kind(), "{chain}");

                    let result = StageResult::failed(name, started_at, &err, chain);
                    let mut data = payload;
                    data["duration_ms"] = json!(result.duration_ms());
                    data["error"] = json!(result.error);
                    data["kind"] = json!(result.error_kind);
                    sink.emit(types::STAGE_FAILED, Some(data.clone())).await;
                    sink.emit(types::PIPELINE_FAILED, Some(data)).await;
                    return Err(err);
                }
            }
        }

        sink.emit(
            types::PIPELINE_COMPLETED,
            Some(json!({ "run_id": run_id.to_string(), "pipeline": self.name })),
        )
        .await;

        Ok(RunSummary {
            run_id,
            pipeline: self.name.clone(),
            results,
        })
    }
}

/// Renders an error and its sources as `outer: inner: root`.
fn error_chain(err: &crate::errors::PipelineError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

/// Builds a pipeline from `stages` and runs it against the process-wide
/// event sink. Used by the per-stage binaries.
pub async fn run_pipeline(
    name: impl Into<String>,
    stages: Vec<Arc<dyn Stage>>,
) -> Result<RunSummary> {
    let pipeline = super::PipelineBuilder::new(name)
        .stages(stages)?
        .with_event_sink(get_event_sink())
        .build()?;
    pipeline.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use crate::events::CollectingEventSink;
    use crate::pipeline::PipelineBuilder;
    use crate::testing::{FailingStage, LogCapture, RecordingStage, RunLog};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_stages_run_once_in_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let log = RunLog::default();
        let a = Arc::new(RecordingStage::new("a").with_log(log.clone()));
        let b = Arc::new(RecordingStage::new("b").with_log(log.clone()));
        let pipeline = PipelineBuilder::new("test")
            .stage(a.clone())
            .unwrap()
            .stage(b.clone())
            .unwrap()
            .with_event_sink(sink.clone())
            .build()
            .unwrap();

        let summary = pipeline.run().await.unwrap();

        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 1);
        assert_eq!(*log.lock(), vec!["a", "b"]);
        assert_eq!(summary.results.len(), 2);
        assert!(summary.results.iter().all(StageResult::is_success));
        assert_eq!(
            sink.event_types(),
            vec![
                "pipeline.started",
                "stage.started",
                "stage.completed",
                "stage.started",
                "stage.completed",
                "pipeline.completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_stops_later_stages() {
        let sink = Arc::new(CollectingEventSink::new());
        let first = Arc::new(RecordingStage::new("first"));
        let last = Arc::new(RecordingStage::new("last"));
        let pipeline = PipelineBuilder::new("test")
            .stage(first.clone())
            .unwrap()
            .stage(Arc::new(FailingStage::new("broken", "disk on fire")))
            .unwrap()
            .stage(last.clone())
            .unwrap()
            .with_event_sink(sink.clone())
            .build()
            .unwrap();

        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, PipelineError::Model(ref m) if m == "disk on fire"));
        assert_eq!(first.call_count(), 1);
        assert_eq!(last.call_count(), 0);

        let failed = sink.events_of_type("stage.failed");
        assert_eq!(failed.len(), 1);
        let data = &failed[0].data;
        assert_eq!(data["stage"], "broken");
        assert_eq!(data["index"], 1);
        assert_eq!(data["kind"], "model");
        assert_eq!(sink.events_of_type("pipeline.completed").len(), 0);
    }

    #[tokio::test]
    async fn test_markers_logged_once_per_successful_stage() {
        let logs = LogCapture::new();
        let _guard = logs.install();
        let pipeline = PipelineBuilder::new("test")
            .stage(Arc::new(RecordingStage::new("fetch")))
            .unwrap()
            .stage(Arc::new(RecordingStage::new("analyze")))
            .unwrap()
            .with_event_sink(Arc::new(CollectingEventSink::new()))
            .build()
            .unwrap();

        pipeline.run().await.unwrap();

        for name in ["fetch", "analyze"] {
            assert_eq!(logs.count(&format!(">>>>>> stage {name} started <<<<<<")), 1);
            assert_eq!(logs.count(&format!(">>>>>> stage {name} completed <<<<<<")), 1);
        }
        assert!(!logs.contents().contains("ERROR"));
    }

    #[tokio::test]
    async fn test_failing_stage_error_logged_without_completion_marker() {
        let logs = LogCapture::new();
        let _guard = logs.install();
        let pipeline = PipelineBuilder::new("test")
            .stage(Arc::new(FailingStage::missing_file("prepare", "artifacts/data/scans")))
            .unwrap()
            .stage(Arc::new(RecordingStage::new("train")))
            .unwrap()
            .with_event_sink(Arc::new(CollectingEventSink::new()))
            .build()
            .unwrap();

        let err = pipeline.run().await.unwrap_err();
        assert_eq!(err.kind(), "io");

        let output = logs.contents();
        assert_eq!(logs.count(">>>>>> stage prepare started <<<<<<"), 1);
        assert_eq!(logs.count(">>>>>> stage prepare completed <<<<<<"), 0);
        assert_eq!(logs.count(">>>>>> stage train started <<<<<<"), 0);
        let error_line = output
            .lines()
            .find(|line| line.contains("ERROR"))
            .expect("failure is logged");
        assert!(error_line.contains("stage=prepare"));
        assert!(error_line.contains("artifacts/data/scans"));
        assert!(error_line.contains("no such file"));
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let err = PipelineError::io(
            "/data/file.zip",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        let chain = error_chain(&err);
        assert!(chain.contains("/data/file.zip"));
        assert!(chain.contains("no such file"));
    }

    #[tokio::test]
    async fn test_run_pipeline_rejects_empty() {
        let err = run_pipeline("empty", Vec::new()).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
