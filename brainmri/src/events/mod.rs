//! Lifecycle event publication.
//!
//! The orchestrator reports pipeline and stage transitions through an
//! [`EventSink`]. Sinks only observe; they never influence control flow.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Event type names emitted by the orchestrator.
pub mod types {
    /// A pipeline run began.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// Every stage of a run completed.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A run stopped at a failing stage.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// A stage began.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage finished successfully.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage returned an error.
    pub const STAGE_FAILED: &str = "stage.failed";
}

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the process-wide event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the process-wide event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Returns the process-wide event sink, or a [`NoOpEventSink`] if none is set.
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}

/// Builds the payload attached to stage events.
#[must_use]
pub fn stage_payload(run_id: Uuid, pipeline: &str, stage: &str, index: usize) -> Value {
    json!({
        "run_id": run_id.to_string(),
        "pipeline": pipeline,
        "stage": stage,
        "index": index,
    })
}
