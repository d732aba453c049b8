use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, Level};

/// Observer of pipeline and stage transitions.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Receives one event. Implementations must not fail the run.
    async fn emit(&self, event_type: &str, data: Option<Value>);
}

/// Drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Forwards events to `tracing`, lifting the stage name and run id out of
/// the payload into their own fields.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl LoggingEventSink {
    /// `DEBUG` logs at debug; any other level logs at info.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        let data = data.unwrap_or(Value::Null);
        let stage = data.get("stage").and_then(Value::as_str).unwrap_or("-");
        let run_id = data.get("run_id").and_then(Value::as_str).unwrap_or("-");
        if self.level == Level::DEBUG {
            debug!(event = event_type, stage, run_id, payload = %data, "pipeline event");
        } else {
            info!(event = event_type, stage, run_id, payload = %data, "pipeline event");
        }
    }
}

/// One event captured by [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Event type name, e.g. `stage.failed`.
    pub event_type: String,
    /// Payload, `Null` when none was attached.
    pub data: Value,
}

/// In-memory sink for asserting on the event sequence of a run.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    recorded: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Event type names in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.recorded.read().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<RecordedEvent> {
        self.recorded
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Number of events seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorded.read().len()
    }

    /// No events seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded.read().is_empty()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.recorded.write().push(RecordedEvent {
            event_type: event_type.to_string(),
            data: data.unwrap_or(Value::Null),
        });
    }
}
