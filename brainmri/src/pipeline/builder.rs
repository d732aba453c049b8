//! Pipeline builder with registration checks.

use super::runner::Pipeline;
use crate::errors::PipelineValidationError;
use crate::events::{get_event_sink, EventSink};
use crate::stages::Stage;
use std::sync::Arc;

/// Builder for a linear pipeline.
///
/// Stages run in the order they are registered. Registration only checks
/// that names are unique; there is no dependency graph.
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            event_sink: None,
        }
    }

    /// Appends a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage with the same name is already registered.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Result<Self, PipelineValidationError> {
        if self.stages.iter().any(|s| s.name() == stage.name()) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' is registered more than once",
                stage.name()
            ))
            .with_stages(vec![stage.name().to_string()]));
        }
        self.stages.push(stage);
        Ok(self)
    }

    /// Appends several stages in order.
    pub fn stages(
        self,
        stages: impl IntoIterator<Item = Arc<dyn Stage>>,
    ) -> Result<Self, PipelineValidationError> {
        stages.into_iter().try_fold(self, Self::stage)
    }

    /// Routes lifecycle events to `sink` instead of the process-wide sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Registered stage names, in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if no stage was registered.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no stages",
                self.name
            )));
        }
        let sink = self.event_sink.unwrap_or_else(get_event_sink);
        Ok(Pipeline::new(self.name, self.stages, sink))
    }
}
