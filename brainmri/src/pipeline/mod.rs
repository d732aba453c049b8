//! Pipeline assembly and sequential execution.

mod builder;
mod runner;

pub use builder::PipelineBuilder;
pub use runner::{run_pipeline, Pipeline, RunSummary};

/// Name of the full training pipeline.
pub const PIPELINE_NAME: &str = "brainmri";
