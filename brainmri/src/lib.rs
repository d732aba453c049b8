//! # brainmri
//!
//! A staged transfer-learning pipeline that classifies brain MRI images as
//! tumor / no tumor.
//!
//! The pipeline is a fixed sequence of stages, each reading its typed
//! parameters from the configuration documents and writing artifacts to disk:
//!
//! - **Fetch Data**: download and extract the image archive
//! - **Analyze Data**: metadata, quality and balance reports, charts
//! - **Prepare Datasets**: resized, split and serialized datasets
//! - **Base Model**: VGG16 backbone with a binary head, frozen up to a layer
//! - **Callbacks**: checkpoint, CSV logger, early stopping, plateau decay
//! - **Transfer Learning**: the fit loop, trained model and curves
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brainmri::prelude::*;
//!
//! let config = ConfigurationManager::from_env()?;
//! let pipeline = PipelineBuilder::new(PIPELINE_NAME)
//!     .stages(default_stages(&config)?)?
//!     .build()?;
//! pipeline.run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

pub mod backend;
pub mod charts;
pub mod components;
pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ConfigurationManager;
    pub use crate::errors::{ConfigError, PipelineError, PipelineValidationError, Result};
    pub use crate::events::{set_event_sink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::logging::init_logging;
    pub use crate::pipeline::{run_pipeline, Pipeline, PipelineBuilder, RunSummary, PIPELINE_NAME};
    pub use crate::stages::{
        default_stages, AnalyzeDataStage, BaseModelStage, CallbacksStage, FetchDataStage,
        PrepareDatasetsStage, Stage, StageResult, StageStatus, TransferLearningStage,
    };
    pub use crate::utils::{generate_uuid, Timestamp};
}
