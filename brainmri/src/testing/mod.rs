//! Test doubles and fixtures.
//!
//! - Mock stages for orchestrator tests
//! - Synthetic labeled image trees for component tests
//! - Captured log output for marker assertions
//! - A one-shot HTTP responder for download tests

mod fixtures;
mod http;
mod logs;
mod mocks;

pub use fixtures::{write_image_tree, ImageTreeSpec};
pub use http::serve_once;
pub use logs::LogCapture;
pub use mocks::{FailingStage, RecordingStage, RunLog};
