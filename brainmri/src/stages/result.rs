//! Per-stage outcome recorded by the orchestrator.

use crate::errors::PipelineError;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// `run()` returned `Ok`.
    Completed,
    /// `run()` returned an error; the pipeline stopped here.
    Failed,
}

/// One stage execution, attached to lifecycle events and to the
/// [`RunSummary`](crate::pipeline::RunSummary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name as shown in the markers.
    pub stage: String,
    /// Outcome.
    pub status: StageStatus,
    /// When `run()` was entered.
    pub started_at: Timestamp,
    /// When `run()` returned.
    pub ended_at: Timestamp,
    /// [`PipelineError::kind`] of the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Rendered error chain of the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageResult {
    /// A stage that finished now.
    #[must_use]
    pub fn completed(stage: impl Into<String>, started_at: Timestamp) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Completed,
            started_at,
            ended_at: now_utc(),
            error_kind: None,
            error: None,
        }
    }

    /// A stage that failed now with `err`, rendered as `message`.
    #[must_use]
    pub fn failed(stage: impl Into<String>, started_at: Timestamp, err: &PipelineError, message: String) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Failed,
            started_at,
            ended_at: now_utc(),
            error_kind: Some(err.kind().to_string()),
            error: Some(message),
        }
    }

    /// Elapsed wall-clock time in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Whether the stage completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_result_has_no_error() {
        let result = StageResult::completed("Callbacks stage", now_utc());
        assert!(result.is_success());
        assert!(result.duration_ms() >= 0);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_result_carries_kind() {
        let err = PipelineError::Download("404 Not Found".to_string());
        let result = StageResult::failed("Fetch Data stage", now_utc(), &err, err.to_string());
        assert!(!result.is_success());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error_kind"], "download");
        assert_eq!(json["error"], "Download failed: 404 Not Found");
    }
}
