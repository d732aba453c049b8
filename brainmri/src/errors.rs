//! Error types for the brainmri pipeline.
//!
//! Every component operation returns `Result<_, PipelineError>`. Configuration
//! problems are always reported through the dedicated [`ConfigError`] kind so a
//! missing key never surfaces as a generic lookup failure.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration documents are missing, malformed or inconsistent.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Stage registration failed.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A filesystem operation failed.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The remote archive could not be downloaded.
    #[error("Download failed: {0}")]
    Download(String),

    /// The HTTP client reported an error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The downloaded archive could not be read or extracted.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// An image could not be opened or decoded.
    #[error("Image error at {path}: {source}")]
    Image {
        /// The image path.
        path: PathBuf,
        /// The underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// A serialized dataset is missing or inconsistent.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// The model could not be assembled.
    #[error("Model error: {0}")]
    Model(String),

    /// A model record could not be saved or loaded.
    #[error("Recorder error: {0}")]
    Recorder(String),

    /// A CSV artifact could not be written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Wraps an IO error with the path that caused it.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Wraps an image error with the path that caused it.
    #[must_use]
    pub fn image(path: impl AsRef<Path>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns a short machine-friendly name for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Validation(_) => "validation",
            Self::Io { .. } => "io",
            Self::Download(_) | Self::Http(_) => "download",
            Self::Archive(_) => "archive",
            Self::Image { .. } => "image",
            Self::Dataset(_) => "dataset",
            Self::Model(_) => "model",
            Self::Recorder(_) => "recorder",
            Self::Csv(_) | Self::Serialization(_) => "serialization",
        }
    }
}

/// Errors raised while loading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration document could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// The document path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration document is not valid YAML or does not match the schema.
    #[error("Failed to parse config file {path}: {message}")]
    Parse {
        /// The document path.
        path: PathBuf,
        /// The parser message, including the offending location.
        message: String,
    },

    /// A required section or key is absent.
    #[error("Missing config key '{key}' in {document}")]
    MissingKey {
        /// Which document ("config" or "params").
        document: &'static str,
        /// Dotted key path.
        key: String,
    },

    /// A value is present but outside its allowed domain.
    #[error("Invalid config value for '{key}': {reason}")]
    Invalid {
        /// Dotted key path.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a missing-key error.
    #[must_use]
    pub fn missing(document: &'static str, key: impl Into<String>) -> Self {
        Self::MissingKey {
            document,
            key: key.into(),
        }
    }

    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when a pipeline cannot be assembled.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_missing_key_message() {
        let err = ConfigError::missing("params", "prepare_datasets.seed");
        assert_eq!(
            err.to_string(),
            "Missing config key 'prepare_datasets.seed' in params"
        );
    }

    #[test]
    fn test_config_error_converts_into_pipeline_error() {
        let err: PipelineError = ConfigError::invalid("callbacks.factor", "must be in (0, 1)").into();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("callbacks.factor"));
    }

    #[test]
    fn test_io_error_carries_path() {
        let err = PipelineError::io(
            "/tmp/missing.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("/tmp/missing.txt"));
    }

    #[test]
    fn test_validation_error_with_stages() {
        let err = PipelineValidationError::new("Duplicate stage")
            .with_stages(vec!["Fetch Data stage".to_string()]);
        assert_eq!(err.stages.len(), 1);
        assert_eq!(err.to_string(), "Duplicate stage");
    }
}
