//! Filesystem, JSON and identifier helpers shared by all components.

use crate::errors::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Wall-clock time recorded in stage results.
pub type Timestamp = DateTime<Utc>;

/// Current UTC time.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Generates a new UUID v4, used as the pipeline run id.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Creates every directory in `paths`, including missing parents.
///
/// Existing directories are left untouched.
pub fn create_directories<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    for path in paths {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|e| PipelineError::io(path, e))?;
        debug!(path = %path.display(), "Created directory");
    }
    Ok(())
}

/// Creates the parent directory of `path` if it has one.
pub fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_directories(&[parent]),
        _ => Ok(()),
    }
}

/// Writes `value` as pretty-printed JSON.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(|e| PipelineError::io(path, e))?;
    debug!(path = %path.display(), "JSON file saved");
    Ok(())
}

/// Reads a JSON document.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Writes a text artifact, creating its parent directory.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, content).map_err(|e| PipelineError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_generate_uuid_is_v4() {
        assert_eq!(generate_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_create_directories_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");

        create_directories(&[&nested]).unwrap();
        create_directories(&[&nested]).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_json_helpers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/value.json");
        let mut value = BTreeMap::new();
        value.insert("epochs".to_string(), 3);

        save_json(&path, &value).unwrap();
        let loaded: BTreeMap<String, i32> = load_json(&path).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_load_json_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_json::<serde_json::Value>(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.kind(), "io");
    }
}
