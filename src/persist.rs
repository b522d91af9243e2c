use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::utils::error::AppError;

/// Serializes a run's result map to an indented JSON artifact, overwriting
/// any previous file at that path. The caller decides whether a failure is
/// fatal; in-memory results are unaffected either way.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let body = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, body)?;
    info!(path = %path.display(), "artifact written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultMap;

    #[test]
    fn test_writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("car_links.json");

        let mut results: ResultMap<String> = ResultMap::new();
        results.insert("car1", "https://example.com/ad/1".to_string());
        results.insert("car2", String::new());

        write_json(&path, &results).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("\n"));
        let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["car1"], "https://example.com/ad/1");
        assert_eq!(parsed["car2"], "");
    }

    #[test]
    fn test_overwrites_existing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        fs::write(&path, "stale").unwrap();

        write_json(&path, &serde_json::json!({"fresh": true})).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.contains("stale"));
        assert!(written.contains("fresh"));
    }

    #[test]
    fn test_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.json");
        write_json(&path, &serde_json::json!([])).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_unwritable_path_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        // The target is a directory, so the write itself must fail.
        let result = write_json(dir.path(), &serde_json::json!({}));
        assert!(matches!(result, Err(AppError::Io(_))));
    }
}
