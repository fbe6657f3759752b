//! Atomic file writes (temp file + rename)

use crate::Result;
use std::path::{Path, PathBuf};

/// Temp path used while writing `target`
fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Write `contents` to `target` atomically.
///
/// **Algorithm:**
/// 1. Create the parent directory if missing
/// 2. Write the full contents to `<target>.tmp`
/// 3. Rename the temp file over the target
///
/// A crash mid-write leaves the previous file intact.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp = temp_path(target);
    std::fs::write(&temp, contents)?;
    if let Err(e) = std::fs::rename(&temp, target) {
        let _ = std::fs::remove_file(&temp);
        return Err(e.into());
    }

    tracing::debug!(path = %target.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically
pub fn write_json_atomic<T: serde::Serialize>(target: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    write_atomic(target, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parent_and_cleans_temp() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("nested").join("out.json");

        write_atomic(&target, b"[]").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "[]");
        assert!(!temp_dir.path().join("nested").join("out.json.tmp").exists());
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("out.txt");
        std::fs::write(&target, "old").unwrap();

        write_atomic(&target, b"new").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn test_write_json_atomic_is_pretty() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("v.json");

        write_json_atomic(&target, &serde_json::json!({"a": 1})).unwrap();

        let content = std::fs::read_to_string(&target).unwrap();
        assert!(content.contains("\"a\": 1"));
        assert!(content.ends_with('\n'));
    }
}
