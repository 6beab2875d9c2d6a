//! Filesystem helpers for the disk store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{OfflineError, OfflineResult};

pub(crate) fn default_store_dir() -> OfflineResult<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| OfflineError::store("could not determine cache directory"))?;

    Ok(base.join("square-foot").join("offline"))
}

/// Write through a uniquely named temp file and rename over `path`.
///
/// Concurrent writers never share a temp file, so the last rename wins and
/// readers only ever observe a complete file.
pub(crate) async fn write_atomic(path: &Path, content: &[u8]) -> OfflineResult<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(
        ".{}.{:08x}.tmp",
        file_name,
        rand::random::<u32>()
    ));

    if let Err(e) = fs::write(&temp_path, content).await {
        return Err(OfflineError::store(format!(
            "failed to write temp file {}: {}",
            temp_path.display(),
            e
        )));
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(OfflineError::store(format!(
            "failed to rename temp file into {}: {}",
            path.display(),
            e
        )));
    }

    Ok(())
}

/// Read a file, mapping "does not exist" to `None`.
pub(crate) async fn read_optional(path: &Path) -> OfflineResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(OfflineError::store(format!(
            "failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

pub(crate) async fn dir_exists(path: &Path) -> OfflineResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(OfflineError::store(format!(
            "failed to stat {}: {}",
            path.display(),
            e
        ))),
    }
}

pub(crate) fn is_temp_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_replaces_content_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CURRENT");

        write_atomic(&path, b"square-foot-v6").await.unwrap();
        write_atomic(&path, b"square-foot-v7").await.unwrap();

        assert_eq!(read_optional(&path).await.unwrap().unwrap(), b"square-foot-v7");

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["CURRENT".to_string()]);
    }

    #[tokio::test]
    async fn test_read_optional_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(read_optional(&dir.path().join("nope")).await.unwrap().is_none());
        assert!(!dir_exists(&dir.path().join("nope")).await.unwrap());
        assert!(dir_exists(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_is_store_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = write_atomic(&dir.path().join("gone").join("x.json"), b"{}")
            .await
            .unwrap_err();
        assert!(err.is_store_unavailable());
    }

    #[test]
    fn test_temp_file_detection() {
        assert!(is_temp_file(".CURRENT.0badf00d.tmp"));
        assert!(!is_temp_file("CURRENT"));
        assert!(!is_temp_file("abc.json"));
    }
}
