//! Durable JSON documents on local disk.
//!
//! Writes go to a sibling temp file, are fsynced, then renamed over the
//! target, so a crash never leaves a half-written document behind. Writes are
//! idempotent (the whole document is rewritten) and retried a bounded number
//! of times before a persistence failure is surfaced.

use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use tokengate_common::GateError;

/// Pause between write attempts
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// A JSON document stored at a fixed path
#[derive(Debug, Clone)]
pub struct JsonDocument {
    path: PathBuf,
    retries: u32,
}

impl JsonDocument {
    pub fn new(path: impl Into<PathBuf>, retries: u32) -> Self {
        Self {
            path: path.into(),
            retries: retries.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document, or `T::default()` when the file does not exist yet
    pub async fn load<T>(&self) -> Result<T, GateError>
    where
        T: DeserializeOwned + Default,
    {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                GateError::Persistence(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(GateError::Persistence(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Replace the document with `value`
    pub async fn save<T: Serialize>(&self, value: &T) -> Result<(), GateError> {
        let data = serde_json::to_vec_pretty(value)
            .map_err(|e| GateError::Internal(format!("serialize {}: {e}", self.path.display())))?;

        let mut last_error = None;
        for attempt in 1..=self.retries {
            match self.write_atomic(&data).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        attempt,
                        error = %e,
                        "Document write failed"
                    );
                    last_error = Some(e);
                    if attempt < self.retries {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }

        Err(GateError::Persistence(format!(
            "{}: {}",
            self.path.display(),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn write_atomic(&self, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let doc = JsonDocument::new(dir.path().join("absent.json"), 3);

        let loaded: BTreeMap<String, u64> = doc.load().await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_and_no_temp_left() {
        let dir = tempfile::tempdir().unwrap();
        let doc = JsonDocument::new(dir.path().join("nested/doc.json"), 3);

        let mut value = BTreeMap::new();
        value.insert("a".to_string(), 1u64);
        doc.save(&value).await.unwrap();

        let loaded: BTreeMap<String, u64> = doc.load().await.unwrap();
        assert_eq!(loaded, value);
        assert!(!dir.path().join("nested/doc.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_surfaces_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in place of the target makes the rename fail every time
        let target = dir.path().join("blocked.json");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        let doc = JsonDocument::new(&target, 2);
        let err = doc.save(&BTreeMap::<String, u64>::new()).await.unwrap_err();
        assert!(matches!(err, GateError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.json");
        std::fs::write(&path, b"{not json").unwrap();

        let doc = JsonDocument::new(&path, 1);
        let result: Result<BTreeMap<String, u64>, _> = doc.load().await;
        assert!(matches!(result, Err(GateError::Persistence(_))));
    }
}
