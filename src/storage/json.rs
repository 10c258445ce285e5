//! JSON document store with atomic replacement
//!
//! Each save writes the whole sequence to a temporary file next to the
//! target and renames it into place, so a reader never sees a partially
//! written document.

use crate::retry::{Backoff, RetryError, RetryPolicy};
use crate::storage::traits::{RecordStore, StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Moves a finished temporary file onto the target path
pub type Replacer = Arc<dyn Fn(&Path, &Path) -> io::Result<()> + Send + Sync>;

/// A JSON array of `T` stored in a single file
pub struct JsonStore<T> {
    path: PathBuf,
    policy: RetryPolicy,
    replacer: Replacer,
    _rows: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T> {
    /// Creates a store at `path` with the default replace policy
    ///
    /// The replace step is retried up to 12 times, backing off from 50ms to
    /// 2s with up to 50ms of jitter.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_policy(path, Self::default_policy())
    }

    /// Creates a store with an explicit replace policy
    pub fn with_policy(path: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            replacer: Arc::new(|from: &Path, to: &Path| std::fs::rename(from, to)),
            _rows: PhantomData,
        }
    }

    /// Overrides how the temporary file is moved into place
    pub fn with_replacer(mut self, replacer: Replacer) -> Self {
        self.replacer = replacer;
        self
    }

    pub fn default_policy() -> RetryPolicy {
        RetryPolicy::new(
            12,
            Backoff::Doubling {
                initial: Duration::from_millis(50),
                cap: Duration::from_secs(2),
            },
        )
        .with_jitter(Duration::from_millis(50))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the document exists on disk
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

impl<T> fmt::Debug for JsonStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonStore")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<T> RecordStore<T> for JsonStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Vec<T> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No document at {}, starting empty", self.path.display());
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("Could not read {}: {}; starting empty", self.path.display(), e);
                return Vec::new();
            }
        };

        if content.trim().is_empty() {
            return Vec::new();
        }

        let rows = match serde_json::from_str(&content) {
            Ok(Value::Array(rows)) => rows,
            Ok(_) => {
                tracing::warn!(
                    "Document {} is not a JSON array; starting empty",
                    self.path.display()
                );
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(
                    "Document {} is not valid JSON ({}); starting empty",
                    self.path.display(),
                    e
                );
                return Vec::new();
            }
        };

        rows.into_iter()
            .enumerate()
            .filter_map(|(position, row)| match serde_json::from_value(row) {
                Ok(row) => Some(row),
                Err(e) => {
                    tracing::warn!(
                        "Skipping row {} of {}: {}",
                        position,
                        self.path.display(),
                        e
                    );
                    None
                }
            })
            .collect()
    }

    fn save(&self, rows: &[T]) -> StorageResult<()> {
        let dir = self.directory();
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .suffix(".json")
            .tempfile_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, rows)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;

        // Dropping the temp path deletes the file, so every failure below
        // leaves only the previous document behind.
        let tmp_path = tmp.into_temp_path();
        let replace = &self.replacer;

        match self
            .policy
            .run_blocking(|_| replace(&*tmp_path, &self.path), |_| true)
        {
            Ok(()) => {
                // The file now lives at the target; nothing left to clean up.
                let _ = tmp_path.keep();
                tracing::trace!("Saved {} rows to {}", rows.len(), self.path.display());
                Ok(())
            }
            Err(RetryError::Exhausted { attempts, last }) | Err(RetryError::Fatal {
                attempt: attempts,
                error: last,
            }) => Err(StorageError::ReplaceExhausted {
                path: self.path.display().to_string(),
                attempts,
                source: last,
            }),
        }
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FirmwareRecord, WorkItem};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Backoff::Doubling {
                initial: Duration::from_millis(1),
                cap: Duration::from_millis(2),
            },
        )
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .count()
    }

    #[test]
    fn test_load_missing_document() {
        let dir = TempDir::new().unwrap();
        let store: JsonStore<FirmwareRecord> = JsonStore::new(dir.path().join("fw.json"));

        assert!(!store.exists());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fw.json");
        std::fs::write(&path, "[{\"Model\": \"R7000\", ").unwrap();

        let store: JsonStore<FirmwareRecord> = JsonStore::new(&path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_wrong_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fw.json");
        std::fs::write(&path, r#"{"Model": "R7000"}"#).unwrap();

        let store: JsonStore<FirmwareRecord> = JsonStore::new(&path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_mistyped_field_does_not_void_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fw.json");
        std::fs::write(
            &path,
            r#"[{"Model":"M1","Download":"https://d/1"},{"Model":"M2","Download":"https://d/2","Version":3}]"#,
        )
        .unwrap();

        let store: JsonStore<FirmwareRecord> = JsonStore::new(&path);
        let rows = store.load();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].model.as_deref(), Some("M2"));

        store.save(&rows).unwrap();
        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved[1]["Version"], Value::from(3));
    }

    #[test]
    fn test_unusable_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("work.json");
        std::fs::write(&path, r#"[{"url":"https://a"}, 7, {"label":"no url"}, {"url":"https://b"}]"#)
            .unwrap();

        let store: JsonStore<WorkItem> = JsonStore::new(&path);
        let urls: Vec<_> = store.load().into_iter().map(|w| w.url).collect();
        assert_eq!(urls, vec!["https://a".to_string(), "https://b".to_string()]);
    }

    #[test]
    fn test_load_empty_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fw.json");
        std::fs::write(&path, "[]").unwrap();

        let store: JsonStore<FirmwareRecord> = JsonStore::new(&path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("fw.json"));
        let rows = vec![
            FirmwareRecord::new("M2", "U2"),
            FirmwareRecord::new("M1", "U1"),
            FirmwareRecord::new("M3", "U3").with_extra("Size", "4 MB"),
        ];

        store.save(&rows).unwrap();
        assert_eq!(store.load(), rows);
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }

    #[test]
    fn test_document_is_indented_json_array() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("work.json"));
        store.save(&[WorkItem::new("https://example.com/a")]).unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.starts_with("[\n  {\n    \"url\""));
        assert!(text.ends_with("]\n"));
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("out/vendor/fw.json"));
        store.save(&[FirmwareRecord::new("M1", "U1")]).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_failed_replace_leaves_document_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fw.json");

        let store = JsonStore::with_policy(&path, fast_policy(3));
        store.save(&[FirmwareRecord::new("M1", "U1")]).unwrap();
        let before = std::fs::read(&path).unwrap();

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let locked = JsonStore::with_policy(&path, fast_policy(3)).with_replacer(Arc::new(
            move |_: &Path, _: &Path| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "target is locked"))
            },
        ));

        let result = locked.save(&[
            FirmwareRecord::new("M1", "U1"),
            FirmwareRecord::new("M2", "U2"),
        ]);

        assert!(matches!(
            result,
            Err(StorageError::ReplaceExhausted { attempts: 3, .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }

    #[test]
    fn test_transient_replace_failure_recovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fw.json");

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let store = JsonStore::with_policy(&path, fast_policy(5)).with_replacer(Arc::new(
            move |from: &Path, to: &Path| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(io::Error::new(io::ErrorKind::PermissionDenied, "busy"))
                } else {
                    std::fs::rename(from, to)
                }
            },
        ));

        store.save(&[FirmwareRecord::new("M1", "U1")]).unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(store.load().len(), 1);
    }
}
