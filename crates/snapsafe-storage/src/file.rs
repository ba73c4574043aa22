//! JSON file backend.
//!
//! The whole store is one JSON object of string values. Every read goes to
//! disk so that writes made by another process (for example the external
//! login completing) are picked up. Writes replace the file atomically
//! through a uniquely named sibling temp file and a rename. Read-modify-write
//! cycles hold an exclusive advisory lock on a sidecar `.lock` file, so
//! handles in different processes do not drop each other's keys.

use crate::{KeyValueStorage, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

type Document = BTreeMap<String, String>;

/// File-backed key-value storage.
pub struct FileStorage {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process; the file
    /// lock covers other processes.
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        self.path.with_file_name(format!(".{}.{}", file_name, suffix))
    }

    fn lock_path(&self) -> PathBuf {
        self.sibling("lock")
    }

    fn ensure_parent(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Run `update` on the current document under both locks and write the
    /// result back when it returns `true`.
    fn modify<T>(&self, update: impl FnOnce(&mut Document) -> (T, bool)) -> StorageResult<T> {
        let _guard = self.write_lock.lock();
        self.ensure_parent()?;

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;
        FileExt::lock_exclusive(&lock_file)?;

        let result = (|| -> StorageResult<T> {
            let mut document = self.read_document()?;
            let (value, changed) = update(&mut document);
            if changed {
                self.write_document(&document)?;
            }
            Ok(value)
        })();

        let _ = FileExt::unlock(&lock_file);
        result
    }

    fn read_document(&self) -> StorageResult<Document> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Document::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_document(&self, document: &Document) -> StorageResult<()> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let tmp_path = self.sibling(&format!("tmp.{}.{}", std::process::id(), nanos));
        let content = serde_json::to_string_pretty(document)?;

        let write_result = (|| -> std::io::Result<()> {
            let mut file: File = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.modify(|document| {
            document.insert(key.to_string(), value.to_string());
            ((), true)
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.read_document()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        self.modify(|document| {
            let removed = document.remove(key).is_some();
            (removed, removed)
        })
    }
}
