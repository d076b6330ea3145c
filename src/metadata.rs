use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::sync::{Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::SyncError;

/// Title → last processed `modified` value.
pub type MetadataRecord = BTreeMap<String, String>;

/// Change-tracking record shared by every worker of a run.
///
/// All access goes through one mutex; the filter reads and the success
/// update writes under the same lock.
#[derive(Debug)]
pub struct MetadataStore {
    path: Utf8PathBuf,
    record: Mutex<MetadataRecord>,
}

impl MetadataStore {
    /// Reads `path`; a missing file yields an empty record.
    pub fn load(path: &Utf8Path) -> Result<Self, SyncError> {
        let record = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|err| SyncError::MetadataParse {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                })?
            }
            Err(err) if err.kind() == ErrorKind::NotFound => MetadataRecord::new(),
            Err(err) => {
                return Err(SyncError::Filesystem(format!(
                    "read metadata {path}: {err}"
                )));
            }
        };
        Ok(Self::with_record(path, record))
    }

    pub fn with_record(path: &Utf8Path, record: MetadataRecord) -> Self {
        Self {
            path: path.to_path_buf(),
            record: Mutex::new(record),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// True when `title` was never processed or was processed with a
    /// different `modified` value.
    pub fn has_changed(&self, title: &str, modified: &str) -> bool {
        self.lock()
            .get(title)
            .is_none_or(|previous| previous != modified)
    }

    pub fn get(&self, title: &str) -> Option<String> {
        self.lock().get(title).cloned()
    }

    pub fn record_processed(&self, title: &str, modified: &str) {
        self.lock().insert(title.to_string(), modified.to_string());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> MetadataRecord {
        self.lock().clone()
    }

    /// Replaces the file on disk with the current record.
    pub fn persist(&self) -> Result<(), SyncError> {
        let content = serde_json::to_vec_pretty(&self.snapshot())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        write_bytes_atomic(&self.path, &content)
    }

    fn lock(&self) -> MutexGuard<'_, MetadataRecord> {
        // A panicking worker cannot leave the map half-updated.
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SyncError> {
    let parent = parent_dir(path);
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".cms-sync-meta")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    std::io::Write::write_all(&mut temp, content)
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    Ok(())
}

pub(crate) fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_modified_is_not_a_change() {
        let store = MetadataStore::with_record(
            Utf8Path::new("meta.json"),
            MetadataRecord::from([("Hospital X".to_string(), "2024-01-01".to_string())]),
        );
        assert!(!store.has_changed("Hospital X", "2024-01-01"));
        assert!(store.has_changed("Hospital X", "2024-02-01"));
        assert!(store.has_changed("Hospital Y", "2024-01-01"));
    }

    #[test]
    fn bare_file_name_has_current_dir_parent() {
        assert_eq!(parent_dir(Utf8Path::new("meta.json")), Utf8Path::new("."));
        assert_eq!(parent_dir(Utf8Path::new("a/meta.json")), Utf8Path::new("a"));
    }
}
