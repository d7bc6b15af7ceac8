//! The metadata document: whole-index read and replace.
//!
//! The index is one JSON object at a fixed path, keyed by file id. There is no incremental
//! update: callers read the entire mapping, change it, and hand the entire mapping back to
//! [`MetadataStore::replace`]. The store does no locking of its own; [`crate::FileStore`]
//! owns the lock around each read-modify-write cycle.

use crate::constants::RESERVED_NAME_PREFIX;
use crate::record::{FileRecord, Index};
use crate::{StoreError, StoreResult};
use fileshelf_types::FileId;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Handle on the on-disk metadata document.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes an empty index if no document exists yet.
    ///
    /// An existing document is left untouched, even if it is not valid JSON; that is
    /// reported by the first [`read`](Self::read).
    pub fn initialise(&self) -> StoreResult<()> {
        if self.path.exists() {
            return Ok(());
        }
        tracing::info!("creating empty metadata index at {}", self.path.display());
        self.replace(&Index::new())
    }

    /// Reads and parses the whole index.
    ///
    /// # Errors
    ///
    /// - [`StoreError::MetadataUnreadable`] if the document is missing, unreadable, or not a
    ///   JSON object whose values are all objects.
    /// - [`StoreError::CorruptRecord`] if an entry's key is not a file id, or its fields do
    ///   not form a [`FileRecord`] (for example a missing or non-string `path`).
    pub fn read(&self) -> StoreResult<Index> {
        let bytes = fs::read(&self.path).map_err(|e| StoreError::MetadataUnreadable {
            path: self.path.clone(),
            source: Box::new(e),
        })?;

        let document: BTreeMap<String, Map<String, Value>> = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::MetadataUnreadable {
                path: self.path.clone(),
                source: Box::new(e),
            })?;

        document
            .into_iter()
            .map(|(key, fields)| {
                let id = FileId::parse(&key).map_err(|e| StoreError::CorruptRecord {
                    id: key.clone(),
                    reason: e.to_string(),
                })?;
                let record: FileRecord = serde_json::from_value(Value::Object(fields))
                    .map_err(|e| StoreError::CorruptRecord {
                        id: key,
                        reason: e.to_string(),
                    })?;
                Ok((id, record))
            })
            .collect()
    }

    /// Serialises the full index and replaces the document.
    ///
    /// The new content goes to a reserved sibling file, created exclusively, which is then
    /// renamed over the document, so readers never observe a half-written index. A staging
    /// file left behind by an interrupted write is removed first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MetadataWriteFailed`] on serialisation or I/O failure.
    pub fn replace(&self, index: &Index) -> StoreResult<()> {
        let write_failed = |source: crate::BoxError| StoreError::MetadataWriteFailed {
            path: self.path.clone(),
            source,
        };

        let contents = to_tab_indented_json(index).map_err(|e| write_failed(Box::new(e)))?;

        let staging = self.staging_path();
        match fs::remove_file(&staging) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                tracing::debug!("stale staging file {} not removed: {}", staging.display(), e);
            }
            _ => {}
        }

        let result = (|| -> std::io::Result<()> {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&staging)?;
            file.write_all(&contents)?;
            file.sync_all()?;
            fs::rename(&staging, &self.path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&staging);
            return Err(write_failed(Box::new(e)));
        }

        tracing::debug!(
            "wrote metadata index with {} entries to {}",
            index.len(),
            self.path.display()
        );
        Ok(())
    }

    pub(crate) fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!("{RESERVED_NAME_PREFIX}{name}.tmp"))
    }
}

fn to_tab_indented_json(index: &Index) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    index.serialize(&mut serializer)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileshelf_types::{FileName, NonEmptyText};
    use tempfile::TempDir;

    fn sample_record(path: &str) -> FileRecord {
        let name = path.rsplit('/').next().unwrap();
        FileRecord {
            name: FileName::parse(name).unwrap(),
            path: path.into(),
            type_label: NonEmptyText::new("png").unwrap(),
            size: 42,
            modification_time: "03/14/2024 09:26:53".into(),
        }
    }

    fn id(n: u8) -> FileId {
        FileId::parse(&format!("{:032x}", n)).unwrap()
    }

    #[test]
    fn initialise_creates_empty_document() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path().join("metadata.json"));

        store.initialise().unwrap();

        assert!(store.path().exists());
        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn initialise_keeps_existing_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("metadata.json");
        let store = MetadataStore::new(path.clone());

        let mut index = Index::new();
        index.insert(id(1), sample_record("a/earth.png"));
        store.replace(&index).unwrap();

        store.initialise().unwrap();
        assert_eq!(store.read().unwrap(), index);
    }

    #[test]
    fn replace_then_read_preserves_entries() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path().join("metadata.json"));

        let mut index = Index::new();
        index.insert(id(1), sample_record("ht/monthly/earth.png"));
        index.insert(id(2), sample_record("space/mars.png"));
        store.replace(&index).unwrap();

        assert_eq!(store.read().unwrap(), index);
        assert!(!temp.path().join(".fileshelf-metadata.json.tmp").exists());
    }

    #[test]
    fn replace_writes_tab_indented_document() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path().join("metadata.json"));

        let mut index = Index::new();
        index.insert(id(7), sample_record("earth.png"));
        store.replace(&index).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\n\t\"00000000000000000000000000000007\": {"));
        assert!(text.contains("\n\t\t\"modificationTime\": \"03/14/2024 09:26:53\""));
    }

    #[test]
    fn read_missing_document_is_unreadable() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path().join("missing.json"));

        assert!(matches!(
            store.read(),
            Err(StoreError::MetadataUnreadable { .. })
        ));
    }

    #[test]
    fn read_invalid_json_is_unreadable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("metadata.json");
        fs::write(&path, "{ not json").unwrap();

        let store = MetadataStore::new(path);
        assert!(matches!(
            store.read(),
            Err(StoreError::MetadataUnreadable { .. })
        ));
    }

    #[test]
    fn read_non_object_entry_is_unreadable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("metadata.json");
        fs::write(&path, r#"{"00000000000000000000000000000001": "oops"}"#).unwrap();

        let store = MetadataStore::new(path);
        assert!(matches!(
            store.read(),
            Err(StoreError::MetadataUnreadable { .. })
        ));
    }

    #[test]
    fn read_record_without_path_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("metadata.json");
        let doc = serde_json::json!({
            "00000000000000000000000000000001": {
                "name": "earth.png",
                "type": "png",
                "size": 1,
                "modificationTime": "01/01/2024 00:00:00"
            }
        });
        fs::write(&path, doc.to_string()).unwrap();

        let store = MetadataStore::new(path);
        match store.read() {
            Err(StoreError::CorruptRecord { id, reason }) => {
                assert_eq!(id, "00000000000000000000000000000001");
                assert!(reason.contains("path"));
            }
            other => panic!("expected corrupt record, got {other:?}"),
        }
    }

    #[test]
    fn read_bad_key_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("metadata.json");
        let doc = serde_json::json!({
            "not-an-id": {
                "name": "earth.png",
                "path": "earth.png",
                "type": "png",
                "size": 1,
                "modificationTime": "01/01/2024 00:00:00"
            }
        });
        fs::write(&path, doc.to_string()).unwrap();

        let store = MetadataStore::new(path);
        assert!(matches!(
            store.read(),
            Err(StoreError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn replace_clears_stale_staging_file() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path().join("metadata.json"));
        fs::write(store.staging_path(), "left over from a crash").unwrap();

        let mut index = Index::new();
        index.insert(id(3), sample_record("earth.png"));
        store.replace(&index).unwrap();

        assert_eq!(store.read().unwrap(), index);
        assert!(!store.staging_path().exists());
    }

    #[test]
    fn replace_fails_when_staging_is_blocked() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path().join("metadata.json"));
        store.initialise().unwrap();
        fs::create_dir(store.staging_path()).unwrap();

        let mut index = Index::new();
        index.insert(id(4), sample_record("earth.png"));

        assert!(matches!(
            store.replace(&index),
            Err(StoreError::MetadataWriteFailed { .. })
        ));
        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn replace_into_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path().join("gone").join("metadata.json"));

        assert!(matches!(
            store.replace(&Index::new()),
            Err(StoreError::MetadataWriteFailed { .. })
        ));
    }
}
