//! Record operations over the metadata index and the storage tree.
//!
//! [`FileStore`] is the only entry point callers need. It keeps the physical files and the
//! index in step: each operation validates its input, takes the store lock, reads the index,
//! adjusts the filesystem, and rewrites the index. When a later step fails, the filesystem
//! change made by an earlier step is undone so the index never points at a missing file.
//!
//! All operations block on disk I/O. Async callers should run them on a blocking thread.

use crate::config::StoreConfig;
use crate::constants::{RESERVED_NAME_PREFIX, STAGED_DELETE_SUFFIX};
use crate::index::MetadataStore;
use crate::placement::PlacementEngine;
use crate::record::{FileRecord, Index, Upload};
use crate::{StoreError, StoreResult};
use fileshelf_types::{DirPath, FileId};
use parking_lot::Mutex;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// Metadata-indexed file store rooted at one directory.
///
/// # Concurrency
///
/// One process-wide lock guards the metadata document. Every operation, including the
/// read-only ones, holds it for its whole read-modify-write cycle, so concurrent `store`
/// calls cannot lose each other's entries and readers always see a consistent snapshot.
/// The lock does not extend to other processes sharing the same storage root.
#[derive(Debug)]
pub struct FileStore {
    config: StoreConfig,
    placement: PlacementEngine,
    metadata: Mutex<MetadataStore>,
}

impl FileStore {
    /// Opens (and if necessary initialises) a store.
    ///
    /// The storage root is created if it does not exist and canonicalised. An empty index is
    /// written if there is no metadata document yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidStorageRoot`] if the root cannot be created or is not a
    /// directory, or [`StoreError::MetadataWriteFailed`] if the empty index cannot be written.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let root = config.storage_root();

        if root.exists() && !root.is_dir() {
            return Err(StoreError::InvalidStorageRoot(format!(
                "Path is not a directory: {}",
                root.display()
            )));
        }

        fs::create_dir_all(root).map_err(|e| {
            StoreError::InvalidStorageRoot(format!(
                "Cannot create directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let root = root.canonicalize().map_err(|e| {
            StoreError::InvalidStorageRoot(format!(
                "Cannot canonicalize path {}: {}",
                root.display(),
                e
            ))
        })?;

        let config = StoreConfig::new(root.clone(), config.metadata_file_name().as_str())?;
        let metadata = MetadataStore::new(config.metadata_path());
        metadata.initialise()?;

        tracing::info!("file store opened at {}", root.display());

        Ok(Self {
            placement: PlacementEngine::new(root),
            metadata: Mutex::new(metadata),
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn storage_root(&self) -> &Path {
        self.placement.storage_root()
    }

    /// Stores a new file and indexes it.
    ///
    /// Returns the new id and record. If another record already has the derived id (same
    /// physical name and modification time) it is replaced.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ValidationFailed`] for missing or malformed upload fields
    /// - [`StoreError::WriteFailed`] if the file cannot be written
    /// - [`StoreError::MetadataUnreadable`], [`StoreError::CorruptRecord`],
    ///   [`StoreError::MetadataWriteFailed`] for index failures; the written file is removed
    pub fn store(&self, upload: Upload) -> StoreResult<(FileId, FileRecord)> {
        let upload = upload.validate()?;

        let metadata = self.metadata.lock();
        let mut index = metadata.read()?;

        let placed = self.placement.place(&upload)?;
        let physical_path = placed.physical_path.clone();
        let (id, record) = match placed.into_record() {
            Ok(pair) => pair,
            Err(e) => {
                remove_quietly(&physical_path);
                return Err(e);
            }
        };

        if let Some(previous) = index.insert(id.clone(), record.clone()) {
            tracing::warn!(
                "file id {} collided; record for {} replaced by {} (old file is no longer indexed)",
                id,
                previous.path,
                record.path
            );
        }

        if let Err(e) = metadata.replace(&index) {
            remove_quietly(&physical_path);
            return Err(e);
        }

        tracing::info!("stored {} as {} ({} bytes)", record.path, id, record.size);
        Ok((id, record))
    }

    /// Returns the whole index.
    pub fn list_all(&self) -> StoreResult<Index> {
        self.metadata.lock().read()
    }

    /// Returns the entries whose `path` starts with `prefix`.
    ///
    /// This is a plain string prefix match: `"ht"` matches `"https/x"` as well as
    /// `"ht/monthly/x"`. An empty prefix returns everything.
    pub fn list_under_dir(&self, prefix: &str) -> StoreResult<Index> {
        let index = self.metadata.lock().read()?;
        Ok(index
            .into_iter()
            .filter(|(_, record)| record.path.starts_with(prefix))
            .collect())
    }

    /// Returns the record for `id`.
    pub fn get_by_id(&self, id: &FileId) -> StoreResult<FileRecord> {
        let index = self.metadata.lock().read()?;
        index
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Returns the record for `id` together with the stored bytes.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown id, [`StoreError::ReadFailed`] if the file
    /// cannot be read.
    pub fn read_content(&self, id: &FileId) -> StoreResult<(FileRecord, Vec<u8>)> {
        let metadata = self.metadata.lock();
        let index = metadata.read()?;
        let record = index
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let path = record.physical_path(id, self.storage_root())?;
        let bytes = fs::read(&path).map_err(|e| StoreError::ReadFailed { path, source: e })?;
        Ok((record, bytes))
    }

    /// Moves the file for `id` into `new_dir`, keeping its name.
    ///
    /// Moving a file onto its current location is a successful no-op. Returns the updated
    /// record.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ValidationFailed`] if `new_dir` is not a valid logical directory
    /// - [`StoreError::NotFound`] for an unknown id
    /// - [`StoreError::MoveFailed`] if the target directory cannot be created, the target
    ///   already exists, or the rename fails; the record is left unchanged
    /// - [`StoreError::MetadataWriteFailed`] if the index cannot be rewritten; the rename is
    ///   undone
    pub fn move_file(&self, id: &FileId, new_dir: &str) -> StoreResult<FileRecord> {
        let new_dir = DirPath::parse(new_dir)?;

        let metadata = self.metadata.lock();
        let mut index = metadata.read()?;
        let record = index
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let new_path = new_dir.join(&record.name);
        if new_path == record.path {
            return Ok(record);
        }

        let from = record.physical_path(id, self.storage_root())?;
        let to = self.placement.resolve(&new_dir, &record.name);
        let move_failed = |source: io::Error| StoreError::MoveFailed {
            from: from.clone(),
            to: to.clone(),
            source,
        };

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(move_failed)?;
        }
        if fs::symlink_metadata(&to).is_ok() {
            return Err(move_failed(io::Error::new(
                ErrorKind::AlreadyExists,
                "target already exists",
            )));
        }
        fs::rename(&from, &to).map_err(move_failed)?;

        let mut updated = record;
        updated.path = new_path;
        index.insert(id.clone(), updated.clone());

        if let Err(e) = metadata.replace(&index) {
            if let Err(undo) = fs::rename(&to, &from) {
                tracing::error!(
                    "failed to undo move of {} after index write failure: {}",
                    id,
                    undo
                );
            }
            return Err(e);
        }

        tracing::info!("moved {} to {}", id, updated.path);
        Ok(updated)
    }

    /// Deletes the file and record for `id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] for an unknown id
    /// - [`StoreError::DeleteFailed`] if the file cannot be removed; the index is unchanged
    /// - [`StoreError::MetadataWriteFailed`] if the index cannot be rewritten; the file is
    ///   restored
    pub fn delete_by_id(&self, id: &FileId) -> StoreResult<()> {
        let metadata = self.metadata.lock();
        let mut index = metadata.read()?;
        self.delete_locked(&metadata, &mut index, id)
    }

    /// Replaces the file for `id` with a new upload, keeping the id.
    ///
    /// The old file and record are deleted first, then the upload is placed as a fresh file
    /// (with the usual collision handling) and indexed under the same id. The upload is
    /// validated before anything is deleted.
    ///
    /// # Errors
    ///
    /// Any failure aborts the remaining steps. A failure after the delete step leaves the old
    /// file deleted.
    pub fn overwrite_file(&self, id: &FileId, upload: Upload) -> StoreResult<FileRecord> {
        let upload = upload.validate()?;

        let metadata = self.metadata.lock();
        let mut index = metadata.read()?;
        self.delete_locked(&metadata, &mut index, id)?;

        let placed = self.placement.place(&upload)?;
        let physical_path = placed.physical_path.clone();
        let record = match placed.into_record() {
            Ok((_, record)) => record,
            Err(e) => {
                remove_quietly(&physical_path);
                return Err(e);
            }
        };

        index.insert(id.clone(), record.clone());
        if let Err(e) = metadata.replace(&index) {
            remove_quietly(&physical_path);
            return Err(e);
        }

        tracing::info!("overwrote {} with {}", id, record.path);
        Ok(record)
    }

    /// Delete with the lock already held.
    ///
    /// The file is first renamed to a reserved staging name next to it. Only after the index
    /// has been rewritten is the staged file removed, so a failed index write can put the
    /// file back.
    fn delete_locked(
        &self,
        metadata: &MetadataStore,
        index: &mut Index,
        id: &FileId,
    ) -> StoreResult<()> {
        let record = index
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let path = record.physical_path(id, self.storage_root())?;
        let staged = staged_delete_path(&path, id);

        fs::rename(&path, &staged).map_err(|e| StoreError::DeleteFailed {
            path: path.clone(),
            source: e,
        })?;

        index.remove(id);
        if let Err(e) = metadata.replace(index) {
            index.insert(id.clone(), record);
            if let Err(undo) = fs::rename(&staged, &path) {
                tracing::error!(
                    "failed to restore {} after index write failure: {}",
                    path.display(),
                    undo
                );
            }
            return Err(e);
        }

        if let Err(e) = fs::remove_file(&staged) {
            tracing::warn!(
                "record {} deleted but staged file {} remains: {}",
                id,
                staged.display(),
                e
            );
        }

        tracing::info!("deleted {} ({})", id, record.path);
        Ok(())
    }
}

/// `.fileshelf-<id>.deleting` beside the file. Uploads cannot take this name and its
/// length does not depend on the file name.
fn staged_delete_path(path: &Path, id: &FileId) -> PathBuf {
    path.with_file_name(format!("{RESERVED_NAME_PREFIX}{id}.{STAGED_DELETE_SUFFIX}"))
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("failed to remove {} during rollback: {}", path.display(), e);
    }
}
