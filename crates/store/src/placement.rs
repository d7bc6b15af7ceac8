//! File placement: from an upload to a durably written file at a unique path.
//!
//! The destination is `storage_root/<directory>/<name>`. When that name is taken the engine
//! probes `stem(1).ext`, `stem(2).ext`, … and claims the first free candidate with an
//! exclusive create, so two concurrent uploads can never end up writing the same file.
//!
//! Record identity is also derived here. A [`FileId`] is the MD5 digest of the file's
//! modification timestamp followed by its physical name. It is *not* a content hash: two
//! files with the same name and an identical timestamp produce the same id, and the second
//! index entry replaces the first.

use crate::constants::{
    ID_TIME_FORMAT, MAX_FALLBACK_EXTENSION_BYTES, MAX_NAME_PROBES, MODIFICATION_TIME_FORMAT,
};
use crate::record::{FileRecord, ValidatedUpload};
use crate::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use fileshelf_types::{DirPath, FileId, FileName, NonEmptyText};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A file that has been written to its final location.
#[derive(Debug)]
pub struct PlacedFile {
    /// Open handle on the written file, used to read back size and mtime
    pub file: File,
    /// Final (possibly disambiguated) name
    pub name: FileName,
    /// Forward-slash path relative to the storage root
    pub logical_path: String,
    /// Location on disk
    pub physical_path: PathBuf,
    /// Type label, unchanged from the upload
    pub type_label: NonEmptyText,
}

impl PlacedFile {
    /// Stats the written file and builds its id and record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WriteFailed`] if the file metadata cannot be read.
    pub fn into_record(self) -> StoreResult<(FileId, FileRecord)> {
        let write_failed = |source: io::Error| StoreError::WriteFailed {
            path: self.physical_path.clone(),
            source,
        };

        let metadata = self.file.metadata().map_err(write_failed)?;
        let modified = metadata.modified().map_err(write_failed)?;

        let id = derive_file_id(modified, &self.name);
        let record = FileRecord {
            name: self.name,
            path: self.logical_path,
            type_label: self.type_label,
            size: metadata.len(),
            modification_time: format_modification_time(modified),
        };

        Ok((id, record))
    }

    /// Removes the written file, used to roll back a failed operation.
    pub fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.physical_path) {
            tracing::warn!(
                "failed to remove {} during rollback: {}",
                self.physical_path.display(),
                e
            );
        }
    }
}

/// Writes uploads below a storage root.
#[derive(Debug, Clone)]
pub struct PlacementEngine {
    storage_root: PathBuf,
}

impl PlacementEngine {
    pub fn new(storage_root: PathBuf) -> Self {
        Self { storage_root }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Writes `upload` to a free path inside its directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WriteFailed`] if the directory cannot be created, no free name is
    /// found within the probe limit, or the file cannot be created or written.
    pub fn place(&self, upload: &ValidatedUpload) -> StoreResult<PlacedFile> {
        let destination_dir = upload.directory.resolve(&self.storage_root);
        fs::create_dir_all(&destination_dir).map_err(|e| StoreError::WriteFailed {
            path: destination_dir.clone(),
            source: e,
        })?;

        let fallback_extension = plain_extension(&upload.type_label);

        for attempt in 0..=MAX_NAME_PROBES {
            let candidate = if attempt == 0 {
                upload.name.clone()
            } else {
                upload.name.numbered(attempt, fallback_extension)
            };
            let target = destination_dir.join(candidate.as_str());

            let file = match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&target)
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!("name taken, probing next: {}", target.display());
                    continue;
                }
                Err(e) => {
                    return Err(StoreError::WriteFailed {
                        path: target,
                        source: e,
                    })
                }
            };

            let placed = PlacedFile {
                file,
                logical_path: upload.directory.join(&candidate),
                name: candidate,
                physical_path: target,
                type_label: upload.type_label.clone(),
            };

            return match write_contents(&placed.file, &upload.bytes) {
                Ok(()) => Ok(placed),
                Err(e) => {
                    placed.discard();
                    Err(StoreError::WriteFailed {
                        path: placed.physical_path,
                        source: e,
                    })
                }
            };
        }

        Err(StoreError::WriteFailed {
            path: destination_dir,
            source: io::Error::new(
                ErrorKind::AlreadyExists,
                format!(
                    "no free name for '{}' after {} attempts",
                    upload.name, MAX_NAME_PROBES
                ),
            ),
        })
    }

    /// Location of `name` inside logical directory `dir`.
    pub fn resolve(&self, dir: &DirPath, name: &FileName) -> PathBuf {
        dir.resolve(&self.storage_root).join(name.as_str())
    }
}

fn write_contents(mut file: &File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

/// The type label doubles as an extension only when it is a short plain token like `png`.
fn plain_extension(type_label: &NonEmptyText) -> Option<&str> {
    let label = type_label.as_str();
    let short = label.len() <= MAX_FALLBACK_EXTENSION_BYTES;
    (short && label.bytes().all(|b| b.is_ascii_alphanumeric())).then_some(label)
}

/// Derives a record id from a modification time and a physical file name.
pub fn derive_file_id(modified: SystemTime, name: &FileName) -> FileId {
    let timestamp = DateTime::<Utc>::from(modified).format(ID_TIME_FORMAT);
    let digest = md5::compute(format!("{}{}", timestamp, name.as_str()));
    FileId::from_digest(digest.0)
}

/// Formats a modification time as stored in the index.
pub fn format_modification_time(modified: SystemTime) -> String {
    DateTime::<Utc>::from(modified)
        .format(MODIFICATION_TIME_FORMAT)
        .to_string()
}
