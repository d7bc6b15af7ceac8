//! fileshelf store
//!
//! A metadata-indexed file store: uploaded bytes are written below a storage root at a path
//! derived from a logical directory and a file name, and a single JSON document at the root
//! maps opaque ids to metadata records describing each file.
//!
//! ## Layout
//!
//! ```text
//! <storage_root>/
//! ├── metadata.json          # { "<id>": { name, path, type, size, modificationTime } }
//! └── ht/
//!     └── monthly/
//!         ├── earth.png
//!         └── earth(1).png   # second upload with the same name
//! ```
//!
//! Every `path` in the index names a file that exists below the storage root, and every
//! mutation rewrites the whole document. [`FileStore`] serialises all operations behind one
//! lock, so concurrent callers never lose updates.
//!
//! ## Example Usage
//!
//! ```no_run
//! use fileshelf_store::{FileStore, StoreConfig, Upload};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FileStore::open(StoreConfig::with_defaults(PathBuf::from("storagedata"))?)?;
//!
//! let (id, record) = store.store(Upload {
//!     directory: "ht/monthly".into(),
//!     name: "earth.png".into(),
//!     type_label: "png".into(),
//!     size: None,
//!     bytes: std::fs::read("earth.png")?,
//! })?;
//! println!("{id} -> {}", record.path);
//! # Ok(())
//! # }
//! ```

pub mod config;
mod constants;
pub mod index;
pub mod placement;
mod record;
pub mod store;

pub use config::StoreConfig;
pub use constants::{DEFAULT_STORAGE_DIR, METADATA_FILE_NAME};
pub use fileshelf_types::{DirPath, FileId, FileName, NonEmptyText, TextError};
pub use record::{FileRecord, Index, Upload, ValidatedUpload};
pub use store::FileStore;

use std::path::PathBuf;

/// Boxed error source for failures that can come from more than one library.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Upload fields or identifiers are missing or malformed
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// No record exists for the given id
    #[error("file not found: {0}")]
    NotFound(FileId),

    /// Storage root is unusable or configuration is invalid
    #[error("invalid storage root: {0}")]
    InvalidStorageRoot(String),

    #[error("failed to read metadata index {}: {source}", path.display())]
    MetadataUnreadable {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to write metadata index {}: {source}", path.display())]
    MetadataWriteFailed {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to write file {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete file {}: {source}", path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read file {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An index entry is missing expected fields or names an unsafe path
    #[error("corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
}

impl From<TextError> for StoreError {
    fn from(err: TextError) -> Self {
        StoreError::ValidationFailed(err.to_string())
    }
}

impl StoreError {
    /// Status classification reported to callers for this failure.
    pub fn status(&self) -> Status {
        Status::BadRequest
    }
}

/// Outcome classification of a store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
}

impl Status {
    /// Classifies any store result.
    pub fn of<T>(result: &StoreResult<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
