//! Store runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into [`crate::FileStore`].
//! Request handling never reads process-wide environment variables; the helpers at the bottom
//! of this module turn raw environment values into typed settings for the binaries.

use crate::constants::{DEFAULT_STORAGE_DIR, METADATA_FILE_NAME};
use crate::{StoreError, StoreResult};
use fileshelf_types::FileName;
use std::path::{Path, PathBuf};

/// Default cap on request bodies accepted by the HTTP layer.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16_000_000;

/// Store configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    storage_root: PathBuf,
    metadata_file_name: FileName,
}

impl StoreConfig {
    /// Create a new `StoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidStorageRoot`] if `metadata_file_name` is not a plain file
    /// name (it must live directly inside the storage root).
    pub fn new(storage_root: PathBuf, metadata_file_name: &str) -> StoreResult<Self> {
        let metadata_file_name = FileName::parse(metadata_file_name).map_err(|e| {
            StoreError::InvalidStorageRoot(format!("metadata file name is invalid: {e}"))
        })?;

        Ok(Self {
            storage_root,
            metadata_file_name,
        })
    }

    /// Configuration using the default metadata file name.
    pub fn with_defaults(storage_root: PathBuf) -> StoreResult<Self> {
        Self::new(storage_root, METADATA_FILE_NAME)
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn metadata_file_name(&self) -> &FileName {
        &self.metadata_file_name
    }

    /// Absolute or cwd-relative path of the metadata document.
    pub fn metadata_path(&self) -> PathBuf {
        self.storage_root.join(self.metadata_file_name.as_str())
    }
}

/// Resolve the storage root from an optional environment value.
///
/// `None` or a blank value falls back to [`DEFAULT_STORAGE_DIR`].
pub fn storage_root_from_env_value(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR))
}

/// Parse the request body cap from an optional environment value.
///
/// `None` or a blank value falls back to [`DEFAULT_MAX_UPLOAD_BYTES`].
pub fn max_upload_bytes_from_env_value(value: Option<String>) -> StoreResult<usize> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(DEFAULT_MAX_UPLOAD_BYTES),
        Some(v) => match v.parse::<usize>() {
            Ok(0) | Err(_) => Err(StoreError::InvalidStorageRoot(format!(
                "max upload bytes must be a positive integer, got '{v}'"
            ))),
            Ok(n) => Ok(n),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_put_metadata_in_root() {
        let cfg = StoreConfig::with_defaults(PathBuf::from("/srv/shelf")).unwrap();
        assert_eq!(cfg.metadata_path(), PathBuf::from("/srv/shelf/metadata.json"));
        assert_eq!(cfg.storage_root(), Path::new("/srv/shelf"));
    }

    #[test]
    fn new_rejects_nested_metadata_name() {
        let result = StoreConfig::new(PathBuf::from("/srv/shelf"), "../index.json");
        assert!(matches!(result, Err(StoreError::InvalidStorageRoot(_))));
    }

    #[test]
    fn new_accepts_custom_metadata_name() {
        let cfg = StoreConfig::new(PathBuf::from("root"), "index.json").unwrap();
        assert_eq!(cfg.metadata_file_name().as_str(), "index.json");
    }

    #[test]
    fn storage_root_env_fallback() {
        assert_eq!(storage_root_from_env_value(None), PathBuf::from("storagedata"));
        assert_eq!(
            storage_root_from_env_value(Some("   ".into())),
            PathBuf::from("storagedata")
        );
        assert_eq!(
            storage_root_from_env_value(Some(" /data ".into())),
            PathBuf::from("/data")
        );
    }

    #[test]
    fn max_upload_bytes_parsing() {
        assert_eq!(
            max_upload_bytes_from_env_value(None).unwrap(),
            DEFAULT_MAX_UPLOAD_BYTES
        );
        assert_eq!(
            max_upload_bytes_from_env_value(Some("1024".into())).unwrap(),
            1024
        );
        assert!(max_upload_bytes_from_env_value(Some("0".into())).is_err());
        assert!(max_upload_bytes_from_env_value(Some("lots".into())).is_err());
    }
}
