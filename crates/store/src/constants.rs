//! Constants used throughout the store crate.

/// File name of the metadata index inside the storage root.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Default storage root when no explicit directory is configured.
pub const DEFAULT_STORAGE_DIR: &str = "storagedata";

/// `chrono` format of the `modificationTime` field (`MM/DD/YYYY hh:mm:ss`).
pub(crate) const MODIFICATION_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// `chrono` format of the timestamp fed into id derivation.
pub(crate) const ID_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f %z UTC";

/// Upper bound on collision probes for a single upload.
pub(crate) const MAX_NAME_PROBES: u32 = 10_000;

/// Prefix of the store's own working files. Uploads may not use it.
pub(crate) const RESERVED_NAME_PREFIX: &str = ".fileshelf-";

/// Suffix of a file staged for deletion.
pub(crate) const STAGED_DELETE_SUFFIX: &str = "deleting";

/// Longest type label that doubles as an extension for numbered names.
pub(crate) const MAX_FALLBACK_EXTENSION_BYTES: usize = 16;
