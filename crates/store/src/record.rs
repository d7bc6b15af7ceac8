//! Records, the index they live in, and the upload payload that creates them.

use crate::constants::RESERVED_NAME_PREFIX;
use crate::{StoreError, StoreResult};
use fileshelf_types::{DirPath, FileId, FileName, NonEmptyText, MAX_FILE_NAME_BYTES};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The whole metadata index: every stored file keyed by its id.
///
/// A `BTreeMap` keeps the persisted document in a stable key order.
pub type Index = BTreeMap<FileId, FileRecord>;

/// Metadata for one stored file.
///
/// Field names on the wire follow the persisted document:
/// `{ "name", "path", "type", "size", "modificationTime" }`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileRecord {
    /// Physical file name (the uploaded name, possibly disambiguated)
    pub name: FileName,

    /// Forward-slash path relative to the storage root, including `name`
    pub path: String,

    /// Caller-supplied type label
    #[serde(rename = "type")]
    pub type_label: NonEmptyText,

    /// Size in bytes, read back from the filesystem after the write
    pub size: u64,

    /// Modification time at write, `MM/DD/YYYY hh:mm:ss` (UTC)
    #[serde(rename = "modificationTime")]
    pub modification_time: String,
}

impl FileRecord {
    /// Resolves the record's logical path below `storage_root`.
    ///
    /// The stored path is validated segment by segment, so a hand-edited index cannot point
    /// outside the root.
    pub fn physical_path(&self, id: &FileId, storage_root: &Path) -> StoreResult<PathBuf> {
        let logical = DirPath::parse(&self.path).map_err(|e| StoreError::CorruptRecord {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        if logical.is_root() {
            return Err(StoreError::CorruptRecord {
                id: id.to_string(),
                reason: "path is empty".into(),
            });
        }
        Ok(logical.resolve(storage_root))
    }
}

/// An upload as received from a caller, before validation.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    /// Logical directory; empty means the storage root
    pub directory: String,
    /// Display name of the file
    pub name: String,
    /// Type label; when empty it is detected from the bytes
    pub type_label: String,
    /// Size claimed by the caller. Advisory only; the stored size is read back from disk.
    pub size: Option<u64>,
    pub bytes: Vec<u8>,
}

/// An upload whose fields have passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub directory: DirPath,
    pub name: FileName,
    pub type_label: NonEmptyText,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Validates all fields at once, reporting every problem in a single error.
    ///
    /// An empty type label is replaced by the extension detected from the content. An upload
    /// whose type can be neither read nor detected is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ValidationFailed`] listing each invalid field.
    pub fn validate(self) -> StoreResult<ValidatedUpload> {
        let mut problems = Vec::new();

        let directory = DirPath::parse(&self.directory)
            .map_err(|e| problems.push(e.to_string()))
            .ok()
            .filter(|dir| {
                let reserved = dir
                    .as_str()
                    .split('/')
                    .any(|segment| segment.starts_with(RESERVED_NAME_PREFIX));
                if reserved {
                    problems.push(format!(
                        "invalid directory '{}': segments starting with '{}' are reserved",
                        dir, RESERVED_NAME_PREFIX
                    ));
                }
                !reserved
            });

        let name = if self.name.is_empty() {
            problems.push("missing field: name".to_string());
            None
        } else if self.name.starts_with(RESERVED_NAME_PREFIX) {
            problems.push(format!(
                "invalid file name '{}': names starting with '{}' are reserved",
                self.name, RESERVED_NAME_PREFIX
            ));
            None
        } else if self.name.len() > MAX_FILE_NAME_BYTES {
            problems.push(format!(
                "invalid file name: longer than {MAX_FILE_NAME_BYTES} bytes"
            ));
            None
        } else {
            FileName::parse(&self.name)
                .map_err(|e| problems.push(e.to_string()))
                .ok()
        };

        let type_label = NonEmptyText::new(&self.type_label)
            .ok()
            .or_else(|| detect_type_label(&self.bytes));
        if type_label.is_none() {
            problems.push("missing field: type (not detectable from content)".to_string());
        }

        if let Some(claimed) = self.size {
            if claimed != self.bytes.len() as u64 {
                tracing::debug!(
                    "upload size mismatch: claimed {} bytes, received {}",
                    claimed,
                    self.bytes.len()
                );
            }
        }

        match (directory, name, type_label) {
            (Some(directory), Some(name), Some(type_label)) if problems.is_empty() => {
                Ok(ValidatedUpload {
                    directory,
                    name,
                    type_label,
                    bytes: self.bytes,
                })
            }
            _ => Err(StoreError::ValidationFailed(problems.join("; "))),
        }
    }
}

/// Best-effort type label from magic bytes, e.g. `png`.
fn detect_type_label(bytes: &[u8]) -> Option<NonEmptyText> {
    infer::get(bytes).and_then(|kind| NonEmptyText::new(kind.extension()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn upload(directory: &str, name: &str, type_label: &str) -> Upload {
        Upload {
            directory: directory.into(),
            name: name.into(),
            type_label: type_label.into(),
            size: None,
            bytes: b"hello".to_vec(),
        }
    }

    #[test]
    fn validate_accepts_complete_upload() {
        let valid = upload("ht/monthly", "earth.png", "png").validate().unwrap();
        assert_eq!(valid.directory.as_str(), "ht/monthly");
        assert_eq!(valid.name.as_str(), "earth.png");
        assert_eq!(valid.type_label.as_str(), "png");
        assert_eq!(valid.bytes, b"hello");
    }

    #[test]
    fn validate_allows_root_directory() {
        let valid = upload("", "notes.txt", "txt").validate().unwrap();
        assert!(valid.directory.is_root());
    }

    #[test]
    fn validate_reports_every_problem() {
        let err = upload("../etc", "", "txt").validate().unwrap_err();
        let StoreError::ValidationFailed(message) = err else {
            panic!("expected validation failure");
        };
        assert!(message.contains("../etc"));
        assert!(message.contains("missing field: name"));
    }

    #[test]
    fn validate_rejects_traversal_in_name() {
        let err = upload("docs", "../../passwd", "txt").validate().unwrap_err();
        assert!(matches!(err, StoreError::ValidationFailed(_)));
    }

    #[test]
    fn validate_rejects_reserved_names() {
        for name in [".fileshelf-metadata.json.tmp", ".fileshelf-0123.deleting"] {
            let err = upload("", name, "tmp").validate().unwrap_err();
            let StoreError::ValidationFailed(message) = err else {
                panic!("expected validation failure for {name}");
            };
            assert!(message.contains("reserved"));
        }
    }

    #[test]
    fn validate_rejects_reserved_directory_segments() {
        for dir in [".fileshelf-metadata.json.tmp", "a/.fileshelf-x/b"] {
            assert!(
                matches!(
                    upload(dir, "x.txt", "txt").validate(),
                    Err(StoreError::ValidationFailed(_))
                ),
                "{dir}"
            );
        }
        assert!(upload("a/fileshelf-x", "x.txt", "txt").validate().is_ok());
    }

    #[test]
    fn validate_rejects_overlong_name() {
        let longest = format!("{}.txt", "a".repeat(MAX_FILE_NAME_BYTES - 4));
        assert!(upload("d", &longest, "txt").validate().is_ok());

        let name = format!("{}.txt", "a".repeat(MAX_FILE_NAME_BYTES - 3));
        assert!(matches!(
            upload("d", &name, "txt").validate(),
            Err(StoreError::ValidationFailed(_))
        ));
    }

    #[test]
    fn validate_detects_missing_type_from_content() {
        let mut up = upload("img", "earth", "");
        up.bytes = PNG_HEADER.to_vec();
        let valid = up.validate().unwrap();
        assert_eq!(valid.type_label.as_str(), "png");
    }

    #[test]
    fn validate_rejects_undetectable_type() {
        let err = upload("docs", "notes", "  ").validate().unwrap_err();
        let StoreError::ValidationFailed(message) = err else {
            panic!("expected validation failure");
        };
        assert!(message.contains("type"));
    }

    #[test]
    fn record_serialises_with_wire_names() {
        let record = FileRecord {
            name: FileName::parse("earth.png").unwrap(),
            path: "ht/monthly/earth.png".into(),
            type_label: NonEmptyText::new("png").unwrap(),
            size: 312866,
            modification_time: "01/02/2024 15:04:05".into(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "png");
        assert_eq!(value["modificationTime"], "01/02/2024 15:04:05");
        assert_eq!(value["size"], 312866);
        assert!(value.get("type_label").is_none());
    }

    #[test]
    fn physical_path_rejects_escaping_paths() {
        let id = FileId::parse("00000000000000000000000000000000").unwrap();
        let mut record = FileRecord {
            name: FileName::parse("x").unwrap(),
            path: "../x".into(),
            type_label: NonEmptyText::new("bin").unwrap(),
            size: 0,
            modification_time: String::new(),
        };

        let err = record.physical_path(&id, Path::new("/root")).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));

        record.path = "a/x".into();
        assert_eq!(
            record.physical_path(&id, Path::new("/root")).unwrap(),
            PathBuf::from("/root/a/x")
        );
    }
}
