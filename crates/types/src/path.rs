//! Logical directories and file names.
//!
//! Logical paths are forward-slash joined and relative to the storage root. Neither type
//! can express a path that escapes the root: empty segments, `.` and `..` are rejected, as are
//! backslashes and NUL bytes.

use crate::TextError;
use std::fmt;
use std::path::{Path, PathBuf};

/// Longest file name in bytes that a new upload may use.
///
/// Disambiguated variants (`stem(n).ext`) with a short fallback extension still fit in the
/// common 255-byte filesystem limit, which [`FileName::parse`] enforces.
pub const MAX_FILE_NAME_BYTES: usize = 200;

const MAX_SEGMENT_BYTES: usize = 255;

fn segment_problem(segment: &str) -> Option<&'static str> {
    if segment.is_empty() {
        return Some("empty path segment");
    }
    if segment.len() > MAX_SEGMENT_BYTES {
        return Some("path segment is longer than 255 bytes");
    }
    if segment == "." || segment == ".." {
        return Some("relative path segments are not allowed");
    }
    if segment.contains('\\') {
        return Some("backslashes are not allowed");
    }
    if segment.contains('\0') {
        return Some("NUL bytes are not allowed");
    }
    None
}

/// A logical directory below the storage root, e.g. `ht/monthly`.
///
/// Leading and trailing slashes are stripped, so `"/ht/monthly/"` and `"ht/monthly"` name the
/// same directory. The empty string is the storage root itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DirPath(String);

impl DirPath {
    /// Validates a logical directory.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::InvalidDirectory`] if any segment is empty, `.`, `..`, or contains
    /// a backslash or NUL byte.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        let trimmed = input.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        for segment in trimmed.split('/') {
            if let Some(reason) = segment_problem(segment) {
                return Err(TextError::InvalidDirectory {
                    input: input.to_owned(),
                    reason,
                });
            }
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// The storage root.
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the logical path of `name` inside this directory.
    pub fn join(&self, name: &FileName) -> String {
        if self.is_root() {
            name.as_str().to_owned()
        } else {
            format!("{}/{}", self.0, name.as_str())
        }
    }

    /// Resolves this directory against a physical root.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        if !self.is_root() {
            path.extend(self.0.split('/'));
        }
        path
    }
}

impl fmt::Display for DirPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single path segment naming a stored file, e.g. `earth.png`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileName(String);

impl FileName {
    /// Validates a file name.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::InvalidFileName`] if `input` is empty, `.`, `..`, longer than
    /// 255 bytes, or contains a path separator or NUL byte.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        let reason = if input.contains('/') {
            Some("path separators are not allowed")
        } else {
            segment_problem(input)
        };

        match reason {
            Some(reason) => Err(TextError::InvalidFileName {
                input: input.to_owned(),
                reason,
            }),
            None => Ok(Self(input.to_owned())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split_extension(&self) -> (&str, Option<&str>) {
        // A leading dot marks a hidden file, not an extension.
        match self.0.rfind('.') {
            Some(idx) if idx > 0 && idx + 1 < self.0.len() => {
                (&self.0[..idx], Some(&self.0[idx + 1..]))
            }
            _ => (&self.0, None),
        }
    }

    /// The name without its final extension.
    pub fn stem(&self) -> &str {
        self.split_extension().0
    }

    /// The final extension, if the name has one.
    pub fn extension(&self) -> Option<&str> {
        self.split_extension().1
    }

    /// Builds the `n`th disambiguated variant of this name: `stem(n).ext`.
    ///
    /// The name's own extension is kept. When the name has none, `fallback_extension` is
    /// used instead (if given).
    pub fn numbered(&self, n: u32, fallback_extension: Option<&str>) -> FileName {
        let (stem, extension) = self.split_extension();
        match extension.or(fallback_extension) {
            Some(ext) => FileName(format!("{stem}({n}).{ext}")),
            None => FileName(format!("{stem}({n})")),
        }
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for FileName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for FileName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileName::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_path_strips_outer_slashes() {
        let dir = DirPath::parse("/ht/monthly/").unwrap();
        assert_eq!(dir.as_str(), "ht/monthly");
    }

    #[test]
    fn dir_path_empty_is_root() {
        assert!(DirPath::parse("").unwrap().is_root());
        assert!(DirPath::parse("/").unwrap().is_root());
    }

    #[test]
    fn dir_path_rejects_traversal() {
        for input in ["..", "a/../b", "./a", "a//b", "a\\b", "a/\0"] {
            assert!(
                matches!(
                    DirPath::parse(input),
                    Err(TextError::InvalidDirectory { .. })
                ),
                "expected rejection for {input:?}"
            );
        }
    }

    #[test]
    fn dir_path_join_and_resolve() {
        let name = FileName::parse("earth.png").unwrap();
        let dir = DirPath::parse("ht/monthly").unwrap();
        assert_eq!(dir.join(&name), "ht/monthly/earth.png");
        assert_eq!(DirPath::root().join(&name), "earth.png");

        let resolved = dir.resolve(Path::new("/srv/data"));
        assert_eq!(resolved, PathBuf::from("/srv/data/ht/monthly"));
        assert_eq!(
            DirPath::root().resolve(Path::new("/srv/data")),
            PathBuf::from("/srv/data")
        );
    }

    #[test]
    fn file_name_rejects_separators() {
        for input in ["", ".", "..", "a/b", "..\\evil", "bad\0name"] {
            assert!(
                matches!(
                    FileName::parse(input),
                    Err(TextError::InvalidFileName { .. })
                ),
                "expected rejection for {input:?}"
            );
        }
    }

    #[test]
    fn file_name_stem_and_extension() {
        let name = FileName::parse("archive.tar.gz").unwrap();
        assert_eq!(name.stem(), "archive.tar");
        assert_eq!(name.extension(), Some("gz"));

        let hidden = FileName::parse(".env").unwrap();
        assert_eq!(hidden.stem(), ".env");
        assert_eq!(hidden.extension(), None);

        let trailing = FileName::parse("notes.").unwrap();
        assert_eq!(trailing.extension(), None);
    }

    #[test]
    fn numbered_keeps_extension() {
        let name = FileName::parse("earth.png").unwrap();
        assert_eq!(name.numbered(1, Some("jpeg")).as_str(), "earth(1).png");
        assert_eq!(name.numbered(12, None).as_str(), "earth(12).png");
    }

    #[test]
    fn numbered_uses_fallback_without_extension() {
        let name = FileName::parse("README").unwrap();
        assert_eq!(name.numbered(2, Some("txt")).as_str(), "README(2).txt");
        assert_eq!(name.numbered(2, None).as_str(), "README(2)");
    }

    #[test]
    fn file_name_length_is_capped() {
        let longest = format!("{}.txt", "a".repeat(MAX_FILE_NAME_BYTES - 4));
        let name = FileName::parse(&longest).unwrap();
        let numbered = name.numbered(10_000, None);
        assert!(numbered.as_str().len() <= 255);
        assert_eq!(FileName::parse(numbered.as_str()).unwrap(), numbered);

        assert!(matches!(
            FileName::parse(&"a".repeat(256)),
            Err(TextError::InvalidFileName { .. })
        ));
    }

    #[test]
    fn dir_path_rejects_overlong_segment() {
        let segment = "d".repeat(256);
        assert!(DirPath::parse(&format!("ok/{segment}")).is_err());
        assert!(DirPath::parse(&"d".repeat(255)).is_ok());
    }
}
