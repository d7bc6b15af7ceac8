//! Canonical file identifiers.

use crate::TextError;
use std::{fmt, str::FromStr};

/// Key of a record in the metadata index.
///
/// A `FileId` is always 32 lowercase hexadecimal characters (the rendering of a 128-bit
/// digest). Once constructed the value is guaranteed canonical, so it can be used as a map key
/// and echoed back to clients without further checks.
///
/// Externally supplied ids (query strings, CLI arguments) must already be canonical:
/// uppercase or otherwise decorated forms are rejected rather than normalised.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(String);

impl FileId {
    /// Validates an id string that must already be in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::InvalidId`] if `input` is not 32 lowercase hex characters.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        if Self::is_canonical(input) {
            return Ok(Self(input.to_owned()));
        }
        Err(TextError::InvalidId(input.to_owned()))
    }

    /// Renders a 128-bit digest as an id.
    pub fn from_digest(digest: [u8; 16]) -> Self {
        Self(hex::encode(digest))
    }

    /// Returns true if `input` is a canonical id.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FileId {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for FileId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for FileId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_canonical_id() {
        let id = FileId::parse("0cc175b9c0f1b6a831c399e269772661").unwrap();
        assert_eq!(id.as_str(), "0cc175b9c0f1b6a831c399e269772661");
        assert_eq!(id.to_string(), "0cc175b9c0f1b6a831c399e269772661");
    }

    #[test]
    fn parse_rejects_uppercase() {
        let result = FileId::parse("0CC175B9C0F1B6A831C399E269772661");
        assert!(matches!(result, Err(TextError::InvalidId(_))));
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(FileId::parse("0cc175b9").is_err());
        assert!(FileId::parse("0cc175b9c0f1b6a831c399e2697726610").is_err());
        assert!(FileId::parse("").is_err());
    }

    #[test]
    fn parse_rejects_non_hex() {
        assert!(FileId::parse("0cc175b9c0f1b6a831c399e26977266g").is_err());
        assert!(FileId::parse("../../../../etc/passwd/aaaaaaaaaa").is_err());
    }

    #[test]
    fn from_digest_is_canonical() {
        let id = FileId::from_digest([0xab; 16]);
        assert_eq!(id.as_str(), "ab".repeat(16));
        assert!(FileId::is_canonical(id.as_str()));
    }

    #[test]
    fn from_str_matches_parse() {
        let id: FileId = "ffffffffffffffffffffffffffffffff".parse().unwrap();
        assert_eq!(id, FileId::parse("ffffffffffffffffffffffffffffffff").unwrap());
    }

    #[test]
    fn deserialize_validates() {
        let ok: FileId = serde_json::from_str("\"00000000000000000000000000000000\"").unwrap();
        assert_eq!(ok.as_str().len(), 32);

        let bad: Result<FileId, _> = serde_json::from_str("\"not-an-id\"");
        assert!(bad.is_err());
    }
}
