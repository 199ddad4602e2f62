//! Build identifiers for cache invalidation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 128-bit identifier bound to one compiled unit of code.
///
/// Build identifiers are opaque: two units with the same `BuildId` are assumed
/// to be the same build, and any change to a unit's code yields a different
/// identifier. They are rendered in the lowercase hyphenated GUID form
/// (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`) so persisted caches stay readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuildId([u8; 16]);

impl BuildId {
    /// Derives a build identifier from the content of a unit using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Wraps raw identifier bytes.
    pub const fn from_raw(raw: [u8; 16]) -> Self {
        Self(raw)
    }

    /// The all-zero identifier. Never produced by [`BuildId::from_bytes`] in practice.
    pub const fn nil() -> Self {
        Self([0; 16])
    }

    /// Returns `true` for the all-zero identifier.
    pub fn is_nil(&self) -> bool {
        self.0 == [0; 16]
    }

    /// Returns the raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Error returned when a string is not a valid build identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid build identifier '{input}'")]
pub struct ParseBuildIdError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for BuildId {
    type Err = ParseBuildIdError;

    /// Accepts the hyphenated, simple (32 hex digits) and braced GUID forms,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::try_parse(s.trim())
            .map(|u| Self(*u.as_bytes()))
            .map_err(|_| ParseBuildIdError {
                input: s.to_string(),
            })
    }
}

impl TryFrom<String> for BuildId {
    type Error = ParseBuildIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BuildId> for String {
    fn from(id: BuildId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = uuid::Uuid::encode_buffer();
        f.write_str(uuid::Uuid::from_bytes(self.0).hyphenated().encode_lower(&mut buf))
    }
}

impl fmt::Debug for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuildId({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}
