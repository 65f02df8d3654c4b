//! Manifest entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::formats::{registry, MANIFEST_KEY, METADATA_KEY};
use crate::paths;

/// One payload listed in the manifest.
///
/// An entry holds no reference to its archive; descriptions and staged
/// files are resolved by location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// `./`-prefixed relative path, `.` for the archive itself, or a URL.
    pub location: String,
    /// Canonical identifier or arbitrary MIME string.
    pub format: String,
    /// Whether this is the archive's primary payload.
    #[serde(default)]
    pub master: bool,
}

impl Entry {
    /// Create a non-master entry; the location is normalized.
    pub fn new(location: impl AsRef<str>, format: impl Into<String>) -> Self {
        Self {
            location: paths::normalize_location(location.as_ref()),
            format: format.into(),
            master: false,
        }
    }

    pub fn is_url(&self) -> bool {
        paths::is_url(&self.location)
    }

    /// Last path component of the location.
    pub fn file_name(&self) -> &str {
        paths::file_name(&self.location)
    }

    /// Check if this entry refers to `location` (ignoring `./` prefixes).
    pub fn matches_location(&self, location: &str) -> bool {
        paths::locations_equal(&self.location, location)
    }

    /// Manifest and metadata sidecars are rebuilt on every save and never
    /// shown as payloads.
    pub fn is_bookkeeping(&self) -> bool {
        let formats = registry();
        formats.is_format(METADATA_KEY, &self.format) || formats.is_format(MANIFEST_KEY, &self.format)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.location, self.format)
    }
}
