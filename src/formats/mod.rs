//! Format registry: alias keys to canonical format identifiers.
//!
//! Manifests tag each entry with a format identifier, either a COMBINE
//! specification URI (`http://identifiers.org/combine.specifications/sbml`)
//! or a MIME type (`application/pdf`). Users and file extensions refer to
//! the same formats by short aliases (`sbml`, `pdf`). The registry maps one
//! to the other.
//!
//! The table is built once on first use and never mutated; all lookups are
//! pure functions over it.
//!
//! # Example
//!
//! ```
//! use omex::formats::registry;
//!
//! let formats = registry();
//! assert_eq!(formats.guess_format("model.pdf"), "application/pdf");
//! assert!(formats.is_format("sed-ml", "http://identifiers.org/combine.specifications/sedml"));
//! ```

mod known;

pub use known::{
    ARCHIVE_FORMAT, CONTAINER_EXTENSIONS, KNOWN_FORMATS, MANIFEST_FORMAT, MANIFEST_KEY, METADATA_FORMAT,
    METADATA_KEY, OCTET_STREAM,
};

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::paths;

type AliasTable = &'static [(&'static str, &'static [&'static str])];

/// Format lookup errors
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Unknown format alias: {0}")]
    UnknownFormat(String),
}

static REGISTRY: Lazy<FormatRegistry> = Lazy::new(|| FormatRegistry::from_table(KNOWN_FORMATS));

/// The process-wide registry built from [`KNOWN_FORMATS`].
pub fn registry() -> &'static FormatRegistry {
    &REGISTRY
}

/// Check if an extension (without the dot) is one of the bundle container
/// conventions (`omex`, `sedx`, ...).
pub fn is_container_extension(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.').to_lowercase();
    CONTAINER_EXTENSIONS.contains(&ext.as_str())
}

/// Immutable alias table with pure lookups.
#[derive(Debug)]
pub struct FormatRegistry {
    table: AliasTable,
    aliases: HashMap<&'static str, &'static [&'static str]>,
}

impl FormatRegistry {
    /// Build a registry from an alias table. Later duplicates of a key are
    /// ignored.
    pub fn from_table(table: AliasTable) -> Self {
        let mut aliases = HashMap::with_capacity(table.len());
        for (key, identifiers) in table {
            if identifiers.is_empty() {
                continue;
            }
            aliases.entry(*key).or_insert(*identifiers);
        }
        Self { table, aliases }
    }

    /// All identifiers registered for an alias, canonical first.
    pub fn identifiers(&self, key: &str) -> Option<&'static [&'static str]> {
        self.aliases.get(key.trim().to_lowercase().as_str()).copied()
    }

    /// The canonical identifier for an alias.
    pub fn canonical(&self, key: &str) -> Result<&'static str, FormatError> {
        self.identifiers(key)
            .and_then(|ids| ids.first().copied())
            .ok_or_else(|| FormatError::UnknownFormat(key.to_string()))
    }

    /// Check if `value` is one of the identifiers of `alias`.
    ///
    /// Accepts legacy spellings: `is_format("sedml", ".../sed-ml")` and
    /// `is_format("sedml", ".../sedml")` are both true. Unknown aliases
    /// match nothing.
    pub fn is_format(&self, alias: &str, value: &str) -> bool {
        match self.identifiers(alias) {
            Some(ids) => ids.iter().any(|id| *id == value),
            None => false,
        }
    }

    /// Guess a format identifier from a file name's extension.
    ///
    /// A guess never yields the manifest or metadata identifiers, since
    /// entries tagged with those are regenerated on save. Bundle extensions
    /// (`.omex`, `.sbex`, ...) without a table entry of their own are nested
    /// archives. Anything else unknown is [`OCTET_STREAM`].
    pub fn guess_format(&self, filename: &str) -> &'static str {
        let Some(ext) = paths::extension(filename) else {
            return OCTET_STREAM;
        };
        match self.canonical(&ext) {
            Ok(id) if id != METADATA_FORMAT && id != MANIFEST_FORMAT => id,
            _ if is_container_extension(&ext) => ARCHIVE_FORMAT,
            _ => OCTET_STREAM,
        }
    }

    /// First alias (in table order) that lists `identifier`.
    pub fn alias_for(&self, identifier: &str) -> Option<&'static str> {
        self.table
            .iter()
            .find(|(_, ids)| ids.iter().any(|id| *id == identifier))
            .map(|(key, _)| *key)
    }

    /// Iterate over every alias key in table order.
    pub fn known_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.iter().map(|(key, _)| *key)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
