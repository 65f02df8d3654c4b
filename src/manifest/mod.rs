//! omexManifest codec.
//!
//! The manifest (`manifest.xml` at the archive root) lists every payload
//! with its location and format and marks at most one as master. Decoding
//! never fails on content problems: they are reported as [`Issue`]s so a
//! half-valid archive can still be opened.

mod entry;
mod parser;
mod writer;

pub use entry::Entry;
pub use parser::decode_manifest;
pub use writer::{encode_manifest, MANIFEST_DECLARATION};

use std::path::{Path, PathBuf};

use crate::issue::Issue;

/// Canonical manifest namespace.
pub const MANIFEST_NS: &str = "http://identifiers.org/combine.specifications/omex-manifest";

/// Namespaces written by older tools, accepted on read in this order.
pub const LEGACY_MANIFEST_NAMESPACES: &[&str] = &[
    "http://identifiers.org/combine.specifications/omex-manifest/",
    "http://identifiers.org/combine.specifications/omex",
];

pub const MANIFEST_FILE_NAME: &str = "manifest.xml";

/// Manifest parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("XML error at position {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("document has no root element")]
    NoRootElement,
}

/// Result of decoding a manifest.
#[derive(Debug, Clone, Default)]
pub struct ManifestDocument {
    /// User-visible entries in document order.
    pub entries: Vec<Entry>,
    /// Index into `entries` of the master entry.
    pub main_entry: Option<usize>,
    /// Locations of metadata sidecars listed in the manifest.
    pub metadata_locations: Vec<String>,
    /// Namespace the entries were read from; None for un-namespaced content.
    pub namespace: Option<String>,
    pub issues: Vec<Issue>,
}

impl ManifestDocument {
    pub fn main(&self) -> Option<&Entry> {
        self.main_entry.and_then(|idx| self.entries.get(idx))
    }
}

/// Path of the manifest inside a staging directory.
pub fn manifest_path(base_dir: &Path) -> PathBuf {
    base_dir.join(MANIFEST_FILE_NAME)
}

/// Check if a staging directory contains a manifest.
pub fn has_manifest(base_dir: &Path) -> bool {
    manifest_path(base_dir).is_file()
}
