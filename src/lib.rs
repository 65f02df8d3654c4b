//! omex - COMBINE/OMEX archive bundles
//!
//! Reads, edits and writes ZIP bundles that carry a manifest of payload
//! files (location, format, master flag) and optional RDF provenance
//! metadata per payload.

pub mod archive;
pub mod bundle;
pub mod config;
pub mod fetch;
pub mod formats;
pub mod issue;
pub mod manifest;
pub mod metadata;
pub mod paths;
pub mod xml;

pub use bundle::{resolve_description, Archive, ArchiveError};
pub use config::BundleConfig;
pub use fetch::{CancelToken, FetchError};
pub use formats::{registry, FormatRegistry};
pub use issue::{Issue, Severity};
pub use manifest::Entry;
pub use metadata::{Description, VCard};
