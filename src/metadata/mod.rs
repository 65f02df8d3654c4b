//! OMEX metadata codec (RDF/XML descriptions with vCard creators).
//!
//! Each metadata file holds one or more `rdf:Description` records keyed by
//! `rdf:about`, the location of the described entry (`.` for the archive
//! itself). The writer always emits one description per document.

mod description;
mod parser;
mod timestamp;
mod vcard;
mod writer;

pub use description::Description;
pub use parser::decode_metadata;
pub use timestamp::{format_w3cdtf, parse_w3cdtf};
pub use vcard::VCard;
pub use writer::{encode_description, encode_description_at};

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
pub const VCARD_NS: &str = "http://www.w3.org/2006/vcard/ns#";

/// Metadata parsing errors
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("XML error at position {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("invalid W3CDTF timestamp: {0:?}")]
    Timestamp(String),

    #[error("description of '{about}' rejected: {reason}")]
    Rejected { about: String, reason: String },
}

/// Result of decoding one metadata file.
#[derive(Debug, Default)]
pub struct MetadataDocument {
    pub descriptions: Vec<Description>,
    /// Descriptions that were present but unreadable.
    pub rejected: Vec<MetadataError>,
}

/// File name used for the `index`-th description when saving.
pub fn metadata_file_name(index: usize) -> String {
    format!("metadata{}.xml", index)
}

/// Find the description of `location` among `descriptions`.
///
/// An entry's description is the first record whose `about` equals the
/// entry's location.
pub fn resolve_description<'a>(
    descriptions: &'a [Description],
    location: &str,
) -> Option<&'a Description> {
    descriptions.iter().find(|d| d.describes(location))
}
