//! Shared XML plumbing for the manifest and metadata codecs.
//!
//! Documents are decoded to UTF-8 first (see [`decode_xml_bytes`]), then
//! walked with quick-xml's namespace-aware `NsReader`. The helpers here turn
//! its borrowed resolution results into owned names the codecs can match on.

mod encoding;

pub use encoding::{decode_xml_bytes, read_xml_file};

use std::path::PathBuf;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesStart;
use quick_xml::name::{LocalName, ResolveResult};
use quick_xml::NsReader;

/// Failure to turn a staged file into XML text.
#[derive(Debug, thiserror::Error)]
pub enum XmlReadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("document is not valid {0}")]
    Malformed(&'static str),
}

/// Attribute value with entity references (`&quot;`, `&amp;`, ...) decoded.
pub fn attr_value(attr: &Attribute) -> String {
    attr.unescape_value()
        .map(|s| s.to_string())
        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned())
}

/// Read the text content of a leaf element and consume its end tag.
///
/// The caller must already have seen `start`; the returned text is
/// unescaped and trimmed.
pub fn read_leaf_text(
    reader: &mut NsReader<&[u8]>,
    start: &BytesStart,
) -> Result<String, quick_xml::Error> {
    let raw = reader.read_text(start.name())?;
    let text = match quick_xml::escape::unescape(&raw) {
        Ok(text) => text.trim().to_string(),
        Err(_) => raw.trim().to_string(),
    };
    Ok(text)
}

/// Escape text for element content and attribute values.
pub fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// An element or attribute name with its prefix resolved.
///
/// Unbound names and names with an undeclared prefix have no namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub namespace: Option<String>,
    pub local: String,
}

impl ResolvedName {
    pub fn new(namespace: Option<String>, local: LocalName) -> Self {
        Self {
            namespace,
            local: String::from_utf8_lossy(local.as_ref()).into_owned(),
        }
    }

    /// True when the name is `local` in namespace `ns`.
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == Some(ns)
    }
}

/// Owned namespace URI of a resolution result.
///
/// Convert right after `read_resolved_event_into` so the reader is free to
/// be used again while the event is handled.
pub fn namespace_uri(result: ResolveResult) -> Option<String> {
    match result {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        ResolveResult::Unbound | ResolveResult::Unknown(_) => None,
    }
}

/// Resolve an attribute key in the reader's current scope.
pub fn resolve_attribute(reader: &NsReader<&[u8]>, attr: &Attribute) -> ResolvedName {
    let (namespace, local) = reader.resolve_attribute(attr.key);
    ResolvedName::new(namespace_uri(namespace), local)
}
