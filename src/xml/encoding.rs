//! Text decoding for manifest and metadata files.
//!
//! quick-xml only reads UTF-8, but archives written by other tools may
//! carry UTF-16 documents. A byte-order mark picks the encoding; without
//! one the bytes must be UTF-8. Malformed input is an error rather than
//! being patched with replacement characters.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};

use super::XmlReadError;

/// Read a staged XML file into a UTF-8 string.
pub fn read_xml_file(path: &Path) -> Result<String, XmlReadError> {
    let bytes = fs::read(path).map_err(|source| XmlReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_xml_bytes(&bytes)
}

/// Decode XML bytes to a UTF-8 string, dropping any BOM.
pub fn decode_xml_bytes(bytes: &[u8]) -> Result<String, XmlReadError> {
    let (encoding, bom_len) = Encoding::for_bom(bytes).unwrap_or((UTF_8, 0));
    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
        .map(Cow::into_owned)
        .ok_or(XmlReadError::Malformed(encoding.name()))
}
