//! manifest.xml writer.

use std::path::Path;

use super::{Entry, MANIFEST_FILE_NAME, MANIFEST_NS};
use crate::paths;
use crate::xml::escape;

/// XML declaration written at the top of every manifest.
pub const MANIFEST_DECLARATION: &str = "<?xml version='1.0' encoding='utf-8' standalone='yes'?>";

/// Serialize entries to manifest XML.
///
/// `main_entry` is an index into `entries`; that entry alone gets
/// `master="true"`. Absolute paths are made relative to `base_dir`.
pub fn encode_manifest(entries: &[Entry], main_entry: Option<usize>, base_dir: &Path) -> String {
    let mut xml = String::with_capacity(128 + entries.len() * 128);
    xml.push_str(MANIFEST_DECLARATION);
    xml.push('\n');
    xml.push_str(&format!("<omexManifest xmlns=\"{}\">\n", MANIFEST_NS));

    for (idx, entry) in entries.iter().enumerate() {
        let master = if main_entry == Some(idx) { "true" } else { "false" };
        xml.push_str(&format!(
            "  <content location=\"{}\" format=\"{}\" master=\"{}\" />\n",
            escape(&manifest_location(&entry.location, base_dir)),
            escape(&entry.format),
            master
        ));
    }

    xml.push_str("</omexManifest>\n");
    xml
}

/// Location as written into the manifest. The manifest's own entry is
/// written as `.`.
fn manifest_location(location: &str, base_dir: &Path) -> String {
    if paths::is_url(location) {
        return location.trim().to_string();
    }
    let path = Path::new(location);
    let normalized = if path.is_absolute() {
        paths::location_for_path(path, base_dir)
    } else {
        paths::normalize_location(location)
    };
    if normalized == format!("./{}", MANIFEST_FILE_NAME) {
        ".".to_string()
    } else {
        normalized
    }
}
