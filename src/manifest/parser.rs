//! manifest.xml parser.
//!
//! Reads `content` elements into entries. The canonical namespace is tried
//! first; when it yields nothing, the legacy namespaces and finally
//! un-namespaced elements are accepted with a warning.

use std::collections::HashSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::NsReader;
use tracing::debug;

use super::{Entry, ManifestDocument, ManifestError, LEGACY_MANIFEST_NAMESPACES, MANIFEST_NS};
use crate::formats::{registry, MANIFEST_KEY, METADATA_KEY};
use crate::issue::Issue;
use crate::paths;
use crate::xml::{attr_value, namespace_uri, resolve_attribute, ResolvedName};

/// A `content` element as written, before filtering.
#[derive(Debug, Clone, Default)]
struct RawContent {
    namespace: Option<String>,
    location: String,
    format: String,
    master: Option<String>,
}

/// Parse manifest XML into entries, the main entry and load issues.
///
/// Fails only when the text is not a well-formed XML document; every other
/// anomaly is reported through [`ManifestDocument::issues`].
pub fn decode_manifest(xml: &str) -> Result<ManifestDocument, ManifestError> {
    let contents = scan_contents(xml)?;
    let mut issues = Vec::new();

    let (namespace, selected) = select_namespace(&contents);
    if let Some(ns) = &namespace {
        if ns != MANIFEST_NS {
            issues.push(Issue::warning(format!("invalid namespace used: {}", ns)));
        }
    } else if !selected.is_empty() {
        issues.push(Issue::warning("invalid namespace used: content elements have no namespace"));
    }

    let formats = registry();
    let mut seen = HashSet::new();
    let mut entries: Vec<Entry> = Vec::new();
    let mut main_entry = None;
    let mut metadata_locations = Vec::new();

    for raw in selected {
        if raw.location.trim().is_empty() {
            issues.push(Issue::warning("content element without a location ignored"));
            continue;
        }
        let location = paths::normalize_location(&raw.location);

        if formats.is_format(METADATA_KEY, &raw.format) {
            metadata_locations.push(location);
            continue;
        }
        if formats.is_format(MANIFEST_KEY, &raw.format) {
            continue;
        }

        if !seen.insert(location.clone()) {
            issues.push(Issue::warning(format!("duplicate entry for {} ignored", location)));
            continue;
        }

        let mut master = raw
            .master
            .as_deref()
            .is_some_and(|m| m.trim().eq_ignore_ascii_case("true"));
        if master {
            if main_entry.is_none() {
                main_entry = Some(entries.len());
            } else {
                issues.push(Issue::warning(format!(
                    "more than one entry marked as master, {} ignored",
                    location
                )));
                master = false;
            }
        }

        entries.push(Entry {
            location,
            format: raw.format.clone(),
            master,
        });
    }

    if entries.is_empty() {
        issues.push(Issue::warning("archive is empty"));
    } else if entries.len() > 1 && main_entry.is_none() {
        issues.push(Issue::warning("archive has more than one entry, but no main element"));
    }

    debug!(
        "Decoded manifest: {} entries, {} metadata files, main={:?}",
        entries.len(),
        metadata_locations.len(),
        main_entry
    );

    Ok(ManifestDocument {
        entries,
        main_entry,
        metadata_locations,
        namespace,
        issues,
    })
}

/// Pick the content elements of the first namespace that has any.
fn select_namespace(contents: &[RawContent]) -> (Option<String>, Vec<&RawContent>) {
    let candidates = std::iter::once(MANIFEST_NS).chain(LEGACY_MANIFEST_NAMESPACES.iter().copied());
    for ns in candidates {
        let matching: Vec<_> = contents
            .iter()
            .filter(|c| c.namespace.as_deref() == Some(ns))
            .collect();
        if !matching.is_empty() {
            return (Some(ns.to_string()), matching);
        }
    }

    let bare = contents.iter().filter(|c| c.namespace.is_none()).collect();
    (None, bare)
}

/// Collect every `content` element below the root, whatever its namespace.
fn scan_contents(xml: &str) -> Result<Vec<RawContent>, ManifestError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut saw_root = false;
    let mut contents = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader
            .read_resolved_event_into(&mut buf)
            .map(|(ns, event)| (namespace_uri(ns), event))
        {
            Ok((_, Event::Eof)) => break,
            Ok((namespace, Event::Start(ref e))) => {
                depth += 1;
                saw_root = true;
                let name = ResolvedName::new(namespace, e.local_name());
                if let Some(content) = content_element(&reader, depth, name, e) {
                    contents.push(content);
                }
            }
            // Handle self-closing tags like <content location="..." />
            Ok((namespace, Event::Empty(ref e))) => {
                saw_root = true;
                let name = ResolvedName::new(namespace, e.local_name());
                if let Some(content) = content_element(&reader, depth + 1, name, e) {
                    contents.push(content);
                }
            }
            Ok((_, Event::End(_))) => depth = depth.saturating_sub(1),
            Ok(_) => {}
            Err(e) => {
                return Err(ManifestError::Xml {
                    position: reader.buffer_position(),
                    message: e.to_string(),
                });
            }
        }
        buf.clear();
    }

    if !saw_root {
        return Err(ManifestError::NoRootElement);
    }

    Ok(contents)
}

/// Read a `content` element's attributes; the root itself never counts.
fn content_element(
    reader: &NsReader<&[u8]>,
    depth: usize,
    name: ResolvedName,
    e: &BytesStart,
) -> Option<RawContent> {
    if depth < 2 || name.local != "content" {
        return None;
    }

    let mut content = RawContent {
        namespace: name.namespace,
        ..Default::default()
    };
    for attr in e.attributes().flatten() {
        match resolve_attribute(reader, &attr).local.as_str() {
            "location" => content.location = attr_value(&attr),
            "format" => content.format = attr_value(&attr),
            "master" => content.master = Some(attr_value(&attr)),
            _ => {}
        }
    }
    Some(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{MANIFEST_FORMAT, METADATA_FORMAT};
    use crate::issue::Severity;

    fn has_issue(doc: &ManifestDocument, needle: &str) -> bool {
        doc.issues.iter().any(|i| i.message.contains(needle))
    }

    #[test]
    fn test_parse_canonical_manifest() {
        let xml = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<omexManifest xmlns="{ns}">
    <content location="." format="http://identifiers.org/combine.specifications/omex" />
    <content location="./manifest.xml" format="{manifest}" />
    <content location="./BorisEJB.xml" format="http://identifiers.org/combine.specifications/sbml" master="true" />
    <content location="./paper/Kholodenko2000.pdf" format="application/pdf" />
    <content location="./metadata.rdf" format="{metadata}" />
</omexManifest>"#,
            ns = MANIFEST_NS,
            manifest = MANIFEST_FORMAT,
            metadata = METADATA_FORMAT
        );

        let doc = decode_manifest(&xml).unwrap();
        assert_eq!(doc.namespace.as_deref(), Some(MANIFEST_NS));
        assert_eq!(doc.entries.len(), 3);
        assert_eq!(doc.entries[0].location, ".");
        assert_eq!(doc.entries[1].location, "./BorisEJB.xml");
        assert_eq!(doc.main_entry, Some(1));
        assert!(doc.entries[1].master);
        assert_eq!(doc.metadata_locations, vec!["./metadata.rdf".to_string()]);
        assert!(doc.issues.is_empty(), "unexpected issues: {:?}", doc.issues);
    }

    #[test]
    fn test_master_is_case_insensitive() {
        let xml = format!(
            r#"<omexManifest xmlns="{}">
  <content location="a.xml" format="application/xml" master="TRUE"/>
  <content location="b.pdf" format="application/pdf" master="False"/>
</omexManifest>"#,
            MANIFEST_NS
        );
        let doc = decode_manifest(&xml).unwrap();
        assert_eq!(doc.main_entry, Some(0));
        assert!(!has_issue(&doc, "no main element"));
    }

    #[test]
    fn test_prefixed_canonical_namespace() {
        let xml = format!(
            r#"<m:omexManifest xmlns:m="{}"><m:content location="a.xml" format="x"></m:content></m:omexManifest>"#,
            MANIFEST_NS
        );
        let doc = decode_manifest(&xml).unwrap();
        assert_eq!(doc.entries.len(), 1);
        assert!(doc.issues.is_empty());
    }

    #[test]
    fn test_legacy_namespace_is_accepted_with_warning() {
        let xml = format!(
            r#"<omexManifest xmlns="{}"><content location="a.xml" format="application/xml" master="true"/></omexManifest>"#,
            LEGACY_MANIFEST_NAMESPACES[0]
        );
        let doc = decode_manifest(&xml).unwrap();
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.namespace.as_deref(), Some(LEGACY_MANIFEST_NAMESPACES[0]));
        assert!(has_issue(&doc, "invalid namespace used"));
    }

    #[test]
    fn test_missing_namespace_is_accepted_with_warning() {
        let xml = r#"<omexManifest><content location="a.xml" format="application/xml"/></omexManifest>"#;
        let doc = decode_manifest(xml).unwrap();
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.namespace, None);
        assert!(has_issue(&doc, "invalid namespace used"));
    }

    #[test]
    fn test_foreign_namespace_yields_nothing() {
        let xml = r#"<omexManifest xmlns="urn:other"><content location="a.xml" format="x"/></omexManifest>"#;
        let doc = decode_manifest(xml).unwrap();
        assert!(doc.entries.is_empty());
        assert!(has_issue(&doc, "archive is empty"));
    }

    #[test]
    fn test_empty_manifest_warns() {
        let xml = format!(r#"<omexManifest xmlns="{}"/>"#, MANIFEST_NS);
        let doc = decode_manifest(&xml).unwrap();
        assert!(doc.entries.is_empty());
        let issue = doc.issues.iter().find(|i| i.message == "archive is empty").unwrap();
        assert_eq!(issue.severity, Severity::Warning);
    }

    #[test]
    fn test_multiple_entries_without_master_warn() {
        let xml = format!(
            r#"<omexManifest xmlns="{}">
  <content location="A.xml" format="http://identifiers.org/combine.specifications/sbml"/>
  <content location="B.pdf" format="application/pdf"/>
  <content location="C.csv" format="text/csv"/>
</omexManifest>"#,
            MANIFEST_NS
        );
        let doc = decode_manifest(&xml).unwrap();
        assert_eq!(doc.main_entry, None);
        assert!(has_issue(&doc, "archive has more than one entry, but no main element"));
    }

    #[test]
    fn test_second_master_is_ignored() {
        let xml = format!(
            r#"<omexManifest xmlns="{}">
  <content location="a.xml" format="x" master="true"/>
  <content location="b.xml" format="x" master="true"/>
</omexManifest>"#,
            MANIFEST_NS
        );
        let doc = decode_manifest(&xml).unwrap();
        assert_eq!(doc.main_entry, Some(0));
        assert!(!doc.entries[1].master);
        assert!(has_issue(&doc, "more than one entry marked as master"));
    }

    #[test]
    fn test_duplicate_locations_are_dropped() {
        let xml = format!(
            r#"<omexManifest xmlns="{}">
  <content location="a.xml" format="application/xml"/>
  <content location="./a.xml" format="text/plain"/>
</omexManifest>"#,
            MANIFEST_NS
        );
        let doc = decode_manifest(&xml).unwrap();
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.entries[0].format, "application/xml");
        assert!(has_issue(&doc, "duplicate entry for ./a.xml"));
    }

    #[test]
    fn test_escaped_attributes() {
        let xml = format!(
            r#"<omexManifest xmlns="{}"><content location="./R&amp;D.txt" format="text/plain"/></omexManifest>"#,
            MANIFEST_NS
        );
        let doc = decode_manifest(&xml).unwrap();
        assert_eq!(doc.entries[0].location, "./R&D.txt");
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let result = decode_manifest("<omexManifest><content></omexManifest>");
        assert!(matches!(result, Err(ManifestError::Xml { .. })));
    }

    #[test]
    fn test_no_root_is_an_error() {
        assert!(matches!(decode_manifest(""), Err(ManifestError::NoRootElement)));
        assert!(matches!(
            decode_manifest("<?xml version='1.0'?>"),
            Err(ManifestError::NoRootElement)
        ));
    }
}
