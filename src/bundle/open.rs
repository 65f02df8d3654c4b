//! Loading an archive file into an [`Archive`].
//!
//! Unopened -> Unzipped -> ManifestParsed | DirectoryListed
//!          -> MetadataMerged -> Ready

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{Archive, ArchiveError};
use crate::archive;
use crate::config::BundleConfig;
use crate::formats::{registry, METADATA_KEY};
use crate::issue::Issue;
use crate::manifest::{self, decode_manifest, Entry};
use crate::metadata::{decode_metadata, resolve_description};
use crate::paths;
use crate::xml::read_xml_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenState {
    Unopened,
    Unzipped,
    ManifestParsed,
    DirectoryListed,
    MetadataMerged,
    Ready,
}

impl fmt::Display for OpenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpenState::Unopened => "unopened",
            OpenState::Unzipped => "unzipped",
            OpenState::ManifestParsed => "manifest parsed",
            OpenState::DirectoryListed => "directory listed",
            OpenState::MetadataMerged => "metadata merged",
            OpenState::Ready => "ready",
        };
        f.write_str(name)
    }
}

fn advance(state: &mut OpenState, next: OpenState, path: &Path) {
    debug!("{}: {} -> {}", path.display(), state, next);
    *state = next;
}

pub(super) fn open_archive(path: &Path, config: BundleConfig) -> Result<Archive, ArchiveError> {
    config.validate()?;
    fs::create_dir_all(&config.staging_root)
        .map_err(|e| ArchiveError::io(&config.staging_root, e))?;

    let mut state = OpenState::Unopened;
    let report = archive::unpack(path, &config.staging_root)?;
    advance(&mut state, OpenState::Unzipped, path);

    let mut bundle = Archive::empty(report.staging_dir, config);
    if let Some(name) = path.file_name() {
        bundle.archive_file_name = name.to_string_lossy().into_owned();
    }
    for skipped in &report.skipped {
        bundle.issues.push(Issue::warning(format!(
            "entry {} could not be extracted: {}",
            skipped.name, skipped.reason
        )));
    }

    let mut metadata_locations = if manifest::has_manifest(&bundle.base_dir) {
        let locations = load_manifest(&mut bundle);
        advance(&mut state, OpenState::ManifestParsed, path);
        locations
    } else {
        list_directory(&mut bundle, path)?;
        advance(&mut state, OpenState::DirectoryListed, path);
        Vec::new()
    };
    metadata_locations.extend(take_bookkeeping(&mut bundle));

    merge_metadata(&mut bundle, &metadata_locations);
    advance(&mut state, OpenState::MetadataMerged, path);

    if bundle.main_entry.is_none() && !bundle.descriptions.is_empty() {
        bundle.main_entry = bundle
            .entries
            .iter()
            .position(|e| resolve_description(&bundle.descriptions, &e.location).is_some());
    }
    bundle.sync_master_flags();
    advance(&mut state, OpenState::Ready, path);

    info!(
        "Opened {}: {} entries, {} descriptions, {} issues",
        path.display(),
        bundle.entries.len(),
        bundle.descriptions.len(),
        bundle.issues.len()
    );
    Ok(bundle)
}

/// Decode manifest.xml; returns the metadata locations it lists.
fn load_manifest(bundle: &mut Archive) -> Vec<String> {
    let manifest_path = manifest::manifest_path(&bundle.base_dir);
    let decoded = read_xml_file(&manifest_path)
        .map_err(|e| e.to_string())
        .and_then(|xml| decode_manifest(&xml).map_err(|e| e.to_string()));

    match decoded {
        Ok(doc) => {
            bundle.entries = doc.entries;
            bundle.main_entry = doc.main_entry;
            bundle.issues.extend(doc.issues);
            doc.metadata_locations
        }
        Err(message) => {
            warn!("Unreadable manifest in {}: {}", bundle.base_dir.display(), message);
            bundle
                .issues
                .push(Issue::error(format!("no valid xml document given: {}", message)));
            Vec::new()
        }
    }
}

/// Synthesize one entry per staged file when there is no manifest.
///
/// The main entry is the file named after the archive: `model.xml` for
/// `model.omex`, or either `model.sbml.xml` or `model.xml` for
/// `model.sbml.omex`.
fn list_directory(bundle: &mut Archive, archive_path: &Path) -> Result<(), ArchiveError> {
    let formats = registry();

    for item in WalkDir::new(&bundle.base_dir).sort_by_file_name() {
        let item = item.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| bundle.base_dir.clone());
            ArchiveError::io(path, e.into())
        })?;
        if !item.file_type().is_file() {
            continue;
        }
        let location = paths::location_for_path(item.path(), &bundle.base_dir);
        let format = formats.guess_format(&location);
        bundle.entries.push(Entry::new(&location, format));
    }

    let stem = archive_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let candidates = [
        format!("{}.xml", stem),
        format!("{}.xml", paths::file_stem(&stem)),
    ];
    bundle.main_entry = bundle.entries.iter().position(|e| {
        candidates
            .iter()
            .any(|c| e.file_name().eq_ignore_ascii_case(c))
    });

    bundle.issues.push(Issue::info(
        "no manifest found, entries were listed from the archive contents",
    ));
    debug!(
        "Listed {} files, main={:?}",
        bundle.entries.len(),
        bundle.main_entry
    );
    Ok(())
}

/// Pull metadata and manifest entries out of the public entry list,
/// returning the metadata locations. The main entry follows its location.
fn take_bookkeeping(bundle: &mut Archive) -> Vec<String> {
    let main_location = bundle.main_entry().map(|e| e.location.clone());
    let (bookkeeping, entries): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut bundle.entries)
        .into_iter()
        .partition(Entry::is_bookkeeping);
    bundle.entries = entries;
    bundle.main_entry = main_location.and_then(|loc| bundle.position(&loc));

    let formats = registry();
    bookkeeping
        .into_iter()
        .filter(|e| formats.is_format(METADATA_KEY, &e.format))
        .map(|e| e.location)
        .collect()
}

/// Decode every local metadata file listed in the archive.
fn merge_metadata(bundle: &mut Archive, locations: &[String]) {
    for location in locations {
        if paths::is_url(location) {
            bundle.issues.push(Issue::warning(format!(
                "metadata at remote location {} is not supported",
                location
            )));
            continue;
        }
        let Some(path) = paths::path_for_location(location, &bundle.base_dir).filter(|p| p.is_file())
        else {
            bundle
                .issues
                .push(Issue::warning(format!("metadata file {} is missing", location)));
            continue;
        };

        let decoded = read_xml_file(&path)
            .map_err(|e| e.to_string())
            .and_then(|xml| decode_metadata(&xml).map_err(|e| e.to_string()));
        match decoded {
            Ok(doc) => {
                for rejected in doc.rejected {
                    bundle
                        .issues
                        .push(Issue::warning(format!("{}: {}", location, rejected)));
                }
                bundle.descriptions.extend(doc.descriptions);
            }
            Err(message) => {
                warn!("Unreadable metadata {}: {}", location, message);
                bundle.issues.push(Issue::error(format!(
                    "metadata file {} could not be read: {}",
                    location, message
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::formats::{ARCHIVE_FORMAT, MANIFEST_FORMAT, METADATA_FORMAT};
    use crate::issue::Severity;
    use crate::manifest::LEGACY_MANIFEST_NAMESPACES;
    use tempfile::tempdir;

    const METADATA: &str = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dcterms="http://purl.org/dc/terms/"
         xmlns:vCard="http://www.w3.org/2006/vcard/ns#">
  <rdf:Description rdf:about="./B.xml">
    <dcterms:description>second model</dcterms:description>
    <dcterms:creator><rdf:Bag><rdf:li rdf:parseType="Resource">
      <vCard:n rdf:parseType="Resource"><vCard:given-name>Ada</vCard:given-name></vCard:n>
    </rdf:li></rdf:Bag></dcterms:creator>
  </rdf:Description>
</rdf:RDF>"#;

    fn has_issue(archive: &Archive, needle: &str) -> bool {
        archive.validate().iter().any(|i| i.message.contains(needle))
    }

    #[test]
    fn test_open_without_manifest_lists_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("BorisEJB.omex");
        write_zip(
            &path,
            &[
                ("BorisEJB.xml", b"<sbml/>"),
                ("paper/Kholodenko2000.pdf", b"%PDF"),
                ("notes.txt", b"hello"),
            ],
        );

        let archive = Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();
        assert_eq!(archive.entries().len(), 3);
        assert_eq!(archive.main_entry().unwrap().location, "./BorisEJB.xml");
        assert_eq!(archive.entry("paper/Kholodenko2000.pdf").unwrap().format, "application/pdf");
        assert_eq!(archive.entry("notes.txt").unwrap().format, "text/plain");
        assert_eq!(archive.archive_file_name(), "BorisEJB.omex");
        assert!(has_issue(&archive, "no manifest found"));
    }

    #[test]
    fn test_nested_bundle_survives_listing_and_save() {
        let dir = tempdir().unwrap();
        let inner = dir.path().join("inner.omex");
        write_zip(&inner, &[("inner.xml", b"<sbml/>")]);
        let inner_bytes = fs::read(&inner).unwrap();

        let path = dir.path().join("bundle.omex");
        write_zip(&path, &[("bundle.xml", b"<sbml/>"), ("inner.omex", inner_bytes.as_slice())]);

        let mut archive =
            Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();
        assert_eq!(archive.entries().len(), 2);
        assert_eq!(archive.entry("inner.omex").unwrap().format, ARCHIVE_FORMAT);

        let saved = dir.path().join("saved.omex");
        archive.save_to(&saved).unwrap();
        let reopened =
            Archive::open_with_config(&saved, test_config(&dir.path().join("reopened"))).unwrap();

        let locations: Vec<_> = reopened.entries().iter().map(|e| e.location.as_str()).collect();
        assert_eq!(locations, vec!["./bundle.xml", "./inner.omex"]);
        assert_eq!(reopened.entry("inner.omex").unwrap().format, ARCHIVE_FORMAT);
        assert_eq!(reopened.entry_bytes("inner.omex").unwrap(), inner_bytes);
        assert_eq!(reopened.main_entry().unwrap().location, "./bundle.xml");
    }

    #[test]
    fn test_take_bookkeeping_collects_metadata_and_keeps_main() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::empty(dir.path().to_path_buf(), test_config(dir.path()));
        archive.entries = vec![
            Entry::new("./metadata.rdf", METADATA_FORMAT),
            Entry::new("./manifest.xml", MANIFEST_FORMAT),
            Entry::new("./model.xml", SBML),
        ];
        archive.main_entry = Some(2);

        let locations = take_bookkeeping(&mut archive);
        assert_eq!(locations, vec!["./metadata.rdf".to_string()]);
        assert_eq!(archive.entries().len(), 1);
        assert_eq!(archive.main_entry().unwrap().location, "./model.xml");
    }

    #[test]
    fn test_directory_listing_matches_double_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.sbml.omex");
        write_zip(&path, &[("a.txt", b"a"), ("MODEL.xml", b"<sbml/>")]);

        let archive = Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();
        assert_eq!(archive.main_entry().unwrap().location, "./MODEL.xml");
    }

    #[test]
    fn test_open_with_single_master() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("two.omex");
        let manifest = manifest_xml(&[
            ("./manifest.xml", MANIFEST_FORMAT, false),
            ("./A.xml", SBML, true),
            ("./B.pdf", "application/pdf", false),
        ]);
        write_zip(
            &path,
            &[("manifest.xml", manifest.as_bytes()), ("A.xml", b"<sbml/>"), ("B.pdf", b"%PDF")],
        );

        let archive = Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();
        assert_eq!(archive.entries().len(), 2);
        assert_eq!(archive.main_entry().unwrap().location, "./A.xml");
        assert!(!has_issue(&archive, "no main element"));
    }

    #[test]
    fn test_open_three_entries_without_master_warns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("three.omex");
        let manifest = manifest_xml(&[
            ("./A.xml", SBML, false),
            ("./B.pdf", "application/pdf", false),
            ("./C.csv", "text/csv", false),
        ]);
        write_zip(&path, &[("manifest.xml", manifest.as_bytes()), ("A.xml", b"<sbml/>")]);

        let archive = Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();
        assert!(archive.main_entry().is_none());
        let issue = archive
            .validate()
            .iter()
            .find(|i| i.message == "archive has more than one entry, but no main element")
            .unwrap();
        assert_eq!(issue.severity, Severity::Warning);
    }

    #[test]
    fn test_open_empty_manifest_warns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.omex");
        let manifest = manifest_xml(&[]);
        write_zip(&path, &[("manifest.xml", manifest.as_bytes())]);

        let archive = Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();
        assert!(archive.entries().is_empty());
        assert!(has_issue(&archive, "archive is empty"));
    }

    #[test]
    fn test_open_broken_manifest_is_an_error_issue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.omex");
        write_zip(&path, &[("manifest.xml", b"<omexManifest><content></omexManifest>"), ("A.xml", b"x")]);

        let archive = Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();
        assert!(archive.entries().is_empty());
        let issue = archive.validate().iter().find(|i| i.is_error()).unwrap();
        assert!(issue.message.starts_with("no valid xml document given"));
    }

    #[test]
    fn test_open_legacy_namespace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.omex");
        let manifest = format!(
            r#"<omexManifest xmlns="{}"><content location="./A.xml" format="{}" master="true"/></omexManifest>"#,
            LEGACY_MANIFEST_NAMESPACES[0], SBML
        );
        write_zip(&path, &[("manifest.xml", manifest.as_bytes()), ("A.xml", b"x")]);

        let archive = Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();
        assert_eq!(archive.entries().len(), 1);
        assert!(has_issue(&archive, "invalid namespace used"));
    }

    #[test]
    fn test_metadata_is_merged_and_picks_main_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("described.omex");
        let manifest = manifest_xml(&[
            ("./A.xml", SBML, false),
            ("./B.xml", SBML, false),
            ("./metadata.rdf", METADATA_FORMAT, false),
            ("http://example.org/remote.rdf", METADATA_FORMAT, false),
        ]);
        write_zip(
            &path,
            &[
                ("manifest.xml", manifest.as_bytes()),
                ("A.xml", b"a"),
                ("B.xml", b"b"),
                ("metadata.rdf", METADATA.as_bytes()),
            ],
        );

        let archive = Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();
        assert_eq!(archive.entries().len(), 2);
        assert!(archive.entries().iter().all(|e| !e.is_bookkeeping()));
        assert_eq!(archive.descriptions().len(), 1);
        assert_eq!(archive.description_of("B.xml").unwrap().creators[0].given_name, "Ada");
        assert_eq!(archive.main_entry().unwrap().location, "./B.xml");
        assert!(archive.entries()[1].master);
        assert!(has_issue(&archive, "remote location"));
    }

    #[test]
    fn test_broken_metadata_becomes_an_issue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("badmeta.omex");
        let manifest = manifest_xml(&[
            ("./A.xml", SBML, true),
            ("./metadata.rdf", METADATA_FORMAT, false),
        ]);
        write_zip(
            &path,
            &[
                ("manifest.xml", manifest.as_bytes()),
                ("A.xml", b"a"),
                ("metadata.rdf", b"<rdf:RDF><unclosed></rdf:RDF>"),
            ],
        );

        let archive = Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();
        assert!(archive.descriptions().is_empty());
        assert!(has_issue(&archive, "metadata file ./metadata.rdf could not be read"));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempdir().unwrap();
        let result = Archive::open_with_config(dir.path().join("nope.omex"), test_config(dir.path()));
        assert!(matches!(result, Err(ArchiveError::Container(_))));
    }

    #[test]
    fn test_from_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("source.omex");
        write_zip(&path, &[("source.xml", b"<sbml/>")]);
        let bytes = fs::read(&path).unwrap();

        let archive = Archive::from_bytes(&bytes, test_config(&dir.path().join("staging"))).unwrap();
        assert_eq!(archive.entries().len(), 1);
        assert_eq!(archive.archive_file_name(), super::super::UNTITLED_ARCHIVE);
        assert_eq!(archive.entry_text("source.xml").unwrap(), "<sbml/>");
    }
}
