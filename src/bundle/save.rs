//! Writing an [`Archive`] back to a ZIP, and extracting its entries.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Archive, ArchiveError};
use crate::archive;
use crate::formats::{MANIFEST_FORMAT, METADATA_FORMAT};
use crate::manifest::{self, encode_manifest, Entry, MANIFEST_FILE_NAME};
use crate::metadata::{encode_description, metadata_file_name};
use crate::paths;

impl Archive {
    /// Rebuild manifest and metadata files in the staging directory and
    /// pack every local entry into a ZIP at `path`.
    ///
    /// URL entries are listed in the manifest but never packed. Returns the
    /// number of files written.
    pub fn save_to(&mut self, path: impl AsRef<Path>) -> Result<usize, ArchiveError> {
        let path = path.as_ref();
        if !self.base_dir.is_dir() {
            return Err(ArchiveError::MissingStagingDir(self.base_dir.clone()));
        }

        // Sidecars are regenerated below; drop any that were added by hand
        let main_location = self.main_entry().map(|e| e.location.clone());
        self.entries.retain(|e| !e.is_bookkeeping());
        self.main_entry = main_location.and_then(|loc| self.position(&loc));
        self.sync_master_flags();

        let mut listed = Vec::with_capacity(self.entries.len() + self.descriptions.len() + 1);
        listed.push(Entry::new(MANIFEST_FILE_NAME, MANIFEST_FORMAT));
        listed.extend(self.entries.iter().cloned());

        // Sidecar names skip any location a payload already uses
        let mut next_index = 0;
        for description in &self.descriptions {
            let name = loop {
                let candidate = metadata_file_name(next_index);
                next_index += 1;
                if self.position(&candidate).is_none() {
                    break candidate;
                }
            };
            let metadata_path = self.base_dir.join(&name);
            fs::write(&metadata_path, encode_description(description))
                .map_err(|e| ArchiveError::io(&metadata_path, e))?;
            listed.push(Entry::new(&name, METADATA_FORMAT));
        }

        let manifest_xml = encode_manifest(&listed, self.main_entry.map(|idx| idx + 1), &self.base_dir);
        let manifest_path = manifest::manifest_path(&self.base_dir);
        fs::write(&manifest_path, manifest_xml).map_err(|e| ArchiveError::io(&manifest_path, e))?;

        let mut seen = HashSet::new();
        let files: Vec<PathBuf> = listed
            .iter()
            .filter(|e| !e.is_url())
            .filter_map(|e| paths::path_for_location(&e.location, &self.base_dir))
            .filter(|p| p.is_file())
            .filter(|p| seen.insert(p.clone()))
            .collect();
        debug!("Packing {} of {} listed entries", files.len(), listed.len());

        let written = archive::pack(path, &files, &self.base_dir, self.config.compression_level)?;

        if let Some(name) = path.file_name() {
            self.archive_file_name = name.to_string_lossy().into_owned();
        }
        info!("Saved {} ({} files)", path.display(), written);
        Ok(written)
    }

    /// Copy every staged entry into `dir`, keeping relative locations.
    /// Returns the number of files copied.
    pub fn extract_to(&self, dir: impl AsRef<Path>) -> Result<usize, ArchiveError> {
        let dir = dir.as_ref();
        let mut copied = 0;
        for entry in &self.entries {
            let Some(source) = self.local_path(entry) else {
                debug!("Not extracting {}: no staged file", entry.location);
                continue;
            };
            let Some(target) = paths::path_for_location(&entry.location, dir) else {
                continue;
            };
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
            }
            fs::copy(&source, &target).map_err(|e| ArchiveError::io(&target, e))?;
            copied += 1;
        }
        info!("Extracted {} entries to {}", copied, dir.display());
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::metadata::{Description, VCard};
    use chrono::{TimeZone, Utc};
    use std::fs::File;
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn zip_names(path: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn build_archive(root: &Path) -> Archive {
        let mut archive = Archive::with_config(test_config(&root.join("staging"))).unwrap();
        let model = root.join("BorisEJB.xml");
        let paper = root.join("Kholodenko2000.pdf");
        fs::write(&model, b"<sbml/>").unwrap();
        fs::write(&paper, b"%PDF").unwrap();

        let mut description = Description::new("")
            .with_description("MAPK cascade")
            .with_creator(VCard::new("Frank", "Bergmann").with_email("fbergman@caltech.edu"));
        description.created = Utc.with_ymd_and_hms(2014, 3, 27, 14, 2, 11).unwrap();
        description.modified = vec![Utc.with_ymd_and_hms(2014, 3, 28, 9, 0, 0).unwrap()];

        archive.add_entry(&model, SBML, Some(description)).unwrap();
        archive.add_entry(&paper, "application/pdf", None).unwrap();
        archive.set_main_entry("BorisEJB.xml").unwrap();
        archive
    }

    #[test]
    fn test_save_layout() {
        let dir = tempdir().unwrap();
        let mut archive = build_archive(dir.path());
        let output = dir.path().join("out.omex");

        let written = archive.save_to(&output).unwrap();
        assert_eq!(written, 4);
        assert_eq!(archive.archive_file_name(), "out.omex");

        let names = zip_names(&output);
        assert_eq!(
            names,
            vec!["manifest.xml", "BorisEJB.xml", "Kholodenko2000.pdf", "metadata0.xml"]
        );

        let manifest = fs::read_to_string(archive.base_dir().join("manifest.xml")).unwrap();
        assert!(manifest.contains("location=\".\""));
        assert!(manifest.contains("location=\"./BorisEJB.xml\" format=\"http://identifiers.org/combine.specifications/sbml\" master=\"true\""));
        assert!(manifest.contains(&format!("location=\"./metadata0.xml\" format=\"{}\"", METADATA_FORMAT)));
        assert!(archive.entries().iter().all(|e| !e.is_bookkeeping()));
    }

    #[test]
    fn test_save_then_open_round_trips() {
        let dir = tempdir().unwrap();
        let mut archive = build_archive(dir.path());
        let output = dir.path().join("roundtrip.omex");
        archive.save_to(&output).unwrap();

        let reopened =
            Archive::open_with_config(&output, test_config(&dir.path().join("reopened"))).unwrap();

        let original: Vec<_> = archive.entries().iter().map(|e| (&e.location, &e.format)).collect();
        let loaded: Vec<_> = reopened.entries().iter().map(|e| (&e.location, &e.format)).collect();
        assert_eq!(original, loaded);
        assert_eq!(reopened.main_entry().unwrap().location, "./BorisEJB.xml");
        assert_eq!(reopened.descriptions(), archive.descriptions());
        assert!(reopened.validate().is_empty(), "{:?}", reopened.validate());
        assert_eq!(reopened.entry_bytes("BorisEJB.xml").unwrap(), b"<sbml/>");
    }

    #[test]
    fn test_sidecar_names_skip_payload_locations() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::with_config(test_config(&dir.path().join("staging"))).unwrap();
        let payload = dir.path().join("metadata0.xml");
        let model = dir.path().join("m.xml");
        fs::write(&payload, b"<payload/>").unwrap();
        fs::write(&model, b"<sbml/>").unwrap();

        archive.add_entry(&payload, "application/xml", None).unwrap();
        let description = Description::new("").with_description("described model");
        archive.add_entry(&model, SBML, Some(description)).unwrap();

        let output = dir.path().join("collide.omex");
        archive.save_to(&output).unwrap();
        assert_eq!(
            zip_names(&output),
            vec!["manifest.xml", "metadata0.xml", "m.xml", "metadata1.xml"]
        );

        let reopened =
            Archive::open_with_config(&output, test_config(&dir.path().join("reopened"))).unwrap();
        assert_eq!(reopened.entry_bytes("metadata0.xml").unwrap(), b"<payload/>");
        assert_eq!(reopened.entry("metadata0.xml").unwrap().format, "application/xml");
        assert_eq!(reopened.descriptions().len(), 1);
        assert_eq!(reopened.description_of("m.xml").unwrap().description, "described model");
    }

    #[test]
    fn test_saving_twice_is_stable() {
        let dir = tempdir().unwrap();
        let mut archive = build_archive(dir.path());
        archive.save_to(dir.path().join("first.omex")).unwrap();
        archive.save_to(dir.path().join("second.omex")).unwrap();

        assert_eq!(
            zip_names(&dir.path().join("first.omex")),
            zip_names(&dir.path().join("second.omex"))
        );
        assert_eq!(archive.entries().len(), 2);
    }

    #[test]
    fn test_url_entries_are_listed_not_packed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("remote.omex");
        let manifest = manifest_xml(&[
            ("./A.xml", SBML, true),
            ("http://www.ebi.ac.uk/biomodels-main/BIOMD0000000010", SBML, false),
        ]);
        write_zip(&path, &[("manifest.xml", manifest.as_bytes()), ("A.xml", b"a")]);

        let mut archive =
            Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();
        let output = dir.path().join("saved.omex");
        archive.save_to(&output).unwrap();

        assert_eq!(zip_names(&output), vec!["manifest.xml", "A.xml"]);
        let manifest = fs::read_to_string(archive.base_dir().join("manifest.xml")).unwrap();
        assert!(manifest.contains("http://www.ebi.ac.uk/biomodels-main/BIOMD0000000010"));
    }

    #[test]
    fn test_save_without_staging_dir_fails() {
        let dir = tempdir().unwrap();
        let mut archive = build_archive(dir.path());
        fs::remove_dir_all(archive.base_dir()).unwrap();
        assert!(matches!(
            archive.save_to(dir.path().join("x.omex")),
            Err(ArchiveError::MissingStagingDir(_))
        ));
    }

    #[test]
    fn test_extract_to() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested.omex");
        write_zip(&path, &[("models/a.xml", b"a"), ("b.txt", b"b")]);
        let archive =
            Archive::open_with_config(&path, test_config(&dir.path().join("staging"))).unwrap();

        let out = dir.path().join("out");
        assert_eq!(archive.extract_to(&out).unwrap(), 2);
        assert_eq!(fs::read(out.join("models/a.xml")).unwrap(), b"a");
        assert_eq!(fs::read(out.join("b.txt")).unwrap(), b"b");
    }
}
