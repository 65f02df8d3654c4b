//! Building a ZIP from staged files.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{system_time_to_zip, ContainerError};
use crate::paths;

/// Deflate level used unless configured otherwise.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 9;

/// Write `files` into a new ZIP at `output_path`.
///
/// Entry names are the files' paths relative to `base_dir` with forward
/// slashes; files outside `base_dir` are stored under their file name.
/// Directory entries are written first, sorted and parent-before-child.
/// Returns the number of files written.
pub fn pack(
    output_path: &Path,
    files: &[PathBuf],
    base_dir: &Path,
    compression_level: u32,
) -> Result<usize, ContainerError> {
    let names: Vec<(String, &PathBuf)> = files
        .iter()
        .map(|file| (entry_name(file, base_dir), file))
        .collect();

    let mut directories = BTreeSet::new();
    for (name, _) in &names {
        let mut current = name.as_str();
        while let Some(idx) = current.rfind('/') {
            current = &current[..idx];
            directories.insert(format!("{}/", current));
        }
    }

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ContainerError::io(parent, e))?;
    }
    let out = File::create(output_path).map_err(|e| ContainerError::io(output_path, e))?;
    let mut zip = ZipWriter::new(out);

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(i64::from(compression_level.min(9))));

    for dir in &directories {
        zip.add_directory(dir.as_str(), options)
            .map_err(|e| ContainerError::zip(output_path, e))?;
    }

    for (name, file) in &names {
        let metadata = fs::metadata(file).map_err(|e| ContainerError::io(file.as_path(), e))?;
        let mut file_options = options;
        if let Ok(modified) = metadata.modified() {
            file_options = file_options.last_modified_time(system_time_to_zip(modified));
        }

        zip.start_file(name.as_str(), file_options)
            .map_err(|e| ContainerError::zip(output_path, e))?;
        let source = File::open(file).map_err(|e| ContainerError::io(file.as_path(), e))?;
        let bytes = io::copy(&mut BufReader::new(source), &mut zip)
            .map_err(|e| ContainerError::io(file.as_path(), e))?;
        debug!("Packed {} ({} bytes)", name, bytes);
    }

    zip.finish().map_err(|e| ContainerError::zip(output_path, e))?;

    info!(
        "Packed {} files into {}",
        names.len(),
        output_path.display()
    );
    Ok(names.len())
}

/// ZIP entry name for a staged file.
fn entry_name(file: &Path, base_dir: &Path) -> String {
    let location = paths::location_for_path(file, base_dir);
    paths::strip_dot_slash(&location).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::unpack;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn stage(base: &Path, files: &[(&str, &[u8])]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|(rel, data)| {
                let path = base.join(rel);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, data).unwrap();
                path
            })
            .collect()
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_pack_writes_directories_first() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("staging");
        let files = stage(
            &base,
            &[
                ("manifest.xml", b"<omexManifest/>"),
                ("data/raw/a.csv", b"1,2"),
                ("data/b.csv", b"3,4"),
            ],
        );

        let output = dir.path().join("out.omex");
        let count = pack(&output, &files, &base, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert_eq!(count, 3);

        let names = entry_names(&output);
        assert_eq!(
            names,
            vec!["data/", "data/raw/", "manifest.xml", "data/raw/a.csv", "data/b.csv"]
        );
    }

    #[test]
    fn test_pack_preserves_content() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("staging");
        let payload = b"<sbml>".repeat(500);
        let files = stage(&base, &[("model.xml", &payload)]);

        let output = dir.path().join("out.omex");
        pack(&output, &files, &base, 9).unwrap();

        let mut archive = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut entry = archive.by_name("model.xml").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        assert_eq!(data, payload);
    }

    #[test]
    fn test_pack_then_unpack() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("staging");
        let files = stage(&base, &[("a.txt", b"alpha"), ("sub/b.txt", b"beta")]);

        let output = dir.path().join("bundle.omex");
        pack(&output, &files, &base, 6).unwrap();

        let report = unpack(&output, &dir.path().join("unpacked")).unwrap();
        assert_eq!(report.extracted.len(), 2);
        assert_eq!(fs::read(report.staging_dir.join("sub/b.txt")).unwrap(), b"beta");
    }

    #[test]
    fn test_pack_missing_source_fails() {
        let dir = tempdir().unwrap();
        let result = pack(
            &dir.path().join("out.omex"),
            &[dir.path().join("missing.txt")],
            dir.path(),
            9,
        );
        assert!(matches!(result, Err(ContainerError::Io { .. })));
    }

    #[test]
    fn test_entry_name() {
        let base = Path::new("/tmp/staging");
        assert_eq!(entry_name(&base.join("sub/x.xml"), base), "sub/x.xml");
        assert_eq!(entry_name(Path::new("/other/y.xml"), base), "y.xml");
    }
}
