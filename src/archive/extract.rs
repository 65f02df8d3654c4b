//! Best-effort extraction into a staging directory.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::{zip_time_to_system, ContainerError};
use crate::paths;

/// A ZIP entry that was not extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Name as stored in the ZIP (or `#index` when unreadable).
    pub name: String,
    pub reason: String,
}

/// What [`unpack`] did.
#[derive(Debug, Clone, Default)]
pub struct UnpackReport {
    pub staging_dir: PathBuf,
    /// Extracted files, relative to `staging_dir`.
    pub extracted: Vec<PathBuf>,
    pub skipped: Vec<SkippedEntry>,
}

/// Extract `archive_path` into `staging_root/<archive stem>`.
///
/// An existing staging directory of that name is deleted first. Directory
/// entries are created before any file is written. Entries that are corrupt
/// or whose names would escape the staging directory are skipped and
/// listed in the report; only an unreadable container fails.
pub fn unpack(archive_path: &Path, staging_root: &Path) -> Result<UnpackReport, ContainerError> {
    if !archive_path.is_file() {
        return Err(ContainerError::MissingFile(archive_path.to_path_buf()));
    }

    let file = File::open(archive_path).map_err(|e| ContainerError::io(archive_path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| ContainerError::zip(archive_path, e))?;

    let stem = archive_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "archive".to_string());
    let staging_dir = staging_root.join(stem);

    if staging_dir.exists() {
        debug!("Removing stale staging directory {}", staging_dir.display());
        fs::remove_dir_all(&staging_dir).map_err(|e| ContainerError::io(&staging_dir, e))?;
    }
    fs::create_dir_all(&staging_dir).map_err(|e| ContainerError::io(&staging_dir, e))?;

    let mut report = UnpackReport {
        staging_dir: staging_dir.clone(),
        ..Default::default()
    };

    // Directories first so every file has its parent
    for i in 0..archive.len() {
        let Ok(entry) = archive.by_index(i) else {
            continue;
        };
        if !entry.is_dir() {
            continue;
        }
        match entry.enclosed_name() {
            Some(relative) => {
                let dir = staging_dir.join(relative);
                if let Err(e) = fs::create_dir_all(&dir) {
                    warn!("Failed to create {}: {}", dir.display(), e);
                }
            }
            None => report.skipped.push(SkippedEntry {
                name: entry.name().to_string(),
                reason: "unsafe path".to_string(),
            }),
        }
    }

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry #{} in {}: {}", i, archive_path.display(), e);
                report.skipped.push(SkippedEntry {
                    name: format!("#{}", i),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }

        let name = paths::to_forward_slashes(entry.name());
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping entry with unsafe path: {}", name);
            report.skipped.push(SkippedEntry {
                name,
                reason: "unsafe path".to_string(),
            });
            continue;
        };

        let output_path = staging_dir.join(&relative);
        let modified = entry.last_modified().and_then(zip_time_to_system);
        match write_entry(&mut entry, &output_path, modified) {
            Ok(bytes) => {
                debug!("Extracted {} ({} bytes)", name, bytes);
                report.extracted.push(relative);
            }
            Err(e) => {
                warn!("Skipping entry {}: {}", name, e);
                // Don't leave a truncated file behind
                let _ = fs::remove_file(&output_path);
                report.skipped.push(SkippedEntry {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "Unpacked {} to {} ({} files, {} skipped)",
        archive_path.display(),
        staging_dir.display(),
        report.extracted.len(),
        report.skipped.len()
    );
    Ok(report)
}

fn write_entry(
    reader: &mut impl io::Read,
    output_path: &Path,
    modified: Option<std::time::SystemTime>,
) -> io::Result<u64> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut outfile = File::create(output_path)?;
    let bytes = io::copy(reader, &mut outfile)?;
    if let Some(time) = modified {
        // Timestamps are cosmetic; a filesystem that refuses them is fine
        let _ = outfile.set_modified(time);
    }
    Ok(bytes)
}
