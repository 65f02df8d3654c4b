//! The archive model: entries, descriptions, staging directory and the
//! issues found while loading.
//!
//! The staging directory (`base_dir`) is the source of truth for payload
//! bytes. Opening unpacks into it, [`Archive::add_entry`] copies into it and
//! saving packs from it. An `Archive` owns its staging directory
//! exclusively and never deletes it on its own; call
//! [`Archive::remove_staging_dir`] when done.

mod open;
mod save;

#[cfg(test)]
mod fixtures;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::archive::ContainerError;
use crate::config::{BundleConfig, ConfigError};
use crate::fetch::{CancelToken, FetchError, Fetcher};
use crate::formats::registry;
use crate::issue::Issue;
use crate::manifest::Entry;
use crate::metadata::{self, Description};
use crate::paths;
use crate::xml::{read_xml_file, XmlReadError};

/// File name used for archives that were never saved.
pub const UNTITLED_ARCHIVE: &str = "untitled.omex";

/// Archive-level errors
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to read entry text: {0}")]
    Text(#[from] XmlReadError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No entry at location {0}")]
    EntryNotFound(String),

    #[error("Entry {0} has no staged file")]
    NotStaged(String),

    #[error("Staging directory does not exist: {0}")]
    MissingStagingDir(PathBuf),
}

impl ArchiveError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// An archive bundle held in memory with its staging directory.
#[derive(Debug)]
pub struct Archive {
    entries: Vec<Entry>,
    main_entry: Option<usize>,
    descriptions: Vec<Description>,
    base_dir: PathBuf,
    issues: Vec<Issue>,
    archive_file_name: String,
    config: BundleConfig,
}

impl Archive {
    /// Create an empty archive with a fresh staging directory under the
    /// default staging root.
    pub fn new() -> Result<Self, ArchiveError> {
        Self::with_config(BundleConfig::default())
    }

    /// Create an empty archive with a fresh staging directory under
    /// `config.staging_root`.
    pub fn with_config(config: BundleConfig) -> Result<Self, ArchiveError> {
        config.validate()?;
        fs::create_dir_all(&config.staging_root)
            .map_err(|e| ArchiveError::io(&config.staging_root, e))?;
        let base_dir = tempfile::Builder::new()
            .prefix("omex-")
            .tempdir_in(&config.staging_root)
            .map_err(|e| ArchiveError::io(&config.staging_root, e))?
            .keep();
        debug!("Created staging directory {}", base_dir.display());
        Ok(Self::empty(base_dir, config))
    }

    fn empty(base_dir: PathBuf, config: BundleConfig) -> Self {
        Self {
            entries: Vec::new(),
            main_entry: None,
            descriptions: Vec::new(),
            base_dir,
            issues: Vec::new(),
            archive_file_name: UNTITLED_ARCHIVE.to_string(),
            config,
        }
    }

    /// Open an archive file with the default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        open::open_archive(path.as_ref(), BundleConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: BundleConfig) -> Result<Self, ArchiveError> {
        open::open_archive(path.as_ref(), config)
    }

    /// Open an archive held in memory.
    ///
    /// The bytes are written to a temporary file that is removed once
    /// unpacked.
    pub fn from_bytes(bytes: &[u8], config: BundleConfig) -> Result<Self, ArchiveError> {
        config.validate()?;
        fs::create_dir_all(&config.staging_root)
            .map_err(|e| ArchiveError::io(&config.staging_root, e))?;
        let mut file = tempfile::Builder::new()
            .prefix("omex-buffer-")
            .suffix(".omex")
            .tempfile_in(&config.staging_root)
            .map_err(|e| ArchiveError::io(&config.staging_root, e))?;
        std::io::Write::write_all(&mut file, bytes).map_err(|e| ArchiveError::io(file.path(), e))?;

        let mut archive = open::open_archive(file.path(), config)?;
        archive.archive_file_name = UNTITLED_ARCHIVE.to_string();
        Ok(archive)
    }

    // -- accessors --

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn descriptions(&self) -> &[Description] {
        &self.descriptions
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn archive_file_name(&self) -> &str {
        &self.archive_file_name
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Issues recorded while loading. No new checks are run.
    pub fn validate(&self) -> &[Issue] {
        &self.issues
    }

    pub fn main_index(&self) -> Option<usize> {
        self.main_entry
    }

    pub fn main_entry(&self) -> Option<&Entry> {
        self.main_entry.and_then(|idx| self.entries.get(idx))
    }

    // -- queries --

    /// Look up an entry by location (`./` prefixes ignored).
    pub fn entry(&self, location: &str) -> Option<&Entry> {
        self.position(location).map(|idx| &self.entries[idx])
    }

    fn position(&self, location: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.matches_location(location))
    }

    /// Entries whose format equals `format` or is one of the identifiers of
    /// the alias `format`.
    pub fn entries_with_format(&self, format: &str) -> Vec<&Entry> {
        let formats = registry();
        self.entries
            .iter()
            .filter(|e| e.format == format || formats.is_format(format, &e.format))
            .collect()
    }

    pub fn count_entries_with_format(&self, format: &str) -> usize {
        self.entries_with_format(format).len()
    }

    pub fn has_entries_with_format(&self, format: &str) -> bool {
        self.count_entries_with_format(format) > 0
    }

    /// Staged files of the entries matching `format`.
    pub fn files_with_format(&self, format: &str) -> Vec<PathBuf> {
        self.entries_with_format(format)
            .into_iter()
            .filter_map(|e| self.local_path(e))
            .collect()
    }

    /// The staged file behind `entry`. None for URLs and missing files.
    pub fn local_path(&self, entry: &Entry) -> Option<PathBuf> {
        paths::path_for_location(&entry.location, &self.base_dir).filter(|p| p.is_file())
    }

    /// The description attached to `location`, if any.
    pub fn description_of(&self, location: &str) -> Option<&Description> {
        resolve_description(self, location)
    }

    /// The archive-level description (`about == "."`).
    pub fn archive_description(&self) -> Option<&Description> {
        self.description_of(".")
    }

    /// Entry content: the staged file, or a bounded fetch for URLs.
    pub fn entry_bytes(&self, location: &str) -> Result<Vec<u8>, ArchiveError> {
        self.entry_bytes_cancellable(location, &CancelToken::new())
    }

    pub fn entry_bytes_cancellable(
        &self,
        location: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, ArchiveError> {
        let entry = self
            .entry(location)
            .ok_or_else(|| ArchiveError::EntryNotFound(location.to_string()))?;
        if entry.is_url() {
            let fetcher = Fetcher::new(&self.config)?;
            return Ok(fetcher.fetch_bytes_cancellable(&entry.location, cancel)?);
        }
        let path = self
            .local_path(entry)
            .ok_or_else(|| ArchiveError::NotStaged(entry.location.clone()))?;
        fs::read(&path).map_err(|e| ArchiveError::io(path, e))
    }

    /// Entry content as text; byte-order marks decide the encoding.
    pub fn entry_text(&self, location: &str) -> Result<String, ArchiveError> {
        self.entry_text_cancellable(location, &CancelToken::new())
    }

    pub fn entry_text_cancellable(
        &self,
        location: &str,
        cancel: &CancelToken,
    ) -> Result<String, ArchiveError> {
        let entry = self
            .entry(location)
            .ok_or_else(|| ArchiveError::EntryNotFound(location.to_string()))?;
        if entry.is_url() {
            let fetcher = Fetcher::new(&self.config)?;
            return Ok(fetcher.fetch_text_cancellable(&entry.location, cancel)?);
        }
        let path = self
            .local_path(entry)
            .ok_or_else(|| ArchiveError::NotStaged(entry.location.clone()))?;
        Ok(read_xml_file(&path)?)
    }

    // -- mutation --

    /// Copy `source` into the staging directory and list it.
    ///
    /// Returns `Ok(None)` without touching the archive when `source` does
    /// not exist. A staged file with the same name is overwritten; an entry
    /// with the same location keeps its place and takes the new format.
    /// A non-empty `description` is attached to the entry.
    pub fn add_entry(
        &mut self,
        source: &Path,
        format: &str,
        description: Option<Description>,
    ) -> Result<Option<&Entry>, ArchiveError> {
        if !source.is_file() {
            debug!("Not adding {}: no such file", source.display());
            return Ok(None);
        }
        let Some(file_name) = source.file_name() else {
            return Ok(None);
        };

        let target = self.base_dir.join(file_name);
        if !same_file(source, &target) {
            fs::copy(source, &target).map_err(|e| ArchiveError::io(&target, e))?;
        }

        let location = paths::location_for_path(&target, &self.base_dir);
        let idx = match self.position(&location) {
            Some(idx) => {
                self.entries[idx].format = format.to_string();
                idx
            }
            None => {
                self.entries.push(Entry::new(&location, format));
                self.entries.len() - 1
            }
        };

        if let Some(mut description) = description.filter(|d| !d.is_empty()) {
            description.about = location.clone();
            self.set_description(description);
        }

        info!("Added {} as {}", location, format);
        Ok(self.entries.get(idx))
    }

    /// Remove the entry at `location`. The staged file stays on disk but is
    /// no longer packed.
    pub fn remove_entry(&mut self, location: &str) -> Option<Entry> {
        let idx = self.position(location)?;
        let removed = self.entries.remove(idx);
        self.main_entry = match self.main_entry {
            Some(main) if main == idx => None,
            Some(main) if main > idx => Some(main - 1),
            other => other,
        };
        self.sync_master_flags();
        debug!("Removed entry {}", removed.location);
        Some(removed)
    }

    /// Make the entry at `location` the master.
    pub fn set_main_entry(&mut self, location: &str) -> Result<(), ArchiveError> {
        let idx = self
            .position(location)
            .ok_or_else(|| ArchiveError::EntryNotFound(location.to_string()))?;
        self.main_entry = Some(idx);
        self.sync_master_flags();
        Ok(())
    }

    pub fn clear_main_entry(&mut self) {
        self.main_entry = None;
        self.sync_master_flags();
    }

    /// Add a description, replacing any with the same `about`.
    pub fn set_description(&mut self, description: Description) {
        match self
            .descriptions
            .iter()
            .position(|d| paths::locations_equal(&d.about, &description.about))
        {
            Some(idx) => self.descriptions[idx] = description,
            None => self.descriptions.push(description),
        }
    }

    /// Drop the description of `about`, returning it.
    pub fn remove_description(&mut self, about: &str) -> Option<Description> {
        let idx = self.descriptions.iter().position(|d| d.describes(about))?;
        Some(self.descriptions.remove(idx))
    }

    /// Delete the staging directory. The archive can't be used afterwards.
    pub fn remove_staging_dir(self) -> Result<(), ArchiveError> {
        if self.base_dir.exists() {
            fs::remove_dir_all(&self.base_dir).map_err(|e| ArchiveError::io(&self.base_dir, e))?;
        }
        Ok(())
    }

    /// Keep `Entry::master` in step with `main_entry`.
    fn sync_master_flags(&mut self) {
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            entry.master = self.main_entry == Some(idx);
        }
    }
}

/// The description of the entry at `location`: the first record whose
/// `about` matches it.
pub fn resolve_description<'a>(archive: &'a Archive, location: &str) -> Option<&'a Description> {
    metadata::resolve_description(&archive.descriptions, location)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
