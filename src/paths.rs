//! Location handling for manifest entries.
//!
//! Manifests refer to payloads by location strings:
//! - `./`-prefixed POSIX paths relative to the archive root
//! - `.` for the archive itself
//! - absolute URLs for payloads that live outside the container
//!
//! Writers disagree about `./` prefixes and separators, so every lookup
//! goes through [`normalize_location`] first.

use std::path::{Component, Path, PathBuf};

/// URL schemes treated as remote locations.
const URL_SCHEMES: &[&str] = &["http://", "https://", "ftp://"];

/// Convert Windows path separators to forward slashes
/// `paper\Kholodenko2000.pdf` -> `paper/Kholodenko2000.pdf`
pub fn to_forward_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// Check if a location points outside the container.
pub fn is_url(location: &str) -> bool {
    let lower = location.trim().to_ascii_lowercase();
    URL_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

/// Strip every leading `./` (and stray leading `/`) from a location.
pub fn strip_dot_slash(location: &str) -> &str {
    let mut rest = location.trim();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix(".\\") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            return rest;
        }
    }
}

/// Canonical form of a location: URLs untouched, `.` for the archive root,
/// everything else with exactly one `./` prefix and forward slashes.
pub fn normalize_location(location: &str) -> String {
    if is_url(location) {
        return location.trim().to_string();
    }
    let forward = to_forward_slashes(location);
    let rest = strip_dot_slash(&forward);
    if rest.is_empty() || rest == "." {
        ".".to_string()
    } else {
        format!("./{}", rest)
    }
}

/// Check if two locations refer to the same entry.
pub fn locations_equal(a: &str, b: &str) -> bool {
    normalize_location(a) == normalize_location(b)
}

/// Express `path` as a location relative to `base_dir`.
///
/// Paths outside `base_dir` keep only their file name, matching how they
/// are laid out when packed.
pub fn location_for_path(path: &Path, base_dir: &Path) -> String {
    let relative = match path.strip_prefix(base_dir) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) if path.is_absolute() => PathBuf::from(path.file_name().unwrap_or_default()),
        Err(_) => path.to_path_buf(),
    };
    normalize_location(&relative.to_string_lossy())
}

/// Resolve a non-URL location to a path under `base_dir`.
///
/// Returns None for URLs and for locations that would climb out of
/// `base_dir` via `..`.
pub fn path_for_location(location: &str, base_dir: &Path) -> Option<PathBuf> {
    if is_url(location) {
        return None;
    }
    let forward = to_forward_slashes(location);
    let relative = Path::new(strip_dot_slash(&forward));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    Some(base_dir.join(relative))
}

/// Get the filename from a location (handles both / and \)
pub fn file_name(location: &str) -> &str {
    location
        .rfind(['\\', '/'])
        .map(|idx| &location[idx + 1..])
        .unwrap_or(location)
}

/// Get file extension (lowercase), without the dot
pub fn extension(location: &str) -> Option<String> {
    let name = file_name(location);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(name[idx + 1..].to_lowercase()),
    }
}

/// Get the filename without its last extension
pub fn file_stem(location: &str) -> &str {
    let name = file_name(location);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}
