//! ZIP container handling.
//!
//! An archive bundle is a plain ZIP. [`unpack`] extracts it into a staging
//! directory that becomes the working copy; [`pack`] rebuilds a ZIP from
//! files under that directory. Neither operation is atomic: entries written
//! before a failure stay on disk.

mod extract;
mod pack;

pub use extract::{unpack, SkippedEntry, UnpackReport};
pub use pack::{pack, DEFAULT_COMPRESSION_LEVEL};

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, NaiveDate, Timelike};

/// Container-level failures
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid ZIP container {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Archive file not found: {0}")]
    MissingFile(PathBuf),
}

impl ContainerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Zip {
            path: path.into(),
            source,
        }
    }
}

/// Convert a ZIP entry timestamp (local time, 2-second resolution) to a
/// file time. Returns None for dates that don't exist locally.
fn zip_time_to_system(time: zip::DateTime) -> Option<SystemTime> {
    let naive = NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?
    .and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )?;
    let local = naive.and_local_timezone(Local).earliest()?;
    Some(SystemTime::from(local))
}

/// Convert a file time to a ZIP timestamp. ZIP can't represent dates
/// before 1980; those fall back to the format's default.
fn system_time_to_zip(time: SystemTime) -> zip::DateTime {
    let local: DateTime<Local> = DateTime::from(time);
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).unwrap_or(1980),
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .unwrap_or_default()
}
