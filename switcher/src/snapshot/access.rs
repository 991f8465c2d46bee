//! Last-accessed timestamps
//!
//! Access times are persisted as base-10 file-time ticks (100ns intervals
//! since 1601-01-01 UTC). OS access times are only a fallback since many
//! filesystems update them lazily or not at all.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;
use crate::host::PreferenceStore;
use crate::snapshot::entity::Snapshot;

/// Seconds between 1601-01-01 and 1970-01-01
const FILE_TIME_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Convert a UTC timestamp to file-time ticks
pub fn to_file_time(at: DateTime<Utc>) -> i64 {
    (at.timestamp() + FILE_TIME_EPOCH_OFFSET_SECS) * TICKS_PER_SECOND
        + i64::from(at.timestamp_subsec_nanos() / 100)
}

/// Convert file-time ticks back to a UTC timestamp
pub fn from_file_time(ticks: i64) -> Option<DateTime<Utc>> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND) - FILE_TIME_EPOCH_OFFSET_SECS;
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Serialized form stored in the preference store
pub fn encode_file_time(at: DateTime<Utc>) -> String {
    to_file_time(at).to_string()
}

pub fn decode_file_time(value: &str) -> Option<DateTime<Utc>> {
    value.trim().parse::<i64>().ok().and_then(from_file_time)
}

/// Access time reported by the filesystem
pub fn os_access_time(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = fs::metadata(path).ok()?;
    let accessed = filetime::FileTime::from_last_access_time(&metadata);
    DateTime::from_timestamp(accessed.unix_seconds(), accessed.nanoseconds())
}

/// Store key for a snapshot path
pub(crate) fn access_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Snapshot {
    /// When this snapshot was last selected.
    ///
    /// Read back from the preference store every time; falls back to the OS
    /// access time, then to the minimum timestamp.
    pub fn last_accessed(&self, prefs: &dyn PreferenceStore) -> DateTime<Utc> {
        prefs
            .access_time(&access_key(self.full_path()))
            .and_then(|value| decode_file_time(&value))
            .or_else(|| os_access_time(self.full_path()))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Record "now" as the last access
    pub fn touch(&self, prefs: &dyn PreferenceStore) -> Result<()> {
        self.touch_at(prefs, Utc::now())
    }

    pub fn touch_at(&self, prefs: &dyn PreferenceStore, at: DateTime<Utc>) -> Result<()> {
        debug!(path = %self.full_path().display(), "Saving last access time");
        prefs.set_access_time(&access_key(self.full_path()), &encode_file_time(at))
    }
}
