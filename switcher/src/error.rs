//! Error types for the snapshot switcher
//!
//! Lookups that find nothing return `None`; only contract violations and
//! environmental failures surface here.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for switcher operations
#[derive(Error, Debug)]
pub enum SwitcherError {
    /// A supplied path is not absolute (rejected, never coerced)
    #[error("Path must be absolute: {}", path.display())]
    InvalidPath { path: PathBuf },

    /// Enumerating the snapshot directory failed
    #[error("Failed to scan {}: {source}", dir.display())]
    ScanFailure {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Moving or copying the project snapshot to its renamed location failed
    #[error("Failed to carry project snapshot {} to {}: {source}", from.display(), to.display())]
    ProjectFileConflict {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to apply {}: {source}", path.display())]
    Apply {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to export to {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Preferences error ({}): {message}", path.display())]
    Preferences { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for switcher operations
pub type Result<T> = std::result::Result<T, SwitcherError>;
