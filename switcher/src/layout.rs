// Where snapshots live, derived from the host's auto-save file

use std::path::{Path, PathBuf};

use crate::error::{Result, SwitcherError};
use crate::snapshot::entity::path_key;
use crate::snapshot::naming::ReservedPaths;

/// Prefix of the previous generation of the auto-saved file
const PREVIOUS_AUTO_SAVE_PREFIX: &str = "Old.";
/// Stem of the snapshot exported on first run
const FIRST_RUN_STEM: &str = "OriginalSettings";

/// Base directory and reserved paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsLayout {
    /// Directory scanned for plain snapshots
    pub settings_dir: PathBuf,
    /// File the host auto-saves the live configuration to
    pub auto_save: PathBuf,
    /// `Old.<auto-save name>` next to the auto-save file
    pub previous_auto_save: PathBuf,
    /// `OriginalSettings.<ext>` next to the auto-save file
    pub first_run: PathBuf,
    /// Snapshot file extension, without the leading dot
    pub extension: String,
}

impl SettingsLayout {
    /// Derive the layout from the auto-save file. The base directory is its
    /// parent, so the path must be absolute and have a file name.
    pub fn from_auto_save_file(auto_save: &Path, extension: &str) -> Result<Self> {
        let invalid = || SwitcherError::InvalidPath {
            path: auto_save.to_path_buf(),
        };
        if !auto_save.is_absolute() {
            return Err(invalid());
        }
        let file_name = auto_save.file_name().ok_or_else(invalid)?;
        let settings_dir = auto_save.parent().ok_or_else(invalid)?.to_path_buf();
        let extension = extension.trim_start_matches('.').to_string();

        let mut previous = std::ffi::OsString::from(PREVIOUS_AUTO_SAVE_PREFIX);
        previous.push(file_name);

        Ok(Self {
            previous_auto_save: settings_dir.join(previous),
            first_run: settings_dir.join(format!("{}.{}", FIRST_RUN_STEM, extension)),
            auto_save: auto_save.to_path_buf(),
            settings_dir,
            extension,
        })
    }

    pub fn reserved(&self) -> ReservedPaths {
        ReservedPaths::new(
            self.auto_save.clone(),
            self.previous_auto_save.clone(),
            self.first_run.clone(),
        )
    }

    /// True if `path` has the snapshot extension (case-insensitive)
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }

    /// Whether exporting into `path` would clobber an auto-saved file
    pub fn is_auto_saved(&self, path: &Path) -> bool {
        let key = path_key(path);
        key == path_key(&self.auto_save) || key == path_key(&self.previous_auto_save)
    }
}
