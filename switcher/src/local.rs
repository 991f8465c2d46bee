//! Filesystem-backed collaborators used by the CLI
//!
//! The live configuration is a single file that snapshots are copied into
//! and exported from. The open project is whatever path the marker file
//! under the state directory names.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;
use crate::host::{LiveSettings, ProjectHost};

/// Live configuration stored in one file
#[derive(Debug, Clone)]
pub struct FileLiveSettings {
    live_file: PathBuf,
}

impl FileLiveSettings {
    pub fn new(live_file: impl Into<PathBuf>) -> Self {
        Self {
            live_file: live_file.into(),
        }
    }

    pub fn live_file(&self) -> &Path {
        &self.live_file
    }
}

impl LiveSettings for FileLiveSettings {
    fn apply(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = self.live_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, &self.live_file)?;
        debug!(from = %path.display(), "Applied to live file");
        Ok(())
    }

    fn export(&self, target: &Path) -> io::Result<()> {
        if self.live_file.is_file() {
            fs::copy(&self.live_file, target)?;
        } else {
            // Nothing applied yet: export an empty configuration
            fs::write(target, "")?;
        }
        debug!(to = %target.display(), "Exported live file");
        Ok(())
    }
}

/// Project host reading the current project from the marker file
#[derive(Debug, Clone)]
pub struct MarkerProjectHost {
    config: Config,
}

impl MarkerProjectHost {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Record `project_file` as the open project
    pub fn open(&self, project_file: &Path) -> io::Result<()> {
        self.config
            .write_current_project(&project_file.to_string_lossy())
    }

    pub fn close(&self) -> io::Result<()> {
        self.config.clear_current_project()
    }
}

impl ProjectHost for MarkerProjectHost {
    fn current_project_file(&self) -> Option<PathBuf> {
        self.config.read_current_project()
    }

    fn move_project_item(&self, _from: &Path, _to: &Path) -> io::Result<bool> {
        // No project item tracking; the switcher copies the file itself
        Ok(false)
    }

    fn add_project_item(&self, path: &Path) -> io::Result<()> {
        debug!(path = %path.display(), "Project items are not tracked");
        Ok(())
    }
}
