// Durable preference store
// Preferences are persisted to $STATE_DIR/preferences.json with file locking

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SwitcherError};
use crate::host::PreferenceStore;
use crate::snapshot::entity::path_key;

fn default_true() -> bool {
    true
}

/// Preferences as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceData {
    /// Absolute path of the default selection
    #[serde(default)]
    pub selected_file: Option<String>,
    #[serde(default)]
    pub export_overwrites_selected: bool,
    #[serde(default = "default_true")]
    pub associate_with_project: bool,
    /// Project file key -> selected snapshot path ("" = the project's own snapshot)
    #[serde(default)]
    pub project_selections: BTreeMap<String, String>,
    /// Snapshot path -> base-10 file-time ticks
    #[serde(default)]
    pub last_access_times: BTreeMap<String, String>,
}

impl Default for PreferenceData {
    fn default() -> Self {
        Self {
            selected_file: None,
            export_overwrites_selected: false,
            associate_with_project: true,
            project_selections: BTreeMap::new(),
            last_access_times: BTreeMap::new(),
        }
    }
}

impl PreferenceData {
    /// Load preferences from disk, using defaults if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|err| preferences_error(path, err))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&contents).map_err(|err| preferences_error(path, err))
    }

    /// Save to disk while holding an exclusive lock on a sidecar lock file
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| preferences_error(path, "no parent directory"))?;
        fs::create_dir_all(parent).map_err(|err| preferences_error(path, err))?;

        let lock_path = sibling(path, "lock");
        let lock = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|err| preferences_error(&lock_path, err))?;

        lock.lock_exclusive()
            .map_err(|err| preferences_error(&lock_path, err))?;

        let contents =
            serde_json::to_string_pretty(self).map_err(|err| preferences_error(path, err))?;
        atomic_write(path, &contents)?;

        // Lock is released when `lock` is dropped
        Ok(())
    }
}

fn preferences_error(path: &Path, err: impl ToString) -> SwitcherError {
    SwitcherError::Preferences {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// `.<name>.<suffix>` in the same directory as `path`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");
    path.with_file_name(format!(".{}.{}", name, suffix))
}

/// Atomically save data to a file using write-to-temp + rename
/// This ensures a watcher sees a single change event
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    // Temp file in the same directory so the rename stays on one filesystem
    let temp_path = sibling(path, &format!("tmp.{}", std::process::id()));

    fs::write(&temp_path, contents).map_err(|err| preferences_error(&temp_path, err))?;
    fs::rename(&temp_path, path).map_err(|err| preferences_error(path, err))?;
    Ok(())
}

/// [`PreferenceStore`] backed by a JSON file.
///
/// Loaded once and kept in memory; every change is written through.
#[derive(Debug)]
pub struct JsonPreferences {
    path: PathBuf,
    data: Mutex<PreferenceData>,
}

impl JsonPreferences {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = PreferenceData::load(&path)?;
        debug!(path = %path.display(), "Loaded preferences");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current preferences
    pub fn data(&self) -> PreferenceData {
        self.lock().clone()
    }

    pub fn set_export_overwrites_selected(&self, value: bool) -> Result<()> {
        self.update(|data| data.export_overwrites_selected = value)
    }

    pub fn set_associate_with_project(&self, value: bool) -> Result<()> {
        self.update(|data| data.associate_with_project = value)
    }

    fn lock(&self) -> MutexGuard<'_, PreferenceData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut PreferenceData),
    {
        let mut data = self.lock();
        let mut updated = data.clone();
        change(&mut updated);
        updated.save(&self.path)?;
        *data = updated;
        Ok(())
    }
}

impl PreferenceStore for JsonPreferences {
    fn selected_file(&self) -> Option<String> {
        self.lock().selected_file.clone().filter(|s| !s.is_empty())
    }

    fn set_selected_file(&self, path: Option<&str>) -> Result<()> {
        self.update(|data| data.selected_file = path.map(str::to_string))
    }

    fn export_overwrites_selected(&self) -> bool {
        self.lock().export_overwrites_selected
    }

    fn associate_with_project(&self) -> bool {
        self.lock().associate_with_project
    }

    fn project_selection(&self, project_file: &Path) -> Option<String> {
        self.lock()
            .project_selections
            .get(&path_key(project_file))
            .cloned()
    }

    fn set_project_selection(&self, project_file: &Path, value: &str) -> Result<()> {
        self.update(|data| {
            data.project_selections
                .insert(path_key(project_file), value.to_string());
        })
    }

    fn access_time(&self, path: &str) -> Option<String> {
        self.lock().last_access_times.get(path).cloned()
    }

    fn set_access_time(&self, path: &str, ticks: &str) -> Result<()> {
        self.update(|data| {
            data.last_access_times
                .insert(path.to_string(), ticks.to_string());
        })
    }
}
