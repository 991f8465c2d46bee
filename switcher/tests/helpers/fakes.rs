//! In-memory collaborators for driving a `Switcher` in tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use snapshot_switcher::host::{LiveSettings, PreferenceStore, ProjectHost, SelectionDisplay};
use snapshot_switcher::{Collaborators, Result, Switcher};
use tempfile::TempDir;

/// Live settings that remember every apply/export and write `content` on export
#[derive(Default)]
pub struct RecordingLive {
    pub applied: Mutex<Vec<PathBuf>>,
    pub exported: Mutex<Vec<PathBuf>>,
    pub content: Mutex<String>,
}

impl RecordingLive {
    pub fn applied(&self) -> Vec<PathBuf> {
        self.applied.lock().unwrap().clone()
    }

    pub fn exported(&self) -> Vec<PathBuf> {
        self.exported.lock().unwrap().clone()
    }

    pub fn last_applied(&self) -> Option<PathBuf> {
        self.applied.lock().unwrap().last().cloned()
    }
}

impl LiveSettings for RecordingLive {
    fn apply(&self, path: &Path) -> io::Result<()> {
        let content = fs::read_to_string(path)?;
        *self.content.lock().unwrap() = content;
        self.applied.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn export(&self, target: &Path) -> io::Result<()> {
        fs::write(target, self.content.lock().unwrap().as_bytes())?;
        self.exported.lock().unwrap().push(target.to_path_buf());
        Ok(())
    }
}

/// Preference store kept in memory
pub struct MemoryPrefs {
    pub selected_file: Mutex<Option<String>>,
    pub export_overwrites_selected: Mutex<bool>,
    pub associate_with_project: Mutex<bool>,
    pub project_selections: Mutex<HashMap<PathBuf, String>>,
    pub access_times: Mutex<HashMap<String, String>>,
}

impl Default for MemoryPrefs {
    fn default() -> Self {
        Self {
            selected_file: Mutex::new(None),
            export_overwrites_selected: Mutex::new(false),
            associate_with_project: Mutex::new(true),
            project_selections: Mutex::new(HashMap::new()),
            access_times: Mutex::new(HashMap::new()),
        }
    }
}

impl PreferenceStore for MemoryPrefs {
    fn selected_file(&self) -> Option<String> {
        self.selected_file.lock().unwrap().clone()
    }

    fn set_selected_file(&self, path: Option<&str>) -> Result<()> {
        *self.selected_file.lock().unwrap() = path.map(str::to_string);
        Ok(())
    }

    fn export_overwrites_selected(&self) -> bool {
        *self.export_overwrites_selected.lock().unwrap()
    }

    fn associate_with_project(&self) -> bool {
        *self.associate_with_project.lock().unwrap()
    }

    fn project_selection(&self, project_file: &Path) -> Option<String> {
        self.project_selections
            .lock()
            .unwrap()
            .get(project_file)
            .cloned()
    }

    fn set_project_selection(&self, project_file: &Path, value: &str) -> Result<()> {
        self.project_selections
            .lock()
            .unwrap()
            .insert(project_file.to_path_buf(), value.to_string());
        Ok(())
    }

    fn access_time(&self, path: &str) -> Option<String> {
        self.access_times.lock().unwrap().get(path).cloned()
    }

    fn set_access_time(&self, path: &str, ticks: &str) -> Result<()> {
        self.access_times
            .lock()
            .unwrap()
            .insert(path.to_string(), ticks.to_string());
        Ok(())
    }
}

/// Project host whose open project is set by the test
#[derive(Default)]
pub struct ScriptedHost {
    pub project: Mutex<Option<PathBuf>>,
    /// Files the host treats as project items (moved instead of copied)
    pub tracked: Mutex<HashSet<PathBuf>>,
    pub added: Mutex<Vec<PathBuf>>,
    pub moves: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl ScriptedHost {
    pub fn open(&self, project_file: &Path) {
        *self.project.lock().unwrap() = Some(project_file.to_path_buf());
    }

    pub fn close(&self) {
        *self.project.lock().unwrap() = None;
    }

    pub fn track(&self, path: &Path) {
        self.tracked.lock().unwrap().insert(path.to_path_buf());
    }
}

impl ProjectHost for ScriptedHost {
    fn current_project_file(&self) -> Option<PathBuf> {
        self.project.lock().unwrap().clone()
    }

    fn move_project_item(&self, from: &Path, to: &Path) -> io::Result<bool> {
        if !self.tracked.lock().unwrap().contains(from) {
            return Ok(false);
        }
        fs::rename(from, to)?;
        self.moves
            .lock()
            .unwrap()
            .push((from.to_path_buf(), to.to_path_buf()));
        Ok(true)
    }

    fn add_project_item(&self, path: &Path) -> io::Result<()> {
        self.added.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

/// Counts refresh requests
#[derive(Default)]
pub struct CountingDisplay {
    pub refreshes: AtomicUsize,
}

impl CountingDisplay {
    pub fn count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl SelectionDisplay for CountingDisplay {
    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A switcher over a temporary snapshot directory with fake collaborators
pub struct Fixture {
    pub temp_dir: TempDir,
    pub settings_dir: PathBuf,
    pub live: Arc<RecordingLive>,
    pub prefs: Arc<MemoryPrefs>,
    pub host: Arc<ScriptedHost>,
    pub display: Arc<CountingDisplay>,
    pub switcher: Arc<Switcher>,
}

impl Fixture {
    /// Configured (but not initialized) switcher over `<tmp>/Settings`
    pub fn new() -> Self {
        Self::with_auto_save("Current.settings")
    }

    /// Same, with the auto-save file named `auto_save` inside the settings directory
    pub fn with_auto_save(auto_save: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let settings_dir = temp_dir.path().join("Settings");
        fs::create_dir_all(&settings_dir).unwrap();

        let live = Arc::new(RecordingLive::default());
        let prefs = Arc::new(MemoryPrefs::default());
        let host = Arc::new(ScriptedHost::default());
        let display = Arc::new(CountingDisplay::default());

        let switcher = Arc::new(Switcher::new(Collaborators {
            live: live.clone(),
            prefs: prefs.clone(),
            host: host.clone(),
            display: display.clone(),
        }));
        switcher
            .configure(Some(&settings_dir.join(auto_save)), "settings")
            .unwrap();

        Self {
            temp_dir,
            settings_dir,
            live,
            prefs,
            host,
            display,
            switcher,
        }
    }

    /// Write a snapshot file under the settings directory
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.settings_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Path of a project descriptor outside the settings directory
    pub fn project_file(&self, name: &str) -> PathBuf {
        let dir = self.temp_dir.path().join("work");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, "project").unwrap();
        path
    }

    pub fn set_default(&self, path: &Path) {
        self.prefs
            .set_selected_file(Some(&path.to_string_lossy()))
            .unwrap();
    }

    pub fn labels(&self) -> Vec<String> {
        self.switcher.display_labels()
    }

    /// Labels sorted, for comparisons that don't depend on access order
    pub fn sorted_labels(&self) -> Vec<String> {
        let mut labels = self.labels();
        labels.sort();
        labels
    }

    /// Pin the OS access time of a file to `unix_secs`
    pub fn set_os_access_time(&self, path: &Path, unix_secs: i64) {
        filetime::set_file_atime(path, filetime::FileTime::from_unix_time(unix_secs, 0)).unwrap();
    }
}
