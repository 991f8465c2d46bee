//! Reconciliation engine
//!
//! [`Switcher`] keeps the snapshot registry, the name table and the current
//! selection consistent with the filesystem, the open project and the
//! preference store.
//!
//! All three live behind one mutex (the gate). The gate is never held while
//! calling [`LiveSettings`], [`SelectionDisplay`], the project host, or any
//! preference store setter, since those may call back into the switcher.
//! Directory rescans always rebuild from scratch.

mod project;
mod scan;

pub use scan::scan_snapshot_files;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SwitcherError};
use crate::host::{
    ChangeEvent, ChangeSource, LiveSettings, PreferenceStore, ProjectHost, SelectionDisplay,
};
use crate::layout::SettingsLayout;
use crate::snapshot::entity::{is_within, Snapshot, SnapshotId, SnapshotKind};
use crate::snapshot::naming::{Disambiguator, ReservedPaths};
use crate::snapshot::registry::SnapshotRegistry;

pub use project::ExportOutcome;

/// External collaborators of the switcher
#[derive(Clone)]
pub struct Collaborators {
    pub live: Arc<dyn LiveSettings>,
    pub prefs: Arc<dyn PreferenceStore>,
    pub host: Arc<dyn ProjectHost>,
    pub display: Arc<dyn SelectionDisplay>,
}

/// A selection that still has to be written to the per-project store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistedSelection {
    /// The project's own snapshot
    Project,
    File(PathBuf),
}

impl PersistedSelection {
    fn of(snapshot: &Snapshot) -> Self {
        if snapshot.is_project() {
            Self::Project
        } else {
            Self::File(snapshot.full_path().to_path_buf())
        }
    }

    /// Stored form; the empty string stands for the project's own snapshot
    pub fn to_pref_value(&self) -> String {
        match self {
            Self::Project => String::new(),
            Self::File(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// One row of the snapshot listing
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub label: String,
    pub path: PathBuf,
    pub kind: SnapshotKind,
    pub last_accessed: DateTime<Utc>,
    pub selected: bool,
}

/// State guarded by the gate
pub(crate) struct SwitcherState {
    pub(crate) registry: SnapshotRegistry,
    pub(crate) names: Disambiguator,
    /// Live selection
    pub(crate) selected: Option<SnapshotId>,
    /// Selection to persist for the project when it closes.
    ///
    /// Written on project close (from the live selection) unless shutting
    /// down; during shutdown only [`Switcher::begin_shutdown`] writes it,
    /// before the project-closing transition changes the live selection.
    pub(crate) pending_persisted: Option<PersistedSelection>,
}

impl SwitcherState {
    fn selected_snapshot(&self) -> Option<&Snapshot> {
        self.selected.and_then(|id| self.registry.get(id))
    }
}

/// The settings snapshot switcher
pub struct Switcher {
    live: Arc<dyn LiveSettings>,
    prefs: Arc<dyn PreferenceStore>,
    host: Arc<dyn ProjectHost>,
    display: Arc<dyn SelectionDisplay>,
    change_source: OnceLock<Arc<dyn ChangeSource>>,
    layout: OnceLock<SettingsLayout>,
    gate: Mutex<SwitcherState>,
    shutting_down: AtomicBool,
    rescan_pending: AtomicBool,
}

/// What initialisation does when no selection exists yet
enum Bootstrap {
    Restored,
    ImportFirstRun,
    ExportFirstRun,
}

impl Switcher {
    /// Create an unconfigured switcher
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            live: collaborators.live,
            prefs: collaborators.prefs,
            host: collaborators.host,
            display: collaborators.display,
            change_source: OnceLock::new(),
            layout: OnceLock::new(),
            gate: Mutex::new(SwitcherState {
                registry: SnapshotRegistry::new(),
                names: Disambiguator::empty(ReservedPaths::default()),
                selected: None,
                pending_persisted: None,
            }),
            shutting_down: AtomicBool::new(false),
            rescan_pending: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SwitcherState> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the base directory from the host's auto-save file.
    ///
    /// Without a usable path the switcher stays unconfigured and every
    /// operation is a no-op. Configuration happens at most once.
    pub fn configure(&self, auto_save: Option<&Path>, extension: &str) -> Result<bool> {
        let Some(auto_save) = auto_save.filter(|p| !p.as_os_str().is_empty()) else {
            info!("No auto-save file, switcher stays unconfigured");
            return Ok(false);
        };

        let layout = SettingsLayout::from_auto_save_file(auto_save, extension)?;
        std::fs::create_dir_all(&layout.settings_dir)?;

        if let Err(rejected) = self.layout.set(layout) {
            warn!(dir = %rejected.settings_dir.display(), "Switcher already configured");
        } else {
            info!(dir = %auto_save.display(), "Switcher configured");
        }
        Ok(true)
    }

    /// Base directory and reserved paths, once configured
    pub fn layout(&self) -> Option<&SettingsLayout> {
        self.layout.get()
    }

    pub fn is_configured(&self) -> bool {
        self.layout.get().is_some()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Register the notification source paused on shutdown
    pub fn attach_change_source(&self, source: Arc<dyn ChangeSource>) {
        if self.change_source.set(source).is_err() {
            warn!("Change source already attached");
        }
    }

    /// Initial scan, then make sure a selection exists.
    ///
    /// A valid persisted default is restored without applying it. Otherwise
    /// the first-run snapshot is imported if it exists, or exported from the
    /// live configuration if it does not.
    pub fn initialize(&self) -> Result<()> {
        let Some(layout) = self.layout() else {
            return Ok(());
        };
        let project_file = self.host.current_project_file();
        let default = self.prefs.selected_file().map(PathBuf::from);

        let bootstrap = {
            let mut state = self.lock();
            self.rebuild(&mut state, layout, project_file.as_deref())?;

            if state.selected.is_some() {
                Bootstrap::Restored
            } else {
                let restored = default
                    .filter(|p| p.is_file() && is_within(&layout.settings_dir, p))
                    .and_then(|p| state.registry.find_by_absolute_path(&p).map(Snapshot::id));
                match restored {
                    Some(id) => {
                        state.selected = Some(id);
                        Bootstrap::Restored
                    }
                    None if layout.first_run.is_file() => Bootstrap::ImportFirstRun,
                    None => Bootstrap::ExportFirstRun,
                }
            }
        };

        match bootstrap {
            Bootstrap::Restored => {
                debug!("Restored default selection");
                self.display.refresh();
            }
            Bootstrap::ImportFirstRun => {
                info!(path = %layout.first_run.display(), "Importing first-run snapshot");
                self.import_path(&layout.first_run, false)?;
            }
            Bootstrap::ExportFirstRun => {
                info!(path = %layout.first_run.display(), "Exporting first-run snapshot");
                self.export_to(&layout.first_run)?;
            }
        }
        Ok(())
    }

    /// Explicit rescan of the base directory
    pub fn rescan(&self) -> Result<()> {
        let Some(layout) = self.layout() else {
            return Ok(());
        };
        let project_file = self.host.current_project_file();
        {
            let mut state = self.lock();
            self.rebuild(&mut state, layout, project_file.as_deref())?;
        }
        self.display.refresh();
        Ok(())
    }

    /// React to a filesystem change under the base directory.
    ///
    /// Dropped while shutting down. Bursts of events coalesce: a handler that
    /// finds its change already covered by a rescan started after it arrived
    /// returns without scanning again.
    pub fn handle_change(&self, event: &ChangeEvent) {
        if self.is_shutting_down() {
            debug!(?event, "Ignoring change during shutdown");
            return;
        }
        let Some(layout) = self.layout() else {
            return;
        };

        self.rescan_pending.store(true, Ordering::SeqCst);
        let project_file = self.host.current_project_file();
        {
            let mut state = self.lock();
            if !self.rescan_pending.swap(false, Ordering::SeqCst) {
                debug!(?event, "Change already covered by a rescan");
                return;
            }
            debug!(path = %event.path().display(), "Rescanning after change");
            if let Err(err) = self.rebuild(&mut state, layout, project_file.as_deref()) {
                error!(error = %err, "Rescan after change failed");
                return;
            }
        }
        self.display.refresh();
    }

    /// Select by display label, apply it, and make it the default.
    ///
    /// Returns false (and changes nothing) when no snapshot has that label,
    /// even after a rescan.
    pub fn select_label(&self, label: &str) -> Result<bool> {
        let found = self.select_where(|state| {
            state
                .registry
                .find_by_display_label(&state.names, label)
                .map(Snapshot::id)
        });
        match found {
            Some(snapshot) => self.activate(&snapshot, true, true).map(|_| true),
            None => {
                debug!(label, "No snapshot with label");
                Ok(false)
            }
        }
    }

    /// Select by absolute path, apply it, and make it the default
    pub fn select_path(&self, path: &Path) -> Result<bool> {
        if !path.is_absolute() {
            return Err(SwitcherError::InvalidPath {
                path: path.to_path_buf(),
            });
        }
        self.import_path(path, true)
    }

    /// Select `path` and apply it
    pub(crate) fn import_path(&self, path: &Path, save_default: bool) -> Result<bool> {
        match self.find_and_select(path) {
            Some(snapshot) => self.activate(&snapshot, true, save_default).map(|_| true),
            None => {
                debug!(path = %path.display(), "No snapshot at path");
                Ok(false)
            }
        }
    }

    /// Select `path` without applying it
    pub(crate) fn select_only(&self, path: &Path) -> Result<bool> {
        match self.find_and_select(path) {
            Some(snapshot) => self.activate(&snapshot, false, false).map(|_| true),
            None => Ok(false),
        }
    }

    fn find_and_select(&self, path: &Path) -> Option<Snapshot> {
        self.select_where(|state| state.registry.find_by_absolute_path(path).map(Snapshot::id))
    }

    /// Resolve a snapshot, rescanning once on a miss, and make it the live
    /// selection. The selection is unchanged when nothing is found.
    fn select_where<F>(&self, find: F) -> Option<Snapshot>
    where
        F: Fn(&SwitcherState) -> Option<SnapshotId>,
    {
        let layout = self.layout()?;
        let project_file = self.host.current_project_file();

        let mut state = self.lock();
        let id = match find(&state) {
            Some(id) => id,
            None => {
                if let Err(err) = self.rebuild(&mut state, layout, project_file.as_deref()) {
                    warn!(error = %err, "Rescan before retry failed");
                }
                find(&state)?
            }
        };
        state.selected = Some(id);
        state.registry.get(id).cloned()
    }

    /// Touch, optionally apply, optionally save as default, then refresh
    fn activate(&self, snapshot: &Snapshot, apply: bool, save_default: bool) -> Result<()> {
        if let Err(err) = snapshot.touch(self.prefs.as_ref()) {
            warn!(error = %err, "Failed to record access time");
        }

        let applied = if apply {
            info!(path = %snapshot.full_path().display(), "Applying snapshot");
            self.live
                .apply(snapshot.full_path())
                .map_err(|source| SwitcherError::Apply {
                    path: snapshot.full_path().to_path_buf(),
                    source,
                })
        } else {
            Ok(())
        };

        if applied.is_ok() && save_default && !snapshot.is_project() {
            let path = snapshot.full_path().to_string_lossy();
            if let Err(err) = self.prefs.set_selected_file(Some(&path)) {
                warn!(error = %err, "Failed to save default selection");
            }
        }

        self.display.refresh();
        applied
    }

    /// Labels of all snapshots in registry order
    pub fn display_labels(&self) -> Vec<String> {
        let mut state = self.lock();
        let SwitcherState {
            registry, names, ..
        } = &mut *state;
        registry.all_display_labels(names).to_vec()
    }

    /// Label of the current selection, for syncing a selection control
    pub fn selected_label(&self) -> Option<String> {
        let state = self.lock();
        state
            .selected_snapshot()
            .map(|s| s.display_label(&state.names))
    }

    pub fn selected_path(&self) -> Option<PathBuf> {
        self.lock()
            .selected_snapshot()
            .map(|s| s.full_path().to_path_buf())
    }

    /// Every snapshot with its label and last access time
    pub fn snapshots(&self) -> Vec<SnapshotInfo> {
        let state = self.lock();
        state
            .registry
            .iter()
            .map(|s| SnapshotInfo {
                label: s.display_label(&state.names),
                path: s.full_path().to_path_buf(),
                kind: s.kind(),
                last_accessed: s.last_accessed(self.prefs.as_ref()),
                selected: state.selected == Some(s.id()),
            })
            .collect()
    }

    /// Whether the project snapshot can be exported right now
    pub fn can_export_project(&self) -> bool {
        self.is_configured() && self.host.is_project_open()
    }

    /// Start shutting down.
    ///
    /// The live selection is captured as the value to persist before the
    /// project-closing transition runs, since closing may revert it.
    pub fn begin_shutdown(&self) -> Result<()> {
        {
            let mut state = self.lock();
            state.pending_persisted = state.selected_snapshot().map(PersistedSelection::of);
        }
        self.shutting_down.store(true, Ordering::SeqCst);
        if let Some(source) = self.change_source.get() {
            source.set_enabled(false);
        }
        info!("Shutting down");

        if self.is_configured() && self.host.is_project_open() {
            self.project_closing()?;
        }
        Ok(())
    }
}
