// Project lifecycle transitions and exports

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::engine::{PersistedSelection, Switcher, SwitcherState};
use crate::error::{Result, SwitcherError};
use crate::layout::SettingsLayout;
use crate::snapshot::entity::{path_key, project_snapshot_path, Snapshot};
use crate::snapshot::naming::ProjectMembership;

/// Result of exporting the live configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Exported(PathBuf),
    /// No target given and the selection may not be overwritten
    TargetRequired,
    /// No base directory
    Unconfigured,
}

impl Switcher {
    /// Make sure the open project's snapshot is in the registry.
    ///
    /// It is only created when its file exists, unless `force` is set. Any
    /// project snapshot left over from another project is dropped.
    pub(crate) fn ensure_project_snapshot(
        &self,
        state: &mut SwitcherState,
        layout: &SettingsLayout,
        project_file: &Path,
        force: bool,
    ) -> Result<Option<Snapshot>> {
        let path = project_snapshot_path(project_file, &layout.extension)?;

        match state.registry.find_by_absolute_path(&path) {
            Some(existing) if existing.is_project() => return Ok(Some(existing.clone())),
            Some(_) => {
                // Scanned as a plain snapshot before the project opened
                self.rebuild(state, layout, Some(project_file))?;
                if let Some(existing) = state.registry.project_snapshot() {
                    return Ok(Some(existing.clone()));
                }
            }
            None => {}
        }

        self.detach_project_snapshot(state);

        if !force && !path.is_file() {
            debug!(path = %path.display(), "No project snapshot on disk");
            return Ok(None);
        }

        let snapshot = Snapshot::for_project(project_file, &layout.extension, &mut state.names)?;
        state.registry.add(snapshot.clone());
        Ok(Some(snapshot))
    }

    /// Remove the project snapshot from the registry and name table
    fn detach_project_snapshot(&self, state: &mut SwitcherState) -> Option<Snapshot> {
        let id = state.registry.project_snapshot()?.id();
        let removed = state.registry.remove(id)?;
        state.names.detach_project(id);
        if state.selected == Some(id) {
            state.selected = None;
        }
        Some(removed)
    }

    /// A project was opened.
    ///
    /// With association enabled, a stored per-project selection that resolves
    /// to a known snapshot wins. Otherwise the project's own snapshot is
    /// applied when its file exists.
    pub fn project_opened(&self) -> Result<()> {
        let Some(layout) = self.layout() else {
            return Ok(());
        };
        let Some(project_file) = self.host.current_project_file() else {
            return Ok(());
        };
        info!(project = %project_file.display(), "Project opened");

        let project_snapshot = {
            let mut state = self.lock();
            self.ensure_project_snapshot(&mut state, layout, &project_file, false)?
        };

        if self.prefs.associate_with_project() {
            let stored = self
                .prefs
                .project_selection(&project_file)
                .filter(|p| !p.is_empty());

            if let Some(stored) = stored {
                let stored = PathBuf::from(stored);
                let resolved = {
                    let state = self.lock();
                    state
                        .registry
                        .find_by_absolute_path(&stored)
                        .map(|s| (s.clone(), state.selected == Some(s.id())))
                };

                if let Some((snapshot, already_selected)) = resolved {
                    if already_selected {
                        self.display.refresh();
                    } else {
                        debug!(path = %stored.display(), "Restoring project selection");
                        self.import_path(snapshot.full_path(), false)?;
                    }
                    return Ok(());
                }
            }
        }

        match project_snapshot.filter(Snapshot::exists) {
            Some(snapshot) => {
                self.import_path(snapshot.full_path(), false)?;
            }
            None => self.display.refresh(),
        }
        Ok(())
    }

    /// The open project was renamed; `old_project_file` is its previous
    /// descriptor path.
    ///
    /// The snapshot follows the project: the old entry is replaced by one at
    /// the new derived path (created even if the old file never existed) and
    /// the file is moved through the host or copied.
    pub fn project_renamed(&self, old_project_file: &Path) -> Result<()> {
        let Some(layout) = self.layout() else {
            return Ok(());
        };
        let Some(project_file) = self.host.current_project_file() else {
            return Ok(());
        };

        let (old, new) = {
            let mut state = self.lock();
            let Some(old) = state.registry.project_snapshot().cloned() else {
                debug!(old = %old_project_file.display(), "Renamed project had no snapshot");
                return Ok(());
            };
            let was_selected = state.selected == Some(old.id());

            self.detach_project_snapshot(&mut state);
            let Some(new) = self.ensure_project_snapshot(&mut state, layout, &project_file, true)?
            else {
                return Ok(());
            };
            if was_selected {
                state.selected = Some(new.id());
            }
            (old, new)
        };

        info!(
            from = %old.full_path().display(),
            to = %new.full_path().display(),
            "Carrying project snapshot"
        );

        let result = if path_key(old.full_path()) == path_key(new.full_path()) {
            debug!(path = %new.full_path().display(), "Project snapshot path unchanged");
            Ok(())
        } else if old.exists() {
            self.carry_project_file(old.full_path(), new.full_path())
        } else {
            debug!(path = %old.full_path().display(), "Old project snapshot missing, nothing to copy");
            Ok(())
        };

        self.display.refresh();
        result
    }

    fn carry_project_file(&self, from: &Path, to: &Path) -> Result<()> {
        let conflict = |source| SwitcherError::ProjectFileConflict {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        };

        match self.host.move_project_item(from, to) {
            Ok(true) => Ok(()),
            Ok(false) => fs::copy(from, to).map(|_| ()).map_err(conflict),
            Err(err) => Err(conflict(err)),
        }
    }

    /// The project is about to close.
    ///
    /// If the project snapshot is selected, the revert target is resolved
    /// from the persisted default before the snapshot is removed. Outside of
    /// shutdown the directory is rescanned without the project. The
    /// selection to remember for the project is written when association is
    /// enabled.
    pub fn project_closing(&self) -> Result<()> {
        let Some(layout) = self.layout() else {
            return Ok(());
        };
        let project_file = self.host.current_project_file();
        let shutting_down = self.is_shutting_down();
        let default = self.prefs.selected_file().map(PathBuf::from);

        let (persist, revert) = {
            let mut state = self.lock();
            if !shutting_down {
                state.pending_persisted = state.selected_snapshot().map(PersistedSelection::of);
            }
            let persist = state.pending_persisted.take();

            let project_selected = state
                .selected_snapshot()
                .is_some_and(Snapshot::is_project);
            if project_selected {
                state.selected = default
                    .as_deref()
                    .and_then(|p| state.registry.find_by_absolute_path(p))
                    .map(Snapshot::id);
            }

            if state.registry.project_snapshot().is_some() {
                self.detach_project_snapshot(&mut state);
                if !shutting_down {
                    self.rebuild(&mut state, layout, None)?;
                }
            }

            let revert = project_selected.then(|| state.selected_snapshot().cloned());
            (persist, revert)
        };

        if let (Some(project_file), Some(persist)) = (project_file.as_deref(), persist) {
            if self.prefs.associate_with_project() {
                debug!(project = %project_file.display(), ?persist, "Saving project selection");
                self.prefs
                    .set_project_selection(project_file, &persist.to_pref_value())?;
            }
        }

        match revert {
            Some(Some(snapshot)) => {
                info!(path = %snapshot.full_path().display(), "Reverting to default snapshot");
                if let Err(err) = snapshot.touch(self.prefs.as_ref()) {
                    warn!(error = %err, "Failed to record access time");
                }
                self.live
                    .apply(snapshot.full_path())
                    .map_err(|source| SwitcherError::Apply {
                        path: snapshot.full_path().to_path_buf(),
                        source,
                    })?;
            }
            Some(None) => debug!("No default snapshot to revert to"),
            None => {}
        }

        self.display.refresh();
        Ok(())
    }

    /// Export the live configuration.
    ///
    /// Overwrites the selected snapshot when that preference is on and the
    /// selection is not an auto-saved file; otherwise `target` is used.
    pub fn export_current(&self, target: Option<&Path>) -> Result<ExportOutcome> {
        let Some(layout) = self.layout() else {
            return Ok(ExportOutcome::Unconfigured);
        };

        let overwrite = if self.prefs.export_overwrites_selected() {
            self.selected_path().filter(|p| !layout.is_auto_saved(p))
        } else {
            None
        };

        let destination = match (overwrite, target) {
            (Some(selected), _) => selected,
            (None, Some(target)) if target.is_absolute() => target.to_path_buf(),
            (None, Some(target)) => {
                return Err(SwitcherError::InvalidPath {
                    path: target.to_path_buf(),
                })
            }
            (None, None) => return Ok(ExportOutcome::TargetRequired),
        };

        self.export_to(&destination)?;
        Ok(ExportOutcome::Exported(destination))
    }

    /// Export into the open project's snapshot, adding a newly created file
    /// to the project
    pub fn export_project(&self) -> Result<Option<PathBuf>> {
        let Some(layout) = self.layout() else {
            return Ok(None);
        };
        let Some(project_file) = self.host.current_project_file() else {
            return Ok(None);
        };

        let snapshot = {
            let mut state = self.lock();
            self.ensure_project_snapshot(&mut state, layout, &project_file, true)?
        };
        let Some(snapshot) = snapshot else {
            return Ok(None);
        };

        let existed = snapshot.exists();
        self.export_to(snapshot.full_path())?;

        if !existed && snapshot.exists() {
            if let Err(err) = self.host.add_project_item(snapshot.full_path()) {
                warn!(error = %err, "Failed to add snapshot to project");
            }
        }
        Ok(Some(snapshot.full_path().to_path_buf()))
    }

    /// Export the live configuration to `target` and select it
    pub(crate) fn export_to(&self, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        info!(path = %target.display(), "Exporting live settings");
        self.live
            .export(target)
            .map_err(|source| SwitcherError::Export {
                path: target.to_path_buf(),
                source,
            })?;

        if !self.select_only(target)? {
            // Outside the base directory and not the project snapshot
            self.display.refresh();
        }
        Ok(())
    }
}
