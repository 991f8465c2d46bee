// Directory enumeration and full registry rebuilds

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::engine::{Switcher, SwitcherState};
use crate::error::{Result, SwitcherError};
use crate::layout::SettingsLayout;
use crate::snapshot::entity::{path_key, project_snapshot_path, Snapshot};
use crate::snapshot::naming::Disambiguator;
use crate::snapshot::registry::SnapshotRegistry;

/// Every file with the snapshot extension under the settings directory,
/// recursively, except `exclude`.
///
/// A failure to read the root is a [`SwitcherError::ScanFailure`]; failures
/// below it only drop the affected entries.
pub fn scan_snapshot_files(layout: &SettingsLayout, exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    let exclude = exclude.map(path_key);
    let mut files = Vec::new();

    for entry in WalkDir::new(&layout.settings_dir)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(SwitcherError::ScanFailure {
                    dir: layout.settings_dir.clone(),
                    source: err.into(),
                });
            }
            Err(err) => {
                warn!(error = %err, "Skipping unreadable entry");
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !layout.matches_extension(path) {
            continue;
        }
        if exclude.as_deref() == Some(path_key(path).as_str()) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    Ok(files)
}

impl Switcher {
    /// Throw away the registry and name table and build both again from disk.
    ///
    /// `project_file` is the open project's descriptor; its snapshot is kept
    /// out of the directory scan and attached separately when it exists. The
    /// selection is re-resolved by path against the new snapshots. On a
    /// scan failure nothing changes.
    pub(crate) fn rebuild(
        &self,
        state: &mut SwitcherState,
        layout: &SettingsLayout,
        project_file: Option<&Path>,
    ) -> Result<()> {
        let project_path = project_file.and_then(|file| {
            project_snapshot_path(file, &layout.extension)
                .map_err(|err| warn!(error = %err, "Ignoring project file"))
                .ok()
        });

        let files = match scan_snapshot_files(layout, project_path.as_deref()) {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %err, "Rescan failed, keeping previous snapshots");
                return Err(err);
            }
        };

        let previous_selection = state
            .selected
            .and_then(|id| state.registry.get(id))
            .map(|s| s.full_path().to_path_buf());

        let names = std::mem::replace(&mut state.names, Disambiguator::empty(layout.reserved()));
        let mut builder = names.reopen();
        let mut snapshots = Vec::with_capacity(files.len() + 1);

        for path in &files {
            match Snapshot::plain(path, &layout.settings_dir, &mut builder) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => warn!(error = %err, "Skipping snapshot"),
            }
        }

        if let (Some(file), Some(path)) = (project_file, project_path.as_deref()) {
            if path.is_file() {
                match Snapshot::for_project(file, &layout.extension, &mut builder) {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(err) => warn!(error = %err, "Skipping project snapshot"),
                }
            }
        }

        // Stable sort keeps file-name order among equal timestamps
        let mut keyed: Vec<(DateTime<Utc>, Snapshot)> = snapshots
            .into_iter()
            .map(|s| (s.last_accessed(self.prefs.as_ref()), s))
            .collect();
        keyed.sort_by(|a, b| b.0.cmp(&a.0));

        // Paths differing only in case are one snapshot; drop the others from
        // the name table as well.
        let mut seen = HashSet::with_capacity(keyed.len());
        keyed.retain(|(_, s)| {
            if seen.insert(path_key(s.full_path())) {
                return true;
            }
            debug!(path = %s.full_path().display(), "Dropping case-duplicate snapshot");
            builder.remove(s.id());
            false
        });

        state.names = builder.seal();
        state.registry = SnapshotRegistry::from_snapshots(keyed.into_iter().map(|(_, s)| s));
        state.selected = previous_selection
            .and_then(|path| state.registry.find_by_absolute_path(&path))
            .map(Snapshot::id);

        debug!(
            count = state.registry.len(),
            selected = state.selected.is_some(),
            "Snapshots loaded"
        );
        Ok(())
    }
}
