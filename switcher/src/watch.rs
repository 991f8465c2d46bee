//! Filesystem notifications for the snapshot directory
//!
//! Wraps a `notify` watcher over the base directory (recursive). Events for
//! files with the snapshot extension are mapped to [`ChangeEvent`]s and
//! delivered to the switcher on the watcher's own thread. Delivery can be
//! paused; watcher errors are logged and never reach the switcher.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error};

use crate::engine::Switcher;
use crate::error::{Result, SwitcherError};
use crate::host::{ChangeEvent, ChangeSource};
use crate::layout::SettingsLayout;

/// Watches the base directory and feeds changes to a [`Switcher`]
pub struct SnapshotWatcher {
    _watcher: RecommendedWatcher,
    enabled: Arc<AtomicBool>,
    root: PathBuf,
}

impl SnapshotWatcher {
    /// Start watching the switcher's base directory.
    ///
    /// Only a weak reference to the switcher is kept, so dropping the
    /// switcher silently ends delivery.
    pub fn start(switcher: &Arc<Switcher>) -> Result<Self> {
        let layout = switcher
            .layout()
            .ok_or_else(|| std::io::Error::other("switcher is not configured"))?;
        let root = layout.settings_dir.clone();
        let layout = layout.clone();

        let enabled = Arc::new(AtomicBool::new(true));
        let target: Weak<Switcher> = Arc::downgrade(switcher);
        let gate = Arc::clone(&enabled);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    error!(error = %err, "Snapshot watcher error");
                    return;
                }
            };
            if !gate.load(Ordering::SeqCst) {
                return;
            }
            let Some(change) = convert_event(event, &layout) else {
                return;
            };
            match target.upgrade() {
                Some(switcher) => switcher.handle_change(&change),
                None => debug!("Switcher dropped, ignoring change"),
            }
        })
        .map_err(watch_error)?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(watch_error)?;
        debug!(root = %root.display(), "Watching snapshot directory");

        Ok(Self {
            _watcher: watcher,
            enabled,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ChangeSource for SnapshotWatcher {
    fn set_enabled(&self, enabled: bool) {
        debug!(enabled, "Snapshot watcher toggled");
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

fn watch_error(err: notify::Error) -> SwitcherError {
    let source = match err.kind {
        notify::ErrorKind::Io(io) => io,
        other => std::io::Error::other(format!("{:?}", other)),
    };
    SwitcherError::Io(source)
}

/// Map a notify event to a change, keeping only snapshot files
fn convert_event(event: Event, layout: &SettingsLayout) -> Option<ChangeEvent> {
    if !event.paths.iter().any(|p| layout.matches_extension(p)) {
        return None;
    }
    let mut paths = event.paths.into_iter();

    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) | EventKind::Any
            if paths.len() >= 2 =>
        {
            let from = paths.next()?;
            let to = paths.next()?;
            Some(ChangeEvent::Renamed { from, to })
        }
        EventKind::Create(_) => paths.next().map(ChangeEvent::Created),
        EventKind::Remove(_) => paths.next().map(ChangeEvent::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.next().map(ChangeEvent::Deleted)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.next().map(ChangeEvent::Created)
        }
        EventKind::Modify(_) => paths.next().map(ChangeEvent::Changed),
        _ => None,
    }
}
