//! Contracts for the collaborators the switcher depends on
//!
//! The engine depends on these abstractions, not on any particular editor,
//! preferences backend or watcher. Implementations must not call back into
//! the engine from `PreferenceStore` reads; every other callback happens
//! outside the engine's gate and may re-enter freely.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Makes snapshot contents the live configuration, and captures it again
pub trait LiveSettings: Send + Sync {
    /// Load the file at `path` into the live configuration
    fn apply(&self, path: &Path) -> io::Result<()>;

    /// Write the live configuration to `target`
    fn export(&self, target: &Path) -> io::Result<()>;
}

/// Durable key-value store for switcher preferences
pub trait PreferenceStore: Send + Sync {
    /// Absolute path of the default selection, if any
    fn selected_file(&self) -> Option<String>;
    fn set_selected_file(&self, path: Option<&str>) -> Result<()>;

    /// Whether exporting overwrites the selected snapshot instead of asking for a target
    fn export_overwrites_selected(&self) -> bool;

    /// Whether each project remembers its own selection
    fn associate_with_project(&self) -> bool;

    /// Selection remembered for a project. An empty string means
    /// "the project's own snapshot".
    fn project_selection(&self, project_file: &Path) -> Option<String>;
    fn set_project_selection(&self, project_file: &Path, value: &str) -> Result<()>;

    /// Persisted last-access time for a snapshot path (base-10 file-time ticks)
    fn access_time(&self, path: &str) -> Option<String>;
    fn set_access_time(&self, path: &str, ticks: &str) -> Result<()>;
}

/// The project/session host
pub trait ProjectHost: Send + Sync {
    /// Descriptor file of the open project, if any
    fn current_project_file(&self) -> Option<PathBuf>;

    fn is_project_open(&self) -> bool {
        self.current_project_file().is_some()
    }

    /// Move a file that is tracked as part of the project.
    ///
    /// Returns `Ok(false)` when `from` is not tracked, in which case the caller
    /// falls back to a plain filesystem copy.
    fn move_project_item(&self, from: &Path, to: &Path) -> io::Result<bool>;

    /// Start tracking a newly created file as part of the project
    fn add_project_item(&self, path: &Path) -> io::Result<()>;
}

/// Surfaces showing the selection (toolbars, combo boxes, terminals)
pub trait SelectionDisplay: Send + Sync {
    fn refresh(&self);
}

impl<F> SelectionDisplay for F
where
    F: Fn() + Send + Sync,
{
    fn refresh(&self) {
        self()
    }
}

/// Display that ignores refresh requests
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDisplay;

impl SelectionDisplay for NoDisplay {
    fn refresh(&self) {}
}

/// A source of filesystem change notifications that can be paused
pub trait ChangeSource: Send + Sync {
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
}

/// Filesystem change affecting a snapshot file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(PathBuf),
    Changed(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl ChangeEvent {
    /// The path the event now refers to
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(p) | Self::Changed(p) | Self::Deleted(p) => p,
            Self::Renamed { to, .. } => to,
        }
    }
}
