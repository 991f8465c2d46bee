// Settings snapshot switcher
// Keeps a registry of configuration snapshot files, labels them uniquely and
// switches the live configuration between them

// Collaborator contracts (editor, preferences, project host, notifications)
pub mod host;

// Snapshot entities, naming and registry
pub mod snapshot;

// Reconciliation engine
pub mod engine;

pub mod config;
pub mod error;
pub mod layout;
pub mod local;
pub mod prefs;
pub mod watch;

pub use engine::{Collaborators, ExportOutcome, PersistedSelection, SnapshotInfo, Switcher};
pub use error::{Result, SwitcherError};
