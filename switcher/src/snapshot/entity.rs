//! Snapshot identity and path derivation
//!
//! A snapshot is one configuration file on disk. Its absolute path never
//! changes after construction; its path relative to the directory it was
//! discovered under is computed exactly once.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::error::{Result, SwitcherError};
use crate::snapshot::naming::{Disambiguator, NameBuilder, ProjectMembership};

/// Identity of a snapshot object. Every construction gets a fresh id, so two
/// scans of the same file produce two distinct snapshots.
pub type SnapshotId = u64;

static NEXT_SNAPSHOT_ID: AtomicU64 = AtomicU64::new(1);

/// Tag shown next to the name of the project-associated snapshot
pub const PROJECT_TAG: &str = "project";

/// The closed set of snapshot kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Discovered under the snapshot directory
    Plain,
    /// Lives next to the open project's descriptor file
    Project,
}

/// One configuration snapshot file
#[derive(Debug, Clone)]
pub struct Snapshot {
    id: SnapshotId,
    kind: SnapshotKind,
    full_path: PathBuf,
    relative_path: PathBuf,
    base_name: OnceLock<String>,
}

impl Snapshot {
    /// Construct a plain snapshot and register it with a building name table.
    ///
    /// Both paths must be absolute.
    pub fn plain(full_path: &Path, base_dir: &Path, names: &mut NameBuilder) -> Result<Self> {
        let snapshot = Self::new(SnapshotKind::Plain, full_path, base_dir)?;
        names.register(&snapshot);
        Ok(snapshot)
    }

    /// Construct the snapshot associated with a project descriptor file.
    ///
    /// The snapshot path is the project file with its extension replaced by
    /// `extension`; its base directory is the folder containing it. Project
    /// snapshots can join either phase of the name table.
    pub fn for_project<M>(project_file: &Path, extension: &str, names: &mut M) -> Result<Self>
    where
        M: ProjectMembership + ?Sized,
    {
        let full_path = project_snapshot_path(project_file, extension)?;
        let base_dir = full_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| SwitcherError::InvalidPath {
                path: full_path.clone(),
            })?;
        let snapshot = Self::new(SnapshotKind::Project, &full_path, &base_dir)?;
        names.attach_project(&snapshot);
        Ok(snapshot)
    }

    fn new(kind: SnapshotKind, full_path: &Path, base_dir: &Path) -> Result<Self> {
        for path in [full_path, base_dir] {
            if !path.is_absolute() {
                return Err(SwitcherError::InvalidPath {
                    path: path.to_path_buf(),
                });
            }
        }

        Ok(Self {
            id: NEXT_SNAPSHOT_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            full_path: full_path.to_path_buf(),
            relative_path: relative_path(full_path, base_dir),
            base_name: OnceLock::new(),
        })
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn kind(&self) -> SnapshotKind {
        self.kind
    }

    pub fn is_project(&self) -> bool {
        self.kind == SnapshotKind::Project
    }

    /// Absolute path of the snapshot file
    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    /// Path relative to the directory the snapshot was discovered under
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// File name without its extension
    pub fn base_name(&self) -> &str {
        self.base_name.get_or_init(|| {
            self.full_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    /// Special tag shown with the name, if any
    pub fn special_tag(&self) -> Option<&'static str> {
        match self.kind {
            SnapshotKind::Plain => None,
            SnapshotKind::Project => Some(PROJECT_TAG),
        }
    }

    pub fn exists(&self) -> bool {
        self.full_path.is_file()
    }

    /// Unique label assigned by the sealed name table
    pub fn display_label(&self, names: &Disambiguator) -> String {
        match names.label(self.id) {
            Some(label) => label.to_string(),
            None => {
                debug_assert!(false, "snapshot {} is not registered", self.full_path.display());
                self.base_name().to_string()
            }
        }
    }

    /// Case-insensitive comparison against another absolute path
    pub fn has_path(&self, path: &Path) -> bool {
        path_key(&self.full_path) == path_key(path)
    }
}

/// Derive the snapshot path for a project descriptor file
pub fn project_snapshot_path(project_file: &Path, extension: &str) -> Result<PathBuf> {
    if !project_file.is_absolute() || project_file.file_name().is_none() {
        return Err(SwitcherError::InvalidPath {
            path: project_file.to_path_buf(),
        });
    }
    Ok(project_file.with_extension(extension.trim_start_matches('.')))
}

/// Normalised key used for case-insensitive path comparison
pub fn path_key(path: &Path) -> String {
    let mut key = path.to_string_lossy().replace('\\', "/").to_lowercase();
    while key.len() > 1 && key.ends_with('/') {
        key.pop();
    }
    key
}

/// True if `path` lies strictly inside `dir` (case-insensitive)
pub fn is_within(dir: &Path, path: &Path) -> bool {
    let dir = path_key(dir);
    let path = path_key(path);
    let prefix = if dir.ends_with('/') {
        dir
    } else {
        format!("{}/", dir)
    };
    path.len() > prefix.len() && path.starts_with(&prefix)
}

fn component_key(component: &Component<'_>) -> String {
    component.as_os_str().to_string_lossy().to_lowercase()
}

/// Relative path from `base_dir` to `full_path`, never absolute
fn relative_path(full_path: &Path, base_dir: &Path) -> PathBuf {
    let target: Vec<Component<'_>> = full_path.components().collect();
    let base: Vec<Component<'_>> = base_dir.components().collect();

    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| component_key(a) == component_key(b))
        .count();

    let mut relative = PathBuf::new();
    if common == 0 {
        // Different roots (e.g. another drive); keep what can be made relative
        for component in &target {
            if let Component::Normal(part) = component {
                relative.push(part);
            }
        }
        return relative;
    }

    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component.as_os_str());
    }
    relative
}
