//! Snapshot model: entities, naming and the registry

pub mod access;
pub mod entity;
pub mod naming;
pub mod registry;

pub use entity::{project_snapshot_path, Snapshot, SnapshotId, SnapshotKind, PROJECT_TAG};
pub use naming::{Disambiguator, LabelTemplate, NameBuilder, ProjectMembership, ReservedPaths};
pub use registry::SnapshotRegistry;
