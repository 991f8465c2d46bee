//! Ordered collection of snapshots
//!
//! Insertion order is discovery order (most recently accessed first after a
//! scan). The registry owns snapshot lifetime; removal is the only way a
//! snapshot goes away.

use std::collections::HashMap;
use std::path::Path;

use crate::snapshot::entity::{path_key, Snapshot, SnapshotId};
use crate::snapshot::naming::Disambiguator;

#[derive(Debug, Default)]
pub struct SnapshotRegistry {
    entries: Vec<Snapshot>,
    /// path key -> index into `entries`
    by_path: HashMap<String, usize>,
    /// Label list cached against the name table generation it came from
    labels: Option<(u64, Vec<String>)>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from snapshots in order, skipping duplicate paths
    pub fn from_snapshots(snapshots: impl IntoIterator<Item = Snapshot>) -> Self {
        let mut registry = Self::new();
        for snapshot in snapshots {
            registry.add(snapshot);
        }
        registry
    }

    /// Append a snapshot. Returns false (and drops it) if its path is
    /// already registered.
    pub fn add(&mut self, snapshot: Snapshot) -> bool {
        let key = path_key(snapshot.full_path());
        if self.by_path.contains_key(&key) {
            return false;
        }
        self.by_path.insert(key, self.entries.len());
        self.entries.push(snapshot);
        self.labels = None;
        true
    }

    /// Remove by identity
    pub fn remove(&mut self, id: SnapshotId) -> Option<Snapshot> {
        let index = self.entries.iter().position(|s| s.id() == id)?;
        let removed = self.entries.remove(index);
        self.reindex();
        self.labels = None;
        Some(removed)
    }

    /// Remove everything. The name table is cleared separately by its owner.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_path.clear();
        self.labels = None;
    }

    fn reindex(&mut self) {
        self.by_path = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, s)| (path_key(s.full_path()), i))
            .collect();
    }

    pub fn get(&self, id: SnapshotId) -> Option<&Snapshot> {
        self.entries.iter().find(|s| s.id() == id)
    }

    /// Case-insensitive exact match on the absolute path
    pub fn find_by_absolute_path(&self, path: &Path) -> Option<&Snapshot> {
        if path.as_os_str().is_empty() {
            return None;
        }
        self.by_path
            .get(&path_key(path))
            .and_then(|&i| self.entries.get(i))
    }

    /// Exact match on the display label
    pub fn find_by_display_label(&self, names: &Disambiguator, label: &str) -> Option<&Snapshot> {
        if label.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|s| names.label(s.id()) == Some(label))
    }

    /// Labels of all snapshots in registry order, for a selection control
    pub fn all_display_labels(&mut self, names: &Disambiguator) -> &[String] {
        let stale = !matches!(&self.labels, Some((generation, _)) if *generation == names.generation());
        if stale {
            let labels = self.entries.iter().map(|s| s.display_label(names)).collect();
            self.labels = Some((names.generation(), labels));
        }
        match &self.labels {
            Some((_, labels)) => labels,
            None => &[],
        }
    }

    /// The project-associated snapshot, if one is registered
    pub fn project_snapshot(&self) -> Option<&Snapshot> {
        self.entries.iter().find(|s| s.is_project())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
