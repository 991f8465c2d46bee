//! Unique display labels for snapshots
//!
//! Label computation must observe a frozen membership, so the name table has
//! two phases:
//! - [`NameBuilder`]: plain snapshots register here while a scan is running
//! - [`Disambiguator`]: sealed; answers label queries
//!
//! Plain snapshots cannot join a sealed table at all. The single
//! project-associated snapshot may be attached or detached in either phase,
//! and every such change recomputes all labels of the sealed table.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::snapshot::entity::{path_key, Snapshot, SnapshotId, SnapshotKind};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Paths whose snapshots are labelled as auto-saved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservedPaths {
    /// File the host auto-saves the live configuration to
    pub auto_save: PathBuf,
    /// Previous generation of the auto-saved file
    pub previous_auto_save: PathBuf,
    /// Snapshot exported the first time the switcher ran
    pub first_run: PathBuf,
}

impl ReservedPaths {
    pub fn new(auto_save: PathBuf, previous_auto_save: PathBuf, first_run: PathBuf) -> Self {
        Self {
            auto_save,
            previous_auto_save,
            first_run,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        let key = path_key(path);
        [&self.auto_save, &self.previous_auto_save, &self.first_run]
            .iter()
            .any(|reserved| path_key(reserved) == key)
    }
}

/// Label templates in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelTemplate {
    /// `auto-saved(<name>)`
    AutoSaved,
    /// `<name> (<relative dir>)`
    Relative,
    /// `<name> [<tag>]`
    Special,
    /// `<name>`
    Default,
}

/// Naming data copied out of a snapshot. The table never owns snapshots.
#[derive(Debug, Clone)]
struct Member {
    id: SnapshotId,
    name: String,
    name_key: String,
    dir: String,
    tag: Option<&'static str>,
    reserved: bool,
}

impl Member {
    fn new(snapshot: &Snapshot, reserved: &ReservedPaths) -> Self {
        let dir = snapshot
            .relative_path()
            .parent()
            .map(|p| {
                p.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| ".".to_string());

        Self {
            id: snapshot.id(),
            name: snapshot.base_name().to_string(),
            name_key: snapshot.base_name().to_lowercase(),
            dir,
            tag: snapshot.special_tag(),
            reserved: reserved.contains(snapshot.full_path()),
        }
    }

    fn template<'a>(&self, members: impl IntoIterator<Item = &'a Member>) -> LabelTemplate {
        if self.reserved {
            LabelTemplate::AutoSaved
        } else if members
            .into_iter()
            .any(|other| other.id != self.id && other.name_key == self.name_key)
        {
            LabelTemplate::Relative
        } else if self.tag.is_some() {
            LabelTemplate::Special
        } else {
            LabelTemplate::Default
        }
    }

    fn render(&self, template: LabelTemplate) -> String {
        match template {
            LabelTemplate::AutoSaved => format!("auto-saved({})", self.name),
            LabelTemplate::Relative => format!("{} ({})", self.name, self.dir),
            LabelTemplate::Special => format!("{} [{}]", self.name, self.tag.unwrap_or_default()),
            LabelTemplate::Default => self.name.clone(),
        }
    }
}

/// Attaching the project snapshot is allowed in both phases
pub trait ProjectMembership {
    /// Replace any previously attached project snapshot
    fn attach_project(&mut self, snapshot: &Snapshot);
    /// Returns true if the given snapshot was the attached project snapshot
    fn detach_project(&mut self, id: SnapshotId) -> bool;
}

/// Building phase of the name table
#[derive(Debug)]
pub struct NameBuilder {
    reserved: ReservedPaths,
    plain: Vec<Member>,
    project: Option<Member>,
}

impl NameBuilder {
    pub fn new(reserved: ReservedPaths) -> Self {
        Self {
            reserved,
            plain: Vec::new(),
            project: None,
        }
    }

    /// Register a plain snapshot (called by [`Snapshot::plain`])
    pub(crate) fn register(&mut self, snapshot: &Snapshot) {
        debug_assert_eq!(snapshot.kind(), SnapshotKind::Plain);
        self.plain.push(Member::new(snapshot, &self.reserved));
    }

    /// Drop a plain snapshot that will not make it into the registry
    pub fn remove(&mut self, id: SnapshotId) -> bool {
        let before = self.plain.len();
        self.plain.retain(|m| m.id != id);
        before != self.plain.len()
    }

    pub fn len(&self) -> usize {
        self.plain.len() + usize::from(self.project.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze membership and compute every label
    pub fn seal(self) -> Disambiguator {
        let mut sealed = Disambiguator {
            reserved: self.reserved,
            plain: self.plain,
            project: self.project,
            labels: HashMap::new(),
            generation: 0,
        };
        sealed.relabel();
        sealed
    }
}

impl ProjectMembership for NameBuilder {
    fn attach_project(&mut self, snapshot: &Snapshot) {
        debug_assert_eq!(snapshot.kind(), SnapshotKind::Project);
        self.project = Some(Member::new(snapshot, &self.reserved));
    }

    fn detach_project(&mut self, id: SnapshotId) -> bool {
        if self.project.as_ref().is_some_and(|m| m.id == id) {
            self.project = None;
            true
        } else {
            false
        }
    }
}

/// Sealed name table: frozen plain membership plus the project slot
#[derive(Debug)]
pub struct Disambiguator {
    reserved: ReservedPaths,
    plain: Vec<Member>,
    project: Option<Member>,
    labels: HashMap<SnapshotId, String>,
    generation: u64,
}

impl Disambiguator {
    /// An empty sealed table
    pub fn empty(reserved: ReservedPaths) -> Self {
        NameBuilder::new(reserved).seal()
    }

    /// Discard all membership and start a new building phase
    pub fn reopen(self) -> NameBuilder {
        NameBuilder::new(self.reserved)
    }

    pub fn reserved(&self) -> &ReservedPaths {
        &self.reserved
    }

    pub fn label(&self, id: SnapshotId) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    /// Which template produced the label of `id`
    pub fn template(&self, id: SnapshotId) -> Option<LabelTemplate> {
        let member = self.members().find(|m| m.id == id)?;
        Some(member.template(self.members()))
    }

    /// Changes whenever any label may have changed
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn members(&self) -> impl Iterator<Item = &Member> {
        self.plain.iter().chain(self.project.iter())
    }

    fn relabel(&mut self) {
        let mut taken = HashSet::new();
        let mut labels = HashMap::with_capacity(self.plain.len() + 1);

        for member in self.members() {
            let base = member.render(member.template(self.members()));
            let mut label = base.clone();
            let mut suffix = 2;
            while !taken.insert(label.clone()) {
                label = format!("{} #{}", base, suffix);
                suffix += 1;
            }
            labels.insert(member.id, label);
        }

        self.labels = labels;
        self.generation = next_generation();
    }
}

impl ProjectMembership for Disambiguator {
    fn attach_project(&mut self, snapshot: &Snapshot) {
        debug_assert_eq!(snapshot.kind(), SnapshotKind::Project);
        self.project = Some(Member::new(snapshot, &self.reserved));
        self.relabel();
    }

    fn detach_project(&mut self, id: SnapshotId) -> bool {
        if self.project.as_ref().is_some_and(|m| m.id == id) {
            self.project = None;
            self.relabel();
            true
        } else {
            false
        }
    }
}
