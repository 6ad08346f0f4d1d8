//! Mount table with longest-prefix routing and a resolution cache.
//!
//! Routing priority at the same path: skill mounts first, then the
//! memory/search virtual mounts, then local mounts. Within a class the
//! longest mountpoint wins; ties cannot occur because mountpoints are
//! unique.

mod cache;

pub use cache::ResolveCache;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::local::LocalBackend;
use crate::{path, Error, Result};

/// The backend class a mount routes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MountKind {
    Local,
    Memory,
    Search,
    Skill,
}

/// What a mount binds: the backing handle for each [`MountKind`].
#[derive(Clone)]
pub enum MountTarget {
    /// A host directory served by a [`LocalBackend`].
    Local(Arc<LocalBackend>),
    /// The singleton in-process record store.
    Memory,
    /// The singleton read-only search backend.
    Search,
    /// A registered skill, by name.
    Skill(String),
}

impl MountTarget {
    pub fn kind(&self) -> MountKind {
        match self {
            MountTarget::Local(_) => MountKind::Local,
            MountTarget::Memory => MountKind::Memory,
            MountTarget::Search => MountKind::Search,
            MountTarget::Skill(_) => MountKind::Skill,
        }
    }
}

impl std::fmt::Debug for MountTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountTarget::Local(backend) => f.debug_tuple("Local").field(&backend.root()).finish(),
            MountTarget::Memory => f.write_str("Memory"),
            MountTarget::Search => f.write_str("Search"),
            MountTarget::Skill(name) => f.debug_tuple("Skill").field(name).finish(),
        }
    }
}

/// One mount: a virtual prefix bound to a backend.
#[derive(Debug)]
pub struct MountBinding {
    pub mountpoint: String,
    pub target: MountTarget,
    pub readonly: bool,
}

impl MountBinding {
    pub fn kind(&self) -> MountKind {
        self.target.kind()
    }
}

/// A successful resolution: the binding plus the path relative to it.
pub type Resolved = (Arc<MountBinding>, String);

/// Ordered set of mount bindings keyed by mountpoint.
///
/// Lookups take the shared lock, mutations the exclusive one; no lock is
/// ever held across an await point.
#[derive(Debug, Default)]
pub struct MountTable {
    mounts: RwLock<BTreeMap<String, Arc<MountBinding>>>,
}

/// Routing rank; lower routes first when prefixes overlap.
fn kind_rank(kind: MountKind) -> u8 {
    match kind {
        MountKind::Skill => 0,
        MountKind::Memory | MountKind::Search => 1,
        MountKind::Local => 2,
    }
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a binding. The mountpoint must be canonical, absolute and
    /// unoccupied.
    pub fn mount(&self, binding: MountBinding) -> Result<Arc<MountBinding>> {
        if !binding.mountpoint.starts_with('/') {
            return Err(Error::InvalidArgument(format!(
                "mountpoint must be absolute, got {:?}",
                binding.mountpoint
            )));
        }
        let mut mounts = self.mounts.write().expect("mount table poisoned");
        if mounts.contains_key(&binding.mountpoint) {
            return Err(Error::Conflict(format!(
                "mountpoint {} is already bound",
                binding.mountpoint
            )));
        }
        let binding = Arc::new(binding);
        mounts.insert(binding.mountpoint.clone(), Arc::clone(&binding));
        Ok(binding)
    }

    /// The binding at exactly `mountpoint`, if any.
    pub fn get(&self, mountpoint: &str) -> Option<Arc<MountBinding>> {
        self.mounts.read().expect("mount table poisoned").get(mountpoint).cloned()
    }

    /// Remove the binding at `mountpoint`, returning it.
    pub fn unmount(&self, mountpoint: &str) -> Result<Arc<MountBinding>> {
        self.mounts
            .write()
            .expect("mount table poisoned")
            .remove(mountpoint)
            .ok_or_else(|| Error::NotFound(format!("no mount at {mountpoint}")))
    }

    /// Resolve a canonical path to its binding and relative path.
    pub fn resolve(&self, canonical: &str) -> Result<Resolved> {
        let mounts = self.mounts.read().expect("mount table poisoned");
        let mut best: Option<&Arc<MountBinding>> = None;
        for binding in mounts.values() {
            if !path::is_path_prefix(&binding.mountpoint, canonical) {
                continue;
            }
            let better = match best {
                None => true,
                Some(current) => {
                    let (rank, len) = (kind_rank(binding.kind()), binding.mountpoint.len());
                    let (cur_rank, cur_len) =
                        (kind_rank(current.kind()), current.mountpoint.len());
                    rank < cur_rank || (rank == cur_rank && len > cur_len)
                }
            };
            if better {
                best = Some(binding);
            }
        }
        let binding =
            best.ok_or_else(|| Error::NotFound(format!("no mount serves {canonical}")))?;
        let rel = path::relative_to(&binding.mountpoint, canonical);
        Ok((Arc::clone(binding), rel))
    }

    /// Snapshot of every binding, ordered by mountpoint.
    pub fn list(&self) -> Vec<Arc<MountBinding>> {
        self.mounts.read().expect("mount table poisoned").values().cloned().collect()
    }

    /// The writable local mounts, the set the snapshot engine tracks.
    pub fn writable_local(&self) -> Vec<Arc<MountBinding>> {
        self.list()
            .into_iter()
            .filter(|b| b.kind() == MountKind::Local && !b.readonly)
            .collect()
    }

    /// The local mount whose prefix covers `canonical`, if any.
    pub fn local_for(&self, canonical: &str) -> Option<Resolved> {
        self.list()
            .into_iter()
            .filter(|b| {
                b.kind() == MountKind::Local && path::is_path_prefix(&b.mountpoint, canonical)
            })
            .max_by_key(|b| b.mountpoint.len())
            .map(|b| {
                let rel = path::relative_to(&b.mountpoint, canonical);
                (b, rel)
            })
    }
}

#[cfg(test)]
mod tests;
