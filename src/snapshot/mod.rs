//! Copy-on-write snapshots of the writable local mounts.
//!
//! A snapshot stores only entries that differ from its base chain; restore
//! rebuilds the effective file set by walking bases before the target so
//! the target's own entries override inherited ones. Memory and search
//! mounts are outside snapshot scope.

mod types;

pub use types::{ChangeOp, ChangeRecord, FileSnapshot, Snapshot, SnapshotMeta, SnapshotOp};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use filetime::FileTime;
use tokio::fs;
use tracing::debug;

use crate::mount::{MountBinding, MountTarget};
use crate::{path, Error, Result};

/// External backend shadowing each snapshot operation.
///
/// The hook runs before the in-memory operation; a hook failure propagates
/// and the in-memory operation is skipped.
#[async_trait]
pub trait SnapshotHook: Send + Sync {
    async fn create(&self, name: &str) -> Result<()>;
    async fn restore(&self, name: &str) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
    async fn list(&self) -> Result<()>;
}

/// Name and statistics of one stored snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub name: String,
    pub meta: SnapshotMeta,
}

#[derive(Default)]
struct EngineInner {
    snapshots: HashMap<String, Arc<Snapshot>>,
    current: Option<String>,
}

/// Creates, restores and tracks snapshots over a set of local mounts.
pub struct SnapshotEngine {
    inner: RwLock<EngineInner>,
    hook: Option<Arc<dyn SnapshotHook>>,
}

impl Default for SnapshotEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// One on-disk entry discovered while walking a mount.
struct DiskEntry {
    vpath: String,
    host: PathBuf,
    is_dir: bool,
    size: u64,
    mod_time: std::time::SystemTime,
}

impl SnapshotEngine {
    pub fn new() -> Self {
        Self { inner: RwLock::new(EngineInner::default()), hook: None }
    }

    /// Attach an external hook shadowing every operation.
    pub fn with_hook(mut self, hook: Arc<dyn SnapshotHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Name of the snapshot changes are currently tracked against.
    pub fn current_name(&self) -> Option<String> {
        self.inner.read().expect("snapshot engine poisoned").current.clone()
    }

    pub fn get(&self, name: &str) -> Result<Arc<Snapshot>> {
        self.inner
            .read()
            .expect("snapshot engine poisoned")
            .snapshots
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("snapshot {name}")))
    }

    /// Capture the current state of `mounts` as snapshot `name`, using the
    /// current snapshot (if any) as the copy-on-write base.
    pub async fn create(
        &self,
        name: &str,
        mounts: &[Arc<MountBinding>],
    ) -> Result<Arc<Snapshot>> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("snapshot name must not be empty".to_owned()));
        }
        let base = {
            let inner = self.inner.read().expect("snapshot engine poisoned");
            if inner.snapshots.contains_key(name) {
                return Err(Error::DuplicateName(format!("snapshot {name} already exists")));
            }
            inner.current.as_ref().and_then(|cur| inner.snapshots.get(cur).cloned())
        };

        if let Some(hook) = &self.hook {
            hook.create(name).await?;
        }

        let inherited = base.as_ref().map(effective_files).unwrap_or_default();
        let mut files: HashMap<String, FileSnapshot> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::new();

        for binding in mounts {
            for entry in walk_mount(binding).await? {
                seen.insert(entry.vpath.clone());
                if entry.is_dir {
                    if !inherited.contains_key(&entry.vpath) {
                        files.insert(
                            entry.vpath.clone(),
                            FileSnapshot {
                                path: entry.vpath,
                                content: Vec::new(),
                                size: 0,
                                mod_time: entry.mod_time,
                                is_dir: true,
                                op: SnapshotOp::Created,
                            },
                        );
                    }
                    continue;
                }

                let previous = inherited.get(&entry.vpath).filter(|p| !p.is_dir);
                let op = match previous {
                    None => SnapshotOp::Created,
                    Some(prev) => {
                        if prev.mod_time == entry.mod_time && prev.size == entry.size {
                            continue;
                        }
                        let content = fs::read(&entry.host)
                            .await
                            .map_err(|e| Error::from_io(e, &entry.vpath))?;
                        if content == prev.content {
                            continue;
                        }
                        files.insert(
                            entry.vpath.clone(),
                            FileSnapshot {
                                path: entry.vpath,
                                size: content.len() as u64,
                                content,
                                mod_time: entry.mod_time,
                                is_dir: false,
                                op: SnapshotOp::Modified,
                            },
                        );
                        continue;
                    }
                };

                let content =
                    fs::read(&entry.host).await.map_err(|e| Error::from_io(e, &entry.vpath))?;
                files.insert(
                    entry.vpath.clone(),
                    FileSnapshot {
                        path: entry.vpath,
                        size: content.len() as u64,
                        content,
                        mod_time: entry.mod_time,
                        is_dir: false,
                        op,
                    },
                );
            }
        }

        // Inherited files that vanished from disk become deletion markers so
        // restore does not resurrect them from the base chain.
        for (vpath, prev) in &inherited {
            if prev.is_dir || seen.contains(vpath.as_str()) {
                continue;
            }
            if !mounts.iter().any(|b| path::is_path_prefix(&b.mountpoint, vpath)) {
                continue;
            }
            files.insert(
                vpath.clone(),
                FileSnapshot {
                    path: vpath.clone(),
                    content: Vec::new(),
                    size: 0,
                    mod_time: prev.mod_time,
                    is_dir: false,
                    op: SnapshotOp::Deleted,
                },
            );
        }

        let meta = SnapshotMeta {
            created_at: Utc::now(),
            size: files
                .values()
                .filter(|f| !f.is_dir && f.op != SnapshotOp::Deleted)
                .map(|f| f.size)
                .sum(),
            file_count: files
                .values()
                .filter(|f| !f.is_dir && f.op != SnapshotOp::Deleted)
                .count(),
        };
        let snapshot = Arc::new(Snapshot::new(name.to_owned(), meta, files, base));

        let mut inner = self.inner.write().expect("snapshot engine poisoned");
        if inner.snapshots.contains_key(name) {
            return Err(Error::DuplicateName(format!("snapshot {name} already exists")));
        }
        inner.snapshots.insert(name.to_owned(), Arc::clone(&snapshot));
        inner.current = Some(name.to_owned());
        debug!(snapshot = %name, files = snapshot.files().len(), "snapshot created");
        Ok(snapshot)
    }

    /// Restore the filesystem to the state captured by snapshot `name`.
    ///
    /// Restore is best-effort file-by-file: the first failure aborts and
    /// leaves the host partially restored. Files on disk that the target's
    /// effective set does not contain are deleted.
    pub async fn restore(&self, name: &str, mounts: &[Arc<MountBinding>]) -> Result<()> {
        let target = self.get(name)?;

        if let Some(hook) = &self.hook {
            hook.restore(name).await?;
        }

        let effective = effective_files(&target);

        for binding in mounts {
            for entry in walk_mount(binding).await? {
                if entry.is_dir {
                    continue;
                }
                if !effective.contains_key(&entry.vpath) {
                    fs::remove_file(&entry.host)
                        .await
                        .map_err(|e| Error::from_io(e, &entry.vpath))?;
                }
            }
        }

        for (vpath, file) in &effective {
            let Some(host) = host_path(mounts, vpath) else {
                continue;
            };
            if file.is_dir {
                fs::create_dir_all(&host).await.map_err(|e| Error::from_io(e, vpath))?;
                continue;
            }
            if let Some(parent) = host.parent() {
                fs::create_dir_all(parent).await.map_err(|e| Error::from_io(e, vpath))?;
            }
            fs::write(&host, &file.content).await.map_err(|e| Error::from_io(e, vpath))?;
            filetime::set_file_mtime(&host, FileTime::from_system_time(file.mod_time))
                .map_err(|e| Error::from_io(e, vpath))?;
        }

        self.inner.write().expect("snapshot engine poisoned").current = Some(name.to_owned());
        debug!(snapshot = %name, "snapshot restored");
        Ok(())
    }

    /// Delete snapshot `name`. The current snapshot cannot be deleted.
    pub async fn delete(&self, name: &str) -> Result<()> {
        {
            let inner = self.inner.read().expect("snapshot engine poisoned");
            if !inner.snapshots.contains_key(name) {
                return Err(Error::NotFound(format!("snapshot {name}")));
            }
            if inner.current.as_deref() == Some(name) {
                return Err(Error::Conflict(format!(
                    "snapshot {name} is current and cannot be deleted"
                )));
            }
        }
        if let Some(hook) = &self.hook {
            hook.delete(name).await?;
        }
        self.inner.write().expect("snapshot engine poisoned").snapshots.remove(name);
        Ok(())
    }

    /// All stored snapshots, oldest first.
    pub async fn list(&self) -> Result<Vec<SnapshotInfo>> {
        if let Some(hook) = &self.hook {
            hook.list().await?;
        }
        let inner = self.inner.read().expect("snapshot engine poisoned");
        let mut infos: Vec<SnapshotInfo> = inner
            .snapshots
            .values()
            .map(|s| SnapshotInfo { name: s.name().to_owned(), meta: s.meta().clone() })
            .collect();
        infos.sort_by(|a, b| a.meta.created_at.cmp(&b.meta.created_at));
        Ok(infos)
    }

    /// The change log of snapshot `name`.
    pub fn changes(&self, name: &str) -> Result<Vec<ChangeRecord>> {
        Ok(self.get(name)?.changes())
    }

    /// Append a change record to the current snapshot, if one exists.
    pub fn track_change(&self, vpath: &str, op: ChangeOp, session_id: Option<&str>) {
        let current = {
            let inner = self.inner.read().expect("snapshot engine poisoned");
            inner.current.as_ref().and_then(|cur| inner.snapshots.get(cur).cloned())
        };
        if let Some(snapshot) = current {
            snapshot.append_change(ChangeRecord {
                path: vpath.to_owned(),
                op,
                timestamp: Utc::now(),
                session_id: session_id.map(str::to_owned),
            });
        }
    }
}

impl std::fmt::Debug for SnapshotEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("snapshot engine poisoned");
        f.debug_struct("SnapshotEngine")
            .field("snapshots", &inner.snapshots.len())
            .field("current", &inner.current)
            .finish_non_exhaustive()
    }
}

/// Flatten a snapshot's base chain into its effective file set.
///
/// Bases are applied root-of-chain first so entries from snapshots nearer
/// the target override inherited ones; deletion markers drop out last.
fn effective_files(target: &Arc<Snapshot>) -> HashMap<String, FileSnapshot> {
    let mut chain = Vec::new();
    let mut cursor = Some(Arc::clone(target));
    while let Some(snapshot) = cursor {
        cursor = snapshot.base().cloned();
        chain.push(snapshot);
    }

    let mut effective = HashMap::new();
    for snapshot in chain.iter().rev() {
        for (vpath, file) in snapshot.files() {
            effective.insert(vpath.clone(), file.clone());
        }
    }
    effective.retain(|_, file| file.op != SnapshotOp::Deleted);
    effective
}

/// Resolve a virtual path back to its host path via the mount set.
fn host_path(mounts: &[Arc<MountBinding>], vpath: &str) -> Option<PathBuf> {
    let binding = mounts
        .iter()
        .filter(|b| path::is_path_prefix(&b.mountpoint, vpath))
        .max_by_key(|b| b.mountpoint.len())?;
    let MountTarget::Local(backend) = &binding.target else {
        return None;
    };
    let rel = path::relative_to(&binding.mountpoint, vpath);
    Some(if rel.is_empty() { backend.root().to_path_buf() } else { backend.root().join(rel) })
}

/// Enumerate every entry under a local mount, depth first.
async fn walk_mount(binding: &Arc<MountBinding>) -> Result<Vec<DiskEntry>> {
    let MountTarget::Local(backend) = &binding.target else {
        return Err(Error::InvalidArgument(format!(
            "mount {} is not local and cannot be snapshotted",
            binding.mountpoint
        )));
    };

    let mut entries = Vec::new();
    let mut stack = vec![(backend.root().to_path_buf(), binding.mountpoint.clone())];
    while let Some((dir, vdir)) = stack.pop() {
        let mut reader =
            fs::read_dir(&dir).await.map_err(|e| Error::from_io(e, &vdir))?;
        while let Some(entry) = reader.next_entry().await.map_err(|e| Error::from_io(e, &vdir))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let vpath = format!("{vdir}/{name}");
            let meta = entry.metadata().await.map_err(|e| Error::from_io(e, &vpath))?;
            let mod_time = meta.modified().map_err(|e| Error::from_io(e, &vpath))?;
            if meta.is_dir() {
                stack.push((entry.path(), vpath.clone()));
                entries.push(DiskEntry {
                    vpath,
                    host: entry.path(),
                    is_dir: true,
                    size: 0,
                    mod_time,
                });
            } else {
                entries.push(DiskEntry {
                    vpath,
                    host: entry.path(),
                    is_dir: false,
                    size: meta.len(),
                    mod_time,
                });
            }
        }
    }
    Ok(entries)
}
