//! The router facade: one POSIX-like namespace over every backend.
//!
//! Every public operation follows the same spine: session ACL check, path
//! normalization, mount resolution through the cache, the backend-specific
//! handler, snapshot change tracking for tracked mutations, and exactly
//! one audit record per session-scoped call.

use std::path::Path;
use std::sync::Arc;

use crate::audit::{AuditOperation, AuditRecord, AuditSink, TracingAuditSink};
use crate::backend::{Backend as _, EntryStat};
use crate::config::Config;
use crate::local::LocalBackend;
use crate::memory::MemoryStore;
use crate::mount::{MountBinding, MountKind, MountTable, MountTarget, ResolveCache, Resolved};
use crate::search::{KeywordIndex, SearchBackend, SearchIndex};
use crate::session::{CommandPolicy, CommandRunner, DangerousCommandPolicy, Session, SessionRegistry};
use crate::skill::{
    LoadOptions, ManagedSkill, Skill, SkillContext, SkillDispatcher, SkillManager, SkillRegistry,
    SkillRequest, SkillResponse,
};
use crate::snapshot::{ChangeOp, ChangeRecord, Snapshot, SnapshotEngine, SnapshotHook, SnapshotInfo};
use crate::{path, Error, Result};

/// The virtual filesystem router.
///
/// Owns the mount table, resolution cache, backends, registries and the
/// snapshot engine. All operations are safe for concurrent use from
/// arbitrary tasks.
pub struct ToolFs {
    config: Config,
    mounts: MountTable,
    cache: ResolveCache,
    memory: Arc<MemoryStore>,
    search: Arc<SearchBackend>,
    search_index: Arc<dyn SearchIndex>,
    registry: Arc<SkillRegistry>,
    manager: Arc<SkillManager>,
    dispatcher: SkillDispatcher,
    sessions: SessionRegistry,
    snapshots: SnapshotEngine,
    default_command_policy: Arc<dyn CommandPolicy>,
    command_runner: Option<Arc<dyn CommandRunner>>,
}

impl ToolFs {
    /// A router with the stock keyword search index.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_index(config, Arc::new(KeywordIndex::new()))
    }

    /// A router ranking `rag` queries with the supplied index.
    pub fn with_index(config: Config, index: Arc<dyn SearchIndex>) -> Result<Self> {
        let mounts = MountTable::new();
        mounts.mount(MountBinding {
            mountpoint: config.memory_mountpoint(),
            target: MountTarget::Memory,
            readonly: false,
        })?;
        mounts.mount(MountBinding {
            mountpoint: config.search_mountpoint(),
            target: MountTarget::Search,
            readonly: true,
        })?;

        let registry = Arc::new(SkillRegistry::new());
        let manager = Arc::new(SkillManager::new(
            Arc::clone(&registry),
            config.skill_timeout(),
            &config.root,
        ));
        let cache = ResolveCache::new(config.resolve_cache_capacity);

        Ok(Self {
            config,
            memory: Arc::new(MemoryStore::new()),
            search: Arc::new(SearchBackend::new(Arc::clone(&index))),
            search_index: index,
            dispatcher: SkillDispatcher::new(Arc::clone(&manager)),
            registry,
            manager,
            mounts,
            cache,
            sessions: SessionRegistry::new(),
            snapshots: SnapshotEngine::new(),
            default_command_policy: Arc::new(DangerousCommandPolicy::new()),
            command_runner: None,
        })
    }

    /// Shadow every snapshot operation with an external hook.
    pub fn with_snapshot_hook(mut self, hook: Arc<dyn SnapshotHook>) -> Self {
        self.snapshots = SnapshotEngine::new().with_hook(hook);
        self
    }

    /// Let `execute_command` hand validated commands to `runner`.
    pub fn with_command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.command_runner = Some(runner);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The in-process record store behind `<root>/memory`.
    pub fn memory_store(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// The index behind `<root>/rag`.
    pub fn search_index(&self) -> &Arc<dyn SearchIndex> {
        &self.search_index
    }

    pub fn skill_manager(&self) -> &Arc<SkillManager> {
        &self.manager
    }

    pub fn skill_registry(&self) -> &Arc<SkillRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Filesystem operations
    // ------------------------------------------------------------------

    /// Read the entry at `path` as raw bytes.
    pub async fn read_file(&self, path: &str, session: Option<&str>) -> Result<Vec<u8>> {
        let vpath = self.absolute(path);
        let session = self.session_for(session)?;
        if let Some(denied) = self.check_acl(&session, AuditOperation::ReadFile, &vpath) {
            return Err(denied);
        }

        let result = self.read_resolved(&vpath, id_of(&session)).await;
        let bytes_read = result.as_ref().ok().map(|b| b.len() as u64);
        self.emit(&session, AuditOperation::ReadFile, &vpath, &result, bytes_read, None);
        result
    }

    /// Write `data` at `path`, creating missing parents on local mounts.
    pub async fn write_file(&self, path: &str, data: &[u8], session: Option<&str>) -> Result<()> {
        let vpath = self.absolute(path);
        let session = self.session_for(session)?;
        if let Some(denied) = self.check_acl(&session, AuditOperation::WriteFile, &vpath) {
            return Err(denied);
        }

        let result = self.write_resolved(&vpath, data, id_of(&session)).await;
        let written = result.as_ref().ok().map(|_| data.len() as u64);
        self.emit(&session, AuditOperation::WriteFile, &vpath, &result, None, written);
        result
    }

    /// List the names under `path`.
    pub async fn list_dir(&self, path: &str, session: Option<&str>) -> Result<Vec<String>> {
        let vpath = self.absolute(path);
        let session = self.session_for(session)?;
        if let Some(denied) = self.check_acl(&session, AuditOperation::ListDir, &vpath) {
            return Err(denied);
        }

        let result = self.list_resolved(&vpath, id_of(&session)).await;
        self.emit(&session, AuditOperation::ListDir, &vpath, &result, None, None);
        result
    }

    /// Stat the entry at `path`.
    pub async fn stat(&self, path: &str, session: Option<&str>) -> Result<EntryStat> {
        let vpath = self.absolute(path);
        let session = self.session_for(session)?;
        if let Some(denied) = self.check_acl(&session, AuditOperation::Stat, &vpath) {
            return Err(denied);
        }

        let result = self.stat_resolved(&vpath).await;
        self.emit(&session, AuditOperation::Stat, &vpath, &result, None, None);
        result
    }

    /// Remove the entry at `path`. Audited as a write.
    pub async fn remove_file(&self, path: &str, session: Option<&str>) -> Result<()> {
        let vpath = self.absolute(path);
        let session = self.session_for(session)?;
        if let Some(denied) = self.check_acl(&session, AuditOperation::WriteFile, &vpath) {
            return Err(denied);
        }

        let result = self.remove_resolved(&vpath, id_of(&session)).await;
        self.emit(&session, AuditOperation::WriteFile, &vpath, &result, None, None);
        result
    }

    // ------------------------------------------------------------------
    // Mount management
    // ------------------------------------------------------------------

    /// Bind `host_dir` at the virtual prefix `mount`.
    pub fn mount_local(&self, mount: &str, host_dir: &Path, readonly: bool) -> Result<()> {
        let mountpoint = self.absolute(mount);
        let backend = LocalBackend::new(host_dir)?;
        self.mounts.mount(MountBinding {
            mountpoint,
            target: MountTarget::Local(Arc::new(backend)),
            readonly,
        })?;
        self.cache.flush();
        Ok(())
    }

    /// Remove the local mount at `mount`.
    pub fn unmount_local(&self, mount: &str) -> Result<()> {
        let mountpoint = self.absolute(mount);
        match self.mounts.get(&mountpoint) {
            Some(binding) if binding.kind() == MountKind::Local => {
                self.mounts.unmount(&mountpoint)?;
                self.cache.flush();
                Ok(())
            }
            Some(_) => {
                Err(Error::InvalidOperation(format!("{mountpoint} is not a local mount")))
            }
            None => Err(Error::NotFound(format!("no mount at {mountpoint}"))),
        }
    }

    /// Route the virtual prefix `mount` through the registered skill
    /// `skill_name`. Skill mounts take priority over other kinds at the
    /// same prefix.
    pub fn mount_skill(&self, mount: &str, skill_name: &str) -> Result<()> {
        let mountpoint = self.absolute(mount);
        self.registry.get(skill_name)?;
        self.mounts.mount(MountBinding {
            mountpoint: mountpoint.clone(),
            target: MountTarget::Skill(skill_name.to_owned()),
            readonly: false,
        })?;
        if let Err(err) = self.registry.bind_mount(&mountpoint, skill_name) {
            self.mounts.unmount(&mountpoint).ok();
            return Err(err);
        }
        self.cache.flush();
        Ok(())
    }

    /// Remove the skill mount at `mount`.
    pub fn unmount_skill(&self, mount: &str) -> Result<()> {
        let mountpoint = self.absolute(mount);
        match self.mounts.get(&mountpoint) {
            Some(binding) if binding.kind() == MountKind::Skill => {
                self.mounts.unmount(&mountpoint)?;
                self.registry.unbind_mount(&mountpoint).ok();
                self.cache.flush();
                Ok(())
            }
            Some(_) => {
                Err(Error::InvalidOperation(format!("{mountpoint} is not a skill mount")))
            }
            None => Err(Error::NotFound(format!("no mount at {mountpoint}"))),
        }
    }

    /// Every binding currently in the table.
    pub fn list_mounts(&self) -> Vec<Arc<MountBinding>> {
        self.mounts.list()
    }

    // ------------------------------------------------------------------
    // Skills
    // ------------------------------------------------------------------

    /// Load a skill with a context bound to the router's backends.
    pub async fn load_skill(&self, skill: Skill, options: LoadOptions) -> Result<Arc<ManagedSkill>> {
        let context = SkillContext::new(&skill.name)
            .with_memory(Arc::clone(&self.memory))
            .with_search(Arc::clone(&self.search_index));
        self.manager.load(skill, context, options).await
    }

    /// Unload a skill and tear down any mounts routed through it.
    pub async fn unload_skill(&self, name: &str) -> Result<()> {
        self.manager.unload(name).await?;
        for binding in self.mounts.list() {
            if let MountTarget::Skill(bound) = &binding.target {
                if bound == name {
                    self.mounts.unmount(&binding.mountpoint).ok();
                }
            }
        }
        self.cache.flush();
        Ok(())
    }

    /// Execute a skill directly, outside any mount routing.
    pub async fn execute_skill(
        &self,
        name: &str,
        request: SkillRequest,
        session: Option<&str>,
    ) -> Result<SkillResponse> {
        let session = self.session_for(session)?;
        let audit_path = request.path.clone().unwrap_or_else(|| name.to_owned());

        let result = self.manager.execute(name, request).await;
        self.emit(&session, AuditOperation::SkillExecute, &audit_path, &result, None, None);
        result
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Create a session auditing through the `tracing` sink.
    pub fn new_session(&self, id: &str, allowed: Vec<String>) -> Result<Arc<Session>> {
        self.sessions.create(id, allowed, Arc::new(TracingAuditSink), None)
    }

    /// Create a session with an explicit sink and command policy.
    pub fn new_session_with(
        &self,
        id: &str,
        allowed: Vec<String>,
        sink: Arc<dyn AuditSink>,
        command_policy: Option<Arc<dyn CommandPolicy>>,
    ) -> Result<Arc<Session>> {
        self.sessions.create(id, allowed, sink, command_policy)
    }

    pub fn get_session(&self, id: &str) -> Result<Arc<Session>> {
        self.sessions.get(id)
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        self.sessions.delete(id)
    }

    pub fn list_sessions(&self) -> Vec<String> {
        self.sessions.ids()
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Capture every writable local mount as snapshot `name`.
    pub async fn create_snapshot(&self, name: &str) -> Result<Arc<Snapshot>> {
        self.snapshots.create(name, &self.mounts.writable_local()).await
    }

    /// Restore the writable local mounts to the state of snapshot `name`.
    pub async fn rollback_snapshot(&self, name: &str) -> Result<()> {
        self.snapshots.restore(name, &self.mounts.writable_local()).await
    }

    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        self.snapshots.list().await
    }

    pub async fn delete_snapshot(&self, name: &str) -> Result<()> {
        self.snapshots.delete(name).await
    }

    /// The change log recorded while `name` was the current snapshot.
    pub fn snapshot_changes(&self, name: &str) -> Result<Vec<ChangeRecord>> {
        self.snapshots.changes(name)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Validate `command` against the session's policy (or the default
    /// dangerous-command policy) and hand it to the configured runner.
    pub async fn execute_command(
        &self,
        command: &str,
        args: &[String],
        session: Option<&str>,
    ) -> Result<Vec<u8>> {
        let session = self.session_for(session)?;
        let policy = session
            .as_ref()
            .and_then(|s| s.command_policy().cloned())
            .unwrap_or_else(|| Arc::clone(&self.default_command_policy));

        let result = match policy.validate(command, args) {
            Ok(()) => match &self.command_runner {
                Some(runner) => runner.run(command, args).await,
                None => Err(Error::InvalidOperation(
                    "no command runner is configured".to_owned(),
                )),
            },
            Err(err) => Err(err),
        };

        if let Some(s) = &session {
            let mut record = AuditRecord::new(AuditOperation::ExecuteCommand, &s.id, command);
            match &result {
                Ok(bytes) => record = record.success().bytes_read(bytes.len() as u64),
                Err(err) => {
                    record = record.failure(err);
                    record.access_denied = matches!(err, Error::AccessDenied(_));
                }
            }
            s.emit(record);
        }
        result
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Normalize `raw` and anchor it under the configured root.
    fn absolute(&self, raw: &str) -> String {
        let normalized = path::normalize(raw);
        if normalized.is_empty() || normalized == "/" {
            return self.config.root.clone();
        }
        if normalized.starts_with('/') {
            if path::is_path_prefix(&self.config.root, &normalized) {
                normalized
            } else {
                format!("{}{}", self.config.root, normalized)
            }
        } else {
            format!("{}/{}", self.config.root, normalized)
        }
    }

    fn session_for(&self, id: Option<&str>) -> Result<Option<Arc<Session>>> {
        match id {
            None => Ok(None),
            Some(id) => self.sessions.get(id).map(Some),
        }
    }

    /// ACL gate; on denial the audit record is emitted here and the caller
    /// returns immediately.
    fn check_acl(
        &self,
        session: &Option<Arc<Session>>,
        operation: AuditOperation,
        vpath: &str,
    ) -> Option<Error> {
        let session = session.as_ref()?;
        if session.is_path_allowed(vpath) {
            return None;
        }
        session.emit(AuditRecord::new(operation, &session.id, vpath).denied());
        Some(Error::AccessDenied(vpath.to_owned()))
    }

    fn emit<T>(
        &self,
        session: &Option<Arc<Session>>,
        operation: AuditOperation,
        vpath: &str,
        result: &Result<T>,
        bytes_read: Option<u64>,
        bytes_written: Option<u64>,
    ) {
        let Some(session) = session else { return };
        let mut record = AuditRecord::new(operation, &session.id, vpath);
        match result {
            Ok(_) => {
                record = record.success();
                if let Some(n) = bytes_read {
                    record = record.bytes_read(n);
                }
                if let Some(n) = bytes_written {
                    record = record.bytes_written(n);
                }
            }
            Err(err) => record = record.failure(err),
        }
        session.emit(record);
    }

    fn resolve_cached(&self, canonical: &str) -> Result<Resolved> {
        if let Some(hit) = self.cache.get(canonical) {
            return Ok(hit);
        }
        let resolved = self.mounts.resolve(canonical)?;
        self.cache.insert(canonical.to_owned(), resolved.clone());
        Ok(resolved)
    }

    async fn read_resolved(&self, vpath: &str, session_id: Option<&str>) -> Result<Vec<u8>> {
        let (binding, rel) = self.resolve_cached(vpath)?;
        match &binding.target {
            MountTarget::Local(backend) => backend.read(&rel).await,
            MountTarget::Memory => self.memory.read(&rel).await,
            MountTarget::Search => self.search.read(&rel).await,
            MountTarget::Skill(name) => {
                self.dispatcher.read_file(name, vpath, &rel, session_id).await
            }
        }
    }

    async fn write_resolved(
        &self,
        vpath: &str,
        data: &[u8],
        session_id: Option<&str>,
    ) -> Result<()> {
        let (binding, rel) = self.resolve_cached(vpath)?;
        if binding.readonly {
            return Err(Error::ReadOnly(vpath.to_owned()));
        }
        match &binding.target {
            MountTarget::Local(backend) => {
                let existed = backend.stat(&rel).await.is_ok();
                backend.write(&rel, data).await?;
                let op = if existed { ChangeOp::Write } else { ChangeOp::Create };
                self.snapshots.track_change(vpath, op, session_id);
                Ok(())
            }
            MountTarget::Memory => self.memory.write(&rel, data).await,
            MountTarget::Search => self.search.write(&rel, data).await,
            MountTarget::Skill(name) => {
                self.dispatcher.write_file(name, vpath, &rel, data, session_id).await
            }
        }
    }

    async fn list_resolved(&self, vpath: &str, session_id: Option<&str>) -> Result<Vec<String>> {
        let (binding, rel) = self.resolve_cached(vpath)?;
        match &binding.target {
            MountTarget::Local(backend) => backend.list(&rel).await,
            MountTarget::Memory => self.memory.list(&rel).await,
            MountTarget::Search => self.search.list(&rel).await,
            MountTarget::Skill(name) => {
                self.dispatcher.list_dir(name, vpath, &rel, session_id).await
            }
        }
    }

    async fn stat_resolved(&self, vpath: &str) -> Result<EntryStat> {
        let (binding, rel) = self.resolve_cached(vpath)?;
        match &binding.target {
            MountTarget::Local(backend) => backend.stat(&rel).await,
            MountTarget::Memory => self.memory.stat(&rel).await,
            MountTarget::Search => self.search.stat(&rel).await,
            MountTarget::Skill(_) => Err(Error::InvalidOperation(format!(
                "stat is not part of the skill contract: {vpath}"
            ))),
        }
    }

    async fn remove_resolved(&self, vpath: &str, session_id: Option<&str>) -> Result<()> {
        let (binding, rel) = self.resolve_cached(vpath)?;
        if binding.readonly {
            return Err(Error::ReadOnly(vpath.to_owned()));
        }
        match &binding.target {
            MountTarget::Local(backend) => {
                backend.remove(&rel).await?;
                self.snapshots.track_change(vpath, ChangeOp::Delete, session_id);
                Ok(())
            }
            MountTarget::Memory => self.memory.remove(&rel).await,
            MountTarget::Search => self.search.remove(&rel).await,
            MountTarget::Skill(_) => Err(Error::InvalidOperation(format!(
                "remove is not part of the skill contract: {vpath}"
            ))),
        }
    }
}

impl std::fmt::Debug for ToolFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolFs")
            .field("root", &self.config.root)
            .field("mounts", &self.mounts.list().len())
            .finish_non_exhaustive()
    }
}

fn id_of(session: &Option<Arc<Session>>) -> Option<&str> {
    session.as_ref().map(|s| s.id.as_str())
}
