//! Skill registry: name lookup plus the reverse mountpoint map.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{Skill, SkillKind};
use crate::{Error, Result};

#[derive(Default)]
struct Inner {
    by_name: HashMap<String, Arc<Skill>>,
    by_mount: HashMap<String, String>,
}

/// Holds skills by name and their mountpoint bindings.
#[derive(Default)]
pub struct SkillRegistry {
    inner: RwLock<Inner>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skill. Fails on an empty or already-present name; a
    /// skill shipping its own `mount_path` also claims that mountpoint.
    pub fn register(&self, skill: Skill) -> Result<Arc<Skill>> {
        if skill.name.is_empty() {
            return Err(Error::InvalidArgument("skill name must not be empty".to_owned()));
        }
        let mut inner = self.inner.write().expect("skill registry poisoned");
        if inner.by_name.contains_key(&skill.name) {
            return Err(Error::DuplicateName(format!("skill {} already registered", skill.name)));
        }
        if let Some(mount) = &skill.mount_path {
            if inner.by_mount.contains_key(mount) {
                return Err(Error::Conflict(format!("mountpoint {mount} already claimed")));
            }
            inner.by_mount.insert(mount.clone(), skill.name.clone());
        }
        let skill = Arc::new(skill);
        inner.by_name.insert(skill.name.clone(), Arc::clone(&skill));
        Ok(skill)
    }

    /// Remove a skill and any mountpoints bound to it.
    pub fn unregister(&self, name: &str) -> Result<Arc<Skill>> {
        let mut inner = self.inner.write().expect("skill registry poisoned");
        let skill = inner
            .by_name
            .remove(name)
            .ok_or_else(|| Error::SkillNotFound(name.to_owned()))?;
        inner.by_mount.retain(|_, bound| bound != name);
        Ok(skill)
    }

    /// Bind an additional mountpoint to a registered skill.
    pub fn bind_mount(&self, mount: &str, name: &str) -> Result<()> {
        let mut inner = self.inner.write().expect("skill registry poisoned");
        if !inner.by_name.contains_key(name) {
            return Err(Error::SkillNotFound(name.to_owned()));
        }
        if inner.by_mount.contains_key(mount) {
            return Err(Error::Conflict(format!("mountpoint {mount} already claimed")));
        }
        inner.by_mount.insert(mount.to_owned(), name.to_owned());
        Ok(())
    }

    /// Release a mountpoint binding, returning the skill name it carried.
    pub fn unbind_mount(&self, mount: &str) -> Result<String> {
        self.inner
            .write()
            .expect("skill registry poisoned")
            .by_mount
            .remove(mount)
            .ok_or_else(|| Error::NotFound(format!("no skill mounted at {mount}")))
    }

    pub fn get(&self, name: &str) -> Result<Arc<Skill>> {
        self.inner
            .read()
            .expect("skill registry poisoned")
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::SkillNotFound(name.to_owned()))
    }

    /// Resolve a mountpoint to its skill.
    pub fn get_by_path(&self, mount: &str) -> Result<Arc<Skill>> {
        let inner = self.inner.read().expect("skill registry poisoned");
        let name = inner
            .by_mount
            .get(mount)
            .ok_or_else(|| Error::NotFound(format!("no skill mounted at {mount}")))?;
        inner
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::SkillNotFound(name.clone()))
    }

    pub fn list(&self) -> Vec<Arc<Skill>> {
        self.inner.read().expect("skill registry poisoned").by_name.values().cloned().collect()
    }

    pub fn list_by_kind(&self, kind: SkillKind) -> Vec<Arc<Skill>> {
        self.list().into_iter().filter(|s| s.kind == kind).collect()
    }
}

impl std::fmt::Debug for SkillRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("skill registry poisoned");
        f.debug_struct("SkillRegistry")
            .field("skills", &inner.by_name.len())
            .field("mounts", &inner.by_mount.len())
            .finish()
    }
}
