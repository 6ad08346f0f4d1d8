//! Sessions: per-caller access control and audit context.

mod command;

pub use command::{CommandPolicy, CommandRunner, DangerousCommandPolicy};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::audit::{self, AuditRecord, AuditSink};
use crate::{path, Error, Result};

/// An access-control and audit context carried with each operation.
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    allowed: Vec<String>,
    audit: Arc<dyn AuditSink>,
    command_policy: Option<Arc<dyn CommandPolicy>>,
}

impl Session {
    /// Whether the allow-list admits `canonical`.
    ///
    /// An empty list means unrestricted; otherwise some listed prefix must
    /// be a path-prefix of the normalized path.
    pub fn is_path_allowed(&self, canonical: &str) -> bool {
        self.allowed.is_empty()
            || self.allowed.iter().any(|prefix| path::is_path_prefix(prefix, canonical))
    }

    /// The normalized allow-list; empty means unrestricted.
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Emit one audit record into the session's sink.
    pub fn emit(&self, record: AuditRecord) {
        audit::emit(self.audit.as_ref(), record);
    }

    pub fn command_policy(&self) -> Option<&Arc<dyn CommandPolicy>> {
        self.command_policy.as_ref()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("allowed", &self.allowed)
            .finish_non_exhaustive()
    }
}

/// Process-wide session registry keyed by id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session. At most one session with a given id exists at a
    /// time; a duplicate id fails.
    pub fn create(
        &self,
        id: &str,
        allowed: Vec<String>,
        audit: Arc<dyn AuditSink>,
        command_policy: Option<Arc<dyn CommandPolicy>>,
    ) -> Result<Arc<Session>> {
        if id.is_empty() {
            return Err(Error::InvalidArgument("session id must not be empty".to_owned()));
        }
        let session = Arc::new(Session {
            id: id.to_owned(),
            created_at: Utc::now(),
            allowed: allowed.iter().map(|p| path::normalize(p)).collect(),
            audit,
            command_policy,
        });
        match self.sessions.entry(id.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Error::DuplicateName(format!("session {id} already exists")))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<Arc<Session>> {
        self.sessions
            .get(id)
            .map(|s| Arc::clone(&s))
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.sessions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").field("count", &self.sessions.len()).finish()
    }
}

#[cfg(test)]
mod tests;
