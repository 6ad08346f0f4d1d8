//! In-process keyed record store mounted at `<root>/memory`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::{Backend, EntryStat};
use crate::{Error, Result};

/// One stored record. Ids are opaque path segments under the mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    /// Raw content bytes; filesystem reads return these verbatim.
    #[serde(with = "content_text")]
    pub content: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

/// Serialize record content as text on the wire.
mod content_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        Ok(String::deserialize(de)?.into_bytes())
    }
}

/// Structured write envelope accepted next to raw bytes.
#[derive(Debug, Deserialize)]
struct Envelope {
    content: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

/// Concurrent record table with a cached id listing.
///
/// `get` runs under a read lock; `set` takes the write lock and invalidates
/// the listing cache; `list` copies under a read lock and re-populates the
/// cache on miss. Cache staleness never affects correctness because every
/// mutation clears it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, MemoryRecord>>,
    list_cache: RwLock<Option<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a record by id.
    pub fn get(&self, id: &str) -> Option<MemoryRecord> {
        self.records.read().expect("memory store poisoned").get(id).cloned()
    }

    /// Insert or update a record.
    ///
    /// `created_at` is set once; `updated_at` advances on every call.
    /// Passing `None` metadata keeps whatever the record already carries.
    pub fn set(&self, id: &str, content: &[u8], metadata: Option<Map<String, Value>>) {
        let now = Utc::now();
        {
            let mut records = self.records.write().expect("memory store poisoned");
            match records.get_mut(id) {
                Some(record) => {
                    record.content = content.to_vec();
                    record.updated_at = now;
                    if let Some(metadata) = metadata {
                        record.metadata = metadata;
                    }
                }
                None => {
                    records.insert(
                        id.to_owned(),
                        MemoryRecord {
                            id: id.to_owned(),
                            content: content.to_vec(),
                            created_at: now,
                            updated_at: now,
                            metadata: metadata.unwrap_or_default(),
                        },
                    );
                }
            }
        }
        *self.list_cache.write().expect("memory store poisoned") = None;
    }

    /// Store raw bytes, or a structured `{content, metadata?}` envelope when
    /// the bytes parse as one.
    pub fn write_entry(&self, id: &str, data: &[u8]) {
        match serde_json::from_slice::<Envelope>(data) {
            Ok(envelope) => self.set(id, envelope.content.as_bytes(), envelope.metadata),
            Err(_) => self.set(id, data, None),
        }
    }

    /// Delete a record by id.
    pub fn remove_record(&self, id: &str) -> Result<()> {
        let removed = self.records.write().expect("memory store poisoned").remove(id);
        if removed.is_none() {
            return Err(Error::NotFound(id.to_owned()));
        }
        *self.list_cache.write().expect("memory store poisoned") = None;
        Ok(())
    }

    /// All record ids, in unspecified order.
    pub fn list_ids(&self) -> Vec<String> {
        if let Some(cached) = self.list_cache.read().expect("memory store poisoned").as_ref() {
            return cached.clone();
        }
        let ids: Vec<String> =
            self.records.read().expect("memory store poisoned").keys().cloned().collect();
        *self.list_cache.write().expect("memory store poisoned") = Some(ids.clone());
        ids
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("memory store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Backend for MemoryStore {
    async fn read(&self, rel: &str) -> Result<Vec<u8>> {
        if rel.is_empty() {
            return Err(Error::InvalidOperation(
                "the memory mount is a directory; read a record id under it".to_owned(),
            ));
        }
        self.get(rel).map(|r| r.content).ok_or_else(|| Error::NotFound(rel.to_owned()))
    }

    async fn write(&self, rel: &str, data: &[u8]) -> Result<()> {
        if rel.is_empty() {
            return Err(Error::InvalidOperation(
                "cannot write the memory mount directory".to_owned(),
            ));
        }
        self.write_entry(rel, data);
        Ok(())
    }

    async fn list(&self, rel: &str) -> Result<Vec<String>> {
        if !rel.is_empty() {
            return Err(Error::NotFound(rel.to_owned()));
        }
        Ok(self.list_ids())
    }

    async fn stat(&self, rel: &str) -> Result<EntryStat> {
        if rel.is_empty() {
            return Ok(EntryStat { size: 0, mod_time: SystemTime::now(), is_dir: true });
        }
        let record = self.get(rel).ok_or_else(|| Error::NotFound(rel.to_owned()))?;
        Ok(EntryStat {
            size: record.content.len() as u64,
            mod_time: record.updated_at.into(),
            is_dir: false,
        })
    }

    async fn remove(&self, rel: &str) -> Result<()> {
        if rel.is_empty() {
            return Err(Error::InvalidOperation(
                "cannot remove the memory mount directory".to_owned(),
            ));
        }
        self.remove_record(rel)
    }
}
