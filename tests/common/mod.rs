#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use toolfs::audit::MemoryAuditSink;
use toolfs::search::{KeywordIndex, SearchDoc};
use toolfs::session::Session;
use toolfs::{Config, ToolFs};

/// A router with one writable local mount at `/toolfs/data` backed by a
/// temporary directory, ranking `rag` queries with a shared keyword index.
pub struct Fixture {
    pub tempdir: TempDir,
    pub fs: ToolFs,
    pub index: Arc<KeywordIndex>,
}

impl Fixture {
    pub fn new() -> Self {
        let tempdir = TempDir::new().expect("create temp dir");
        let index = Arc::new(KeywordIndex::new());
        let fs = ToolFs::with_index(Config::default(), index.clone()).expect("build router");
        fs.mount_local("/toolfs/data", tempdir.path(), false).expect("mount data dir");
        Self { tempdir, fs, index }
    }

    /// Seed the search index with `(id, content)` documents.
    pub fn seed_search(&self, docs: &[(&str, &str)]) {
        for (id, content) in docs {
            self.index.add(SearchDoc {
                id: id.to_string(),
                content: content.to_string(),
                metadata: serde_json::Map::new(),
            });
        }
    }

    /// Host path of an entry under the data mount.
    pub fn host_path(&self, rel: &str) -> PathBuf {
        self.tempdir.path().join(rel)
    }

    pub fn write_host(&self, rel: &str, content: &str) {
        let path = self.host_path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture parents");
        }
        std::fs::write(path, content).expect("write fixture file");
    }

    pub fn read_host(&self, rel: &str) -> String {
        std::fs::read_to_string(self.host_path(rel)).expect("read fixture file")
    }

    /// A session whose audit records land in the returned memory sink.
    pub fn session(&self, id: &str, allowed: &[&str]) -> (Arc<Session>, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let session = self
            .fs
            .new_session_with(
                id,
                allowed.iter().map(|s| s.to_string()).collect(),
                sink.clone(),
                None,
            )
            .expect("create session");
        (session, sink)
    }
}
