//! Local-disk backend mapping a mount onto a host directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::backend::{Backend, EntryStat};
use crate::{Error, Result};

/// Backend serving a host directory.
///
/// The read-only flag lives on the mount binding; the router rejects
/// mutations on read-only mounts before the backend is reached.
#[derive(Debug)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Bind `root` as the backing directory. The directory must exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::NotFound(format!(
                "host directory {} does not exist",
                root.display()
            )));
        }
        let canonical = root.canonicalize().unwrap_or(root);
        Ok(Self { root: canonical })
    }

    /// The canonical host directory this backend serves.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `rel` under the root, rejecting components that would
    /// escape it.
    fn abs(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = Path::new(rel);
        for component in rel_path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(Error::InvalidArgument(format!(
                        "path {rel:?} escapes the mount"
                    )))
                }
            }
        }
        Ok(if rel.is_empty() { self.root.clone() } else { self.root.join(rel_path) })
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn read(&self, rel: &str) -> Result<Vec<u8>> {
        let abs = self.abs(rel)?;
        fs::read(&abs).await.map_err(|e| Error::from_io(e, rel))
    }

    async fn write(&self, rel: &str, data: &[u8]) -> Result<()> {
        let abs = self.abs(rel)?;
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Error::from_io(e, rel))?;
        }
        fs::write(&abs, data).await.map_err(|e| Error::from_io(e, rel))
    }

    async fn list(&self, rel: &str) -> Result<Vec<String>> {
        let abs = self.abs(rel)?;
        let mut dir = fs::read_dir(&abs).await.map_err(|e| Error::from_io(e, rel))?;
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| Error::from_io(e, rel))? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn stat(&self, rel: &str) -> Result<EntryStat> {
        let abs = self.abs(rel)?;
        let meta = fs::metadata(&abs).await.map_err(|e| Error::from_io(e, rel))?;
        Ok(EntryStat {
            size: meta.len(),
            mod_time: meta.modified().map_err(|e| Error::from_io(e, rel))?,
            is_dir: meta.is_dir(),
        })
    }

    async fn remove(&self, rel: &str) -> Result<()> {
        let abs = self.abs(rel)?;
        let meta = fs::metadata(&abs).await.map_err(|e| Error::from_io(e, rel))?;
        if meta.is_dir() {
            fs::remove_dir_all(&abs).await.map_err(|e| Error::from_io(e, rel))
        } else {
            fs::remove_file(&abs).await.map_err(|e| Error::from_io(e, rel))
        }
    }
}
