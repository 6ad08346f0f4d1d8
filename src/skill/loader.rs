//! Filesystem-skill loading and descriptor parsing.
//!
//! A filesystem skill is a host directory holding a `SKILL.md` descriptor
//! (matched case-insensitively) and optional auxiliary files. The
//! descriptor's frontmatter supplies the name, version and description;
//! everything after the closing fence is the documentation body.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::fs;

use super::{
    Skill, SkillContext, SkillDocs, SkillExecutor, SkillKind, SkillRequest, SkillResponse,
    OP_LIST_DIR, OP_READ_FILE, OP_WRITE_FILE,
};
use crate::{Error, Result};

/// Parsed descriptor fields.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Descriptor {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: String,
    pub body: String,
}

/// Parse a descriptor document: a `---` fenced frontmatter of simple
/// `key: value` lines followed by the body.
pub(crate) fn parse_descriptor(raw: &str) -> Result<Descriptor> {
    let rest = raw.trim_start_matches(['\n', '\r']);
    let Some(after_open) = rest.strip_prefix("---") else {
        return Err(Error::InvalidArgument("skill descriptor has no frontmatter".to_owned()));
    };
    let Some(close) = after_open.find("\n---") else {
        return Err(Error::InvalidArgument("skill descriptor frontmatter is unterminated".to_owned()));
    };
    let block = &after_open[..close];
    let body = after_open[close + 4..].trim_start_matches(['\n', '\r']).to_owned();

    let mut name = None;
    let mut version = None;
    let mut description = None;
    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        match key.trim() {
            "name" => name = Some(value.to_owned()),
            "version" => version = Some(value.to_owned()),
            "description" => description = Some(value.to_owned()),
            _ => {}
        }
    }

    let description = description.filter(|d| !d.is_empty()).ok_or_else(|| {
        Error::InvalidArgument("skill descriptor requires a non-empty description".to_owned())
    })?;
    Ok(Descriptor { name, version, description, body })
}

/// Locate the descriptor file inside `dir`, matching `SKILL.md` in any
/// case.
async fn find_descriptor(dir: &Path) -> Result<PathBuf> {
    let mut entries =
        fs::read_dir(dir).await.map_err(|e| Error::from_io(e, &dir.to_string_lossy()))?;
    while let Some(entry) =
        entries.next_entry().await.map_err(|e| Error::from_io(e, &dir.to_string_lossy()))?
    {
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case("skill.md") {
            return Ok(entry.path());
        }
    }
    Err(Error::NotFound(format!("{} has no SKILL.md descriptor", dir.display())))
}

/// Load a filesystem skill from `dir`.
///
/// The skill name falls back to the directory name when the descriptor
/// omits one; the executor serves reads and listings over the directory.
pub async fn load_filesystem_skill(dir: impl Into<PathBuf>) -> Result<Skill> {
    let dir = dir.into();
    let descriptor_path = find_descriptor(&dir).await?;
    let raw = fs::read_to_string(&descriptor_path)
        .await
        .map_err(|e| Error::from_io(e, &descriptor_path.to_string_lossy()))?;
    let descriptor = parse_descriptor(&raw)?;

    let name = descriptor
        .name
        .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .ok_or_else(|| Error::InvalidArgument("skill directory has no name".to_owned()))?;

    Ok(Skill {
        name,
        version: descriptor.version.unwrap_or_else(|| "0.0.0".to_owned()),
        kind: SkillKind::Filesystem,
        mount_path: None,
        docs: Some(SkillDocs { description: descriptor.description, body: descriptor.body }),
        executor: Some(Arc::new(FsSkillExecutor { dir })),
    })
}

/// Executor backing a filesystem skill: read-only access to the skill's
/// own directory tree.
#[derive(Debug)]
pub struct FsSkillExecutor {
    dir: PathBuf,
}

impl FsSkillExecutor {
    fn abs(&self, rel: &str) -> std::result::Result<PathBuf, String> {
        let rel_path = Path::new(rel);
        for component in rel_path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(format!("path {rel:?} escapes the skill directory")),
            }
        }
        Ok(if rel.is_empty() { self.dir.clone() } else { self.dir.join(rel_path) })
    }
}

#[async_trait]
impl SkillExecutor for FsSkillExecutor {
    async fn execute(&self, _ctx: Arc<SkillContext>, request: SkillRequest) -> SkillResponse {
        let rel = request.data_str("relative_path").unwrap_or_default().to_owned();
        let abs = match self.abs(&rel) {
            Ok(abs) => abs,
            Err(detail) => return SkillResponse::error(detail),
        };

        match request.operation.as_str() {
            OP_READ_FILE => match fs::read_to_string(&abs).await {
                Ok(text) => SkillResponse::ok(Value::String(text)),
                Err(err) => SkillResponse::error(format!("read {rel}: {err}")),
            },
            OP_LIST_DIR => {
                let mut dir = match fs::read_dir(&abs).await {
                    Ok(dir) => dir,
                    Err(err) => return SkillResponse::error(format!("list {rel}: {err}")),
                };
                let mut entries = Vec::new();
                loop {
                    match dir.next_entry().await {
                        Ok(Some(entry)) => {
                            entries.push(entry.file_name().to_string_lossy().into_owned())
                        }
                        Ok(None) => break,
                        Err(err) => return SkillResponse::error(format!("list {rel}: {err}")),
                    }
                }
                entries.sort();
                SkillResponse::ok(json!({"entries": entries}))
            }
            OP_WRITE_FILE => SkillResponse::error("filesystem skills are read-only"),
            other => SkillResponse::error(format!("unsupported operation {other}")),
        }
    }
}
