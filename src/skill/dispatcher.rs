//! Routes filesystem operations on skill-mounted paths through the JSON
//! skill contract.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{SkillManager, SkillRequest, SkillResponse, OP_LIST_DIR, OP_READ_FILE, OP_WRITE_FILE};
use crate::{Error, Result};

/// Translates read/write/list calls into skill requests and decodes the
/// responses for filesystem callers.
pub struct SkillDispatcher {
    manager: Arc<SkillManager>,
}

impl SkillDispatcher {
    pub fn new(manager: Arc<SkillManager>) -> Self {
        Self { manager }
    }

    /// `read_file` on a skill mount: the result becomes raw bytes.
    pub async fn read_file(
        &self,
        skill: &str,
        full_path: &str,
        rel: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<u8>> {
        let request = build_request(OP_READ_FILE, full_path, rel, None, session_id);
        let response = self.call(skill, request).await?;
        Ok(result_bytes(response.result))
    }

    /// `write_file` on a skill mount; the caller bytes travel as the
    /// `input` field of the request data.
    pub async fn write_file(
        &self,
        skill: &str,
        full_path: &str,
        rel: &str,
        data: &[u8],
        session_id: Option<&str>,
    ) -> Result<()> {
        let request = build_request(OP_WRITE_FILE, full_path, rel, Some(data), session_id);
        self.call(skill, request).await?;
        Ok(())
    }

    /// `list_dir` on a skill mount: entries come from `result.entries`.
    pub async fn list_dir(
        &self,
        skill: &str,
        full_path: &str,
        rel: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<String>> {
        let request = build_request(OP_LIST_DIR, full_path, rel, None, session_id);
        let response = self.call(skill, request).await?;
        let entries = response
            .result
            .as_ref()
            .and_then(|r| r.get("entries"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::Skill(format!("skill {skill} returned no entries for {full_path}"))
            })?;
        Ok(entries.iter().filter_map(Value::as_str).map(str::to_owned).collect())
    }

    async fn call(&self, skill: &str, request: SkillRequest) -> Result<SkillResponse> {
        let response = self.manager.execute(skill, request).await?;
        if !response.success {
            let detail = response.error.unwrap_or_else(|| "skill reported failure".to_owned());
            return Err(Error::Skill(detail));
        }
        Ok(response)
    }
}

impl std::fmt::Debug for SkillDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillDispatcher").finish_non_exhaustive()
    }
}

fn build_request(
    operation: &str,
    full_path: &str,
    rel: &str,
    input: Option<&[u8]>,
    session_id: Option<&str>,
) -> SkillRequest {
    let mut data = json!({
        "relative_path": rel,
        "full_path": full_path,
    });
    if let Some(input) = input {
        data["input"] = Value::String(String::from_utf8_lossy(input).into_owned());
    }
    if let Some(session_id) = session_id {
        data["session_id"] = Value::String(session_id.to_owned());
    }
    SkillRequest::new(operation).with_path(full_path).with_data(data)
}

/// Decode a response result for a filesystem reader: strings pass through
/// as bytes, anything else is re-encoded as JSON.
fn result_bytes(result: Option<Value>) -> Vec<u8> {
    match result {
        None => Vec::new(),
        Some(Value::String(text)) => text.into_bytes(),
        Some(other) => serde_json::to_vec(&other).unwrap_or_default(),
    }
}
