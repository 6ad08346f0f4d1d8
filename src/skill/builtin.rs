//! Builtin skills exposing the memory and search backends through the
//! executor contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{SkillContext, SkillExecutor, SkillRequest, SkillResponse, OP_LIST_DIR, OP_READ_FILE, OP_WRITE_FILE};
use crate::search::{parse_query, QueryParams, ResultDoc, DEFAULT_TOP_K};

/// Executor serving the memory store.
///
/// Unlike filesystem reads, which return raw content bytes, the skill API
/// returns the full structured record envelope.
#[derive(Debug, Default)]
pub struct MemorySkillExecutor;

impl MemorySkillExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SkillExecutor for MemorySkillExecutor {
    async fn execute(&self, ctx: Arc<SkillContext>, request: SkillRequest) -> SkillResponse {
        let Some(store) = ctx.memory() else {
            return SkillResponse::error("memory store is not bound to this skill");
        };

        match request.operation.as_str() {
            "memory_get" => {
                let Some(id) = request.data_str("id") else {
                    return SkillResponse::error("memory_get requires an `id` field");
                };
                match store.get(id) {
                    Some(record) => match serde_json::to_value(&record) {
                        Ok(envelope) => SkillResponse::ok(envelope),
                        Err(err) => SkillResponse::error(format!("encode record: {err}")),
                    },
                    None => SkillResponse::error(format!("no record with id {id}")),
                }
            }
            "memory_set" => {
                if ctx.is_cancelled() {
                    return SkillResponse::error("execution cancelled");
                }
                let Some(id) = request.data_str("id") else {
                    return SkillResponse::error("memory_set requires an `id` field");
                };
                let Some(content) = request.data_str("content") else {
                    return SkillResponse::error("memory_set requires a `content` field");
                };
                let metadata = request
                    .data
                    .as_ref()
                    .and_then(|d| d.get("metadata"))
                    .and_then(Value::as_object)
                    .cloned();
                store.set(id, content.as_bytes(), metadata);
                SkillResponse::ok(json!({"id": id}))
            }
            "memory_list" => SkillResponse::ok(json!({"ids": store.list_ids()})),
            "memory_delete" => {
                if ctx.is_cancelled() {
                    return SkillResponse::error("execution cancelled");
                }
                let Some(id) = request.data_str("id") else {
                    return SkillResponse::error("memory_delete requires an `id` field");
                };
                match store.remove_record(id) {
                    Ok(()) => SkillResponse::ok(json!({"id": id})),
                    Err(err) => SkillResponse::error(err.to_string()),
                }
            }
            OP_READ_FILE => {
                let Some(rel) = request.data_str("relative_path") else {
                    return SkillResponse::error("read_file requires a relative path");
                };
                match store.get(rel) {
                    Some(record) => SkillResponse::ok(Value::String(
                        String::from_utf8_lossy(&record.content).into_owned(),
                    )),
                    None => SkillResponse::error(format!("no record with id {rel}")),
                }
            }
            OP_WRITE_FILE => {
                if ctx.is_cancelled() {
                    return SkillResponse::error("execution cancelled");
                }
                let Some(rel) = request.data_str("relative_path") else {
                    return SkillResponse::error("write_file requires a relative path");
                };
                let input = request.data_str("input").unwrap_or_default();
                store.write_entry(rel, input.as_bytes());
                SkillResponse::ok(json!({"id": rel}))
            }
            OP_LIST_DIR => SkillResponse::ok(json!({"entries": store.list_ids()})),
            other => SkillResponse::error(format!("unsupported memory operation {other}")),
        }
    }
}

/// Executor serving the search index.
#[derive(Debug, Default)]
pub struct SearchSkillExecutor;

impl SearchSkillExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SkillExecutor for SearchSkillExecutor {
    async fn execute(&self, ctx: Arc<SkillContext>, request: SkillRequest) -> SkillResponse {
        let Some(index) = ctx.search() else {
            return SkillResponse::error("search index is not bound to this skill");
        };

        let params = match request.operation.as_str() {
            "search_query" => {
                let Some(text) = request.data_str("text").or_else(|| request.data_str("q")) else {
                    return SkillResponse::error("search_query requires a `text` field");
                };
                let top_k = request
                    .data
                    .as_ref()
                    .and_then(|d| d.get("top_k"))
                    .and_then(Value::as_u64)
                    .map(|n| n as usize)
                    .unwrap_or(DEFAULT_TOP_K);
                QueryParams { text: text.to_owned(), top_k }
            }
            OP_READ_FILE => {
                let Some(rel) = request.data_str("relative_path") else {
                    return SkillResponse::error("read_file requires a relative path");
                };
                match parse_query(rel) {
                    Ok(params) => params,
                    Err(err) => return SkillResponse::error(err.to_string()),
                }
            }
            OP_LIST_DIR => {
                return SkillResponse::ok(json!({"entries": [crate::search::QUERY_ENTRY]}))
            }
            OP_WRITE_FILE => return SkillResponse::error("the search backend is read-only"),
            other => return SkillResponse::error(format!("unsupported search operation {other}")),
        };

        let mut results = index.query(&params.text, params.top_k);
        results.truncate(params.top_k);
        let doc = ResultDoc { query: params.text, top_k: params.top_k, results };
        match serde_json::to_value(&doc) {
            Ok(value) => SkillResponse::ok(value),
            Err(err) => SkillResponse::error(format!("encode results: {err}")),
        }
    }
}
