//! Read-only semantic-search backend mounted at `<root>/rag`.
//!
//! The only addressable entry is `query`, driven by URL-style parameters:
//! `query?text=<string>&top_k=<int>`. The ranker behind the mount is
//! pluggable through [`SearchIndex`]; the crate ships a keyword-overlap
//! index so the mount is usable without an embedded vector ranker.

mod keyword;

pub use keyword::KeywordIndex;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::{Backend, EntryStat};
use crate::{Error, Result};

/// Immutable document held by an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDoc {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// One ranked result; scores are in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Document returned to filesystem readers of the `query` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDoc {
    pub query: String,
    pub top_k: usize,
    pub results: Vec<SearchHit>,
}

/// Pluggable ranker contract. The embedded vector ranker lives outside the
/// core; any implementation returning descending scores in `[0, 1]` fits.
pub trait SearchIndex: Send + Sync {
    fn query(&self, text: &str, top_k: usize) -> Vec<SearchHit>;
}

/// Parsed `query?...` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub text: String,
    pub top_k: usize,
}

/// Default number of results when `top_k` is omitted.
pub const DEFAULT_TOP_K: usize = 5;

/// The single entry name exposed by the mount.
pub const QUERY_ENTRY: &str = "query";

/// Parse the relative path of a search read, e.g. `query?text=a+b&top_k=3`.
///
/// Both `text` and `q` carry the query string; `text` wins when both are
/// present. Values are `+`-for-space and percent decoded.
pub fn parse_query(rel: &str) -> Result<QueryParams> {
    let (entry, raw_params) = crate::path::split_query(rel);
    if entry != QUERY_ENTRY {
        return Err(Error::NotFound(rel.to_owned()));
    }

    let mut text: Option<String> = None;
    let mut q: Option<String> = None;
    let mut top_k = DEFAULT_TOP_K;

    for pair in raw_params.unwrap_or("?").trim_start_matches('?').split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        match key {
            "text" => text = Some(decode_component(value)?),
            "q" => q = Some(decode_component(value)?),
            "top_k" => {
                top_k = value
                    .parse::<i64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .map(|n| n as usize)
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!("top_k must be a positive integer, got {value:?}"))
                    })?;
            }
            _ => {}
        }
    }

    let text = text.or(q).filter(|t| !t.is_empty()).ok_or_else(|| {
        Error::InvalidArgument("query requires a non-empty `text` or `q` parameter".to_owned())
    })?;

    Ok(QueryParams { text, top_k })
}

fn decode_component(raw: &str) -> Result<String> {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| Error::InvalidArgument(format!("malformed query encoding: {e}")))
}

/// Backend adapter exposing a [`SearchIndex`] as a read-only mount.
pub struct SearchBackend {
    index: Arc<dyn SearchIndex>,
}

impl SearchBackend {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// Run a parsed query against the index.
    pub fn run(&self, params: &QueryParams) -> ResultDoc {
        let mut results = self.index.query(&params.text, params.top_k);
        results.truncate(params.top_k);
        ResultDoc { query: params.text.clone(), top_k: params.top_k, results }
    }
}

#[async_trait]
impl Backend for SearchBackend {
    async fn read(&self, rel: &str) -> Result<Vec<u8>> {
        let params = parse_query(rel)?;
        let doc = self.run(&params);
        serde_json::to_vec(&doc).map_err(|e| Error::Io(format!("encode search result: {e}")))
    }

    async fn write(&self, rel: &str, _data: &[u8]) -> Result<()> {
        Err(Error::ReadOnly(rel.to_owned()))
    }

    async fn list(&self, rel: &str) -> Result<Vec<String>> {
        if !rel.is_empty() {
            return Err(Error::NotFound(rel.to_owned()));
        }
        Ok(vec![QUERY_ENTRY.to_owned()])
    }

    async fn stat(&self, rel: &str) -> Result<EntryStat> {
        if rel.is_empty() {
            return Ok(EntryStat { size: 0, mod_time: SystemTime::now(), is_dir: true });
        }
        let (entry, _) = crate::path::split_query(rel);
        if entry != QUERY_ENTRY {
            return Err(Error::NotFound(rel.to_owned()));
        }
        Ok(EntryStat { size: 0, mod_time: SystemTime::now(), is_dir: false })
    }

    async fn remove(&self, rel: &str) -> Result<()> {
        Err(Error::ReadOnly(rel.to_owned()))
    }
}

#[cfg(test)]
mod tests;
