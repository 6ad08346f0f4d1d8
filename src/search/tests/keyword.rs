use std::sync::Arc;

use serde_json::Map;

use crate::backend::Backend as _;
use crate::search::{KeywordIndex, ResultDoc, SearchBackend, SearchDoc, SearchIndex as _};
use crate::Error;

fn seeded_index() -> KeywordIndex {
    let index = KeywordIndex::new();
    for (id, content) in [
        ("doc-agents", "AI agent runtimes and tool routing"),
        ("doc-fs", "virtual filesystem mounts and snapshots"),
        ("doc-ai", "AI planning"),
    ] {
        index.add(SearchDoc {
            id: id.to_owned(),
            content: content.to_owned(),
            metadata: Map::new(),
        });
    }
    index
}

#[test]
fn test_scores_are_bounded_and_descending() {
    let index = seeded_index();
    let hits = index.query("AI agent", 10);

    assert!(!hits.is_empty());
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for hit in &hits {
        assert!(hit.score > 0.0 && hit.score <= 1.0);
    }
    assert_eq!(hits[0].id, "doc-agents");
}

#[test]
fn test_top_k_truncates() {
    let index = seeded_index();
    assert_eq!(index.query("AI", 1).len(), 1);
}

#[test]
fn test_no_overlap_yields_no_hits() {
    let index = seeded_index();
    assert!(index.query("unrelated topic", 5).is_empty());
}

#[tokio::test]
async fn backend_read_returns_result_document() {
    let backend = SearchBackend::new(Arc::new(seeded_index()));

    let bytes = backend.read("query?text=AI+agent&top_k=3").await.expect("read");
    let doc: ResultDoc = serde_json::from_slice(&bytes).expect("decode");

    assert_eq!(doc.query, "AI agent");
    assert_eq!(doc.top_k, 3);
    assert!(doc.results.len() <= 3);
}

#[tokio::test]
async fn backend_is_read_only() {
    let backend = SearchBackend::new(Arc::new(seeded_index()));
    assert!(matches!(backend.write("query", b"x").await, Err(Error::ReadOnly(_))));
    assert!(matches!(backend.remove("query").await, Err(Error::ReadOnly(_))));
}

#[tokio::test]
async fn backend_lists_single_query_entry() {
    let backend = SearchBackend::new(Arc::new(seeded_index()));
    assert_eq!(backend.list("").await.expect("list"), vec!["query".to_owned()]);
}
