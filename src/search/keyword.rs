//! Keyword-overlap index used when no external ranker is plugged in.

use std::collections::HashSet;
use std::sync::RwLock;

use super::{SearchDoc, SearchHit, SearchIndex};

/// Ranks documents by the fraction of query tokens they contain.
///
/// Scores are `|query ∩ doc| / |query|`, which keeps them in `[0, 1]`
/// without any model dependency. Ties break on ascending id so results
/// are deterministic.
#[derive(Debug, Default)]
pub struct KeywordIndex {
    docs: RwLock<Vec<SearchDoc>>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document to the index. Documents are immutable once added.
    pub fn add(&self, doc: SearchDoc) {
        self.docs.write().expect("keyword index poisoned").push(doc);
    }

    pub fn len(&self) -> usize {
        self.docs.read().expect("keyword index poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl SearchIndex for KeywordIndex {
    fn query(&self, text: &str, top_k: usize) -> Vec<SearchHit> {
        let query_tokens = tokens(text);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let docs = self.docs.read().expect("keyword index poisoned");
        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter_map(|doc| {
                let overlap = tokens(&doc.content).intersection(&query_tokens).count();
                if overlap == 0 {
                    return None;
                }
                Some(SearchHit {
                    id: doc.id.clone(),
                    content: doc.content.clone(),
                    score: overlap as f32 / query_tokens.len() as f32,
                    metadata: doc.metadata.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        hits
    }
}
