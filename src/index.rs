//! TF-IDF lexical index over a corpus snapshot.
//!
//! The index is an immutable artifact built from exactly one [`Snapshot`]:
//! a refresh produces an entirely new instance and the scheduler swaps it in
//! atomically, so readers never observe a partially built index.
//!
//! # Ranking Algorithm
//!
//! 1. Tokenize each message's searchable text (case-fold, split on
//!    non-alphanumeric boundaries, drop empty tokens).
//! 2. `idf(t) = ln((1 + N) / (1 + df(t))) + 1`, smoothed so terms present
//!    in every document (or none) never divide by zero.
//! 3. Weight each document vector by TF × IDF and L2-normalize it.
//! 4. `rank` builds the query vector over the fitted vocabulary
//!    (out-of-vocabulary terms contribute zero) and scores each document
//!    by cosine similarity.
//! 5. Sort by score (desc), ties broken by original corpus order.
//!
//! A query with no vocabulary overlap scores zero everywhere but still
//! returns up to `k` documents in corpus order, so the caller always has
//! fallback material.

use std::collections::HashMap;

use crate::models::Snapshot;

/// Case-fold and split on non-alphanumeric boundaries, dropping empties.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// A scored document reference returned by [`Index::rank`].
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDoc {
    /// Id of the message the document was built from.
    pub message_id: String,
    /// Cosine similarity against the query, in `[0.0, 1.0]`.
    pub score: f64,
}

/// Immutable TF-IDF vector space over one corpus snapshot.
pub struct Index {
    /// term → column id, fitted at build time.
    vocab: HashMap<String, usize>,
    /// Smoothed inverse document frequency per column.
    idf: Vec<f64>,
    /// L2-normalized sparse document vectors, sorted by column id.
    doc_vectors: Vec<Vec<(usize, f64)>>,
    /// Message id per document, in corpus order.
    doc_ids: Vec<String>,
}

impl Index {
    /// Builds the vector space from a snapshot. Messages with blank content
    /// are not indexed (they can never match) but remain in the snapshot.
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut docs: Vec<(String, Vec<String>)> = Vec::new();
        for msg in &snapshot.messages {
            if msg.content.trim().is_empty() {
                continue;
            }
            docs.push((msg.id.clone(), tokenize(&msg.searchable_text())));
        }

        let mut vocab: HashMap<String, usize> = HashMap::new();
        let mut df: Vec<usize> = Vec::new();

        for (_, tokens) in &docs {
            let mut seen_in_doc: Vec<usize> = Vec::new();
            for token in tokens {
                let col = match vocab.get(token) {
                    Some(&col) => col,
                    None => {
                        let col = vocab.len();
                        vocab.insert(token.clone(), col);
                        df.push(0);
                        col
                    }
                };
                if !seen_in_doc.contains(&col) {
                    seen_in_doc.push(col);
                }
            }
            for col in seen_in_doc {
                df[col] += 1;
            }
        }

        let n = docs.len() as f64;
        let idf: Vec<f64> = df
            .iter()
            .map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
            .collect();

        let mut doc_vectors = Vec::with_capacity(docs.len());
        let mut doc_ids = Vec::with_capacity(docs.len());

        for (id, tokens) in docs {
            let mut tf: HashMap<usize, f64> = HashMap::new();
            for token in &tokens {
                let col = vocab[token];
                *tf.entry(col).or_insert(0.0) += 1.0;
            }

            let mut vector: Vec<(usize, f64)> =
                tf.into_iter().map(|(col, f)| (col, f * idf[col])).collect();
            vector.sort_by_key(|&(col, _)| col);

            let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            if norm > f64::EPSILON {
                for (_, w) in vector.iter_mut() {
                    *w /= norm;
                }
            }

            doc_vectors.push(vector);
            doc_ids.push(id);
        }

        Self {
            vocab,
            idf,
            doc_vectors,
            doc_ids,
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Ranks all documents against `query` and returns the top `k`.
    ///
    /// Deterministic for a fixed index and query: descending by score,
    /// ties broken by corpus order. Never fails — an empty or
    /// zero-overlap query yields the first `k` documents with score 0.
    pub fn rank(&self, query: &str, k: usize) -> Vec<RankedDoc> {
        let query_vec = self.query_vector(query);

        let mut scored: Vec<(usize, f64)> = self
            .doc_vectors
            .iter()
            .enumerate()
            .map(|(i, dv)| {
                let score = dv
                    .iter()
                    .map(|(col, w)| w * query_vec.get(col).copied().unwrap_or(0.0))
                    .sum::<f64>();
                (i, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| RankedDoc {
                message_id: self.doc_ids[i].clone(),
                score,
            })
            .collect()
    }

    /// TF × IDF query vector over the fitted vocabulary, L2-normalized.
    /// Out-of-vocabulary terms are dropped.
    fn query_vector(&self, query: &str) -> HashMap<usize, f64> {
        let mut tf: HashMap<usize, f64> = HashMap::new();
        for token in tokenize(query) {
            if let Some(&col) = self.vocab.get(&token) {
                *tf.entry(col).or_insert(0.0) += 1.0;
            }
        }

        for (col, w) in tf.iter_mut() {
            *w *= self.idf[*col];
        }

        let norm = tf.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            for w in tf.values_mut() {
                *w /= norm;
            }
        }

        tf
    }
}
