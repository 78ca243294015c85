//! The query engine: a swappable serving index plus the extractor chain.
//!
//! The "current index" slot is the only resource mutated concurrently with
//! reads. It holds an `Arc` to a complete [`ServingIndex`] and is replaced
//! wholesale under a short write lock: readers clone the `Arc` and work on
//! an internally consistent snapshot, never blocking on a refresh and never
//! observing a half-built index.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::extract::{self, Extractor};
use crate::index::Index;
use crate::models::{Answer, RankedMessage, Snapshot};

/// Lifecycle state reported by [`QaEngine::health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// No index has ever been built; queries answer "no data".
    Cold,
    /// Serving an index.
    Ready,
    /// Serving an index while a refresh runs in the background.
    Refreshing,
}

/// Health summary exposed to the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub index_state: IndexState,
    pub corpus_size: usize,
    pub last_refresh_time: Option<DateTime<Utc>>,
}

/// An immutable index plus the snapshot it was built from.
pub struct ServingIndex {
    pub index: Index,
    pub snapshot: Snapshot,
    by_id: HashMap<String, crate::models::Message>,
    pub built_at: DateTime<Utc>,
}

struct Slot {
    serving: Option<Arc<ServingIndex>>,
    refreshing: bool,
    last_refresh: Option<DateTime<Utc>>,
}

/// The two entry points the HTTP layer needs: `answer` and `health`.
pub struct QaEngine {
    slot: RwLock<Slot>,
    extractors: Vec<Box<dyn Extractor>>,
    top_k: usize,
}

impl QaEngine {
    pub fn new(top_k: usize) -> Self {
        Self {
            slot: RwLock::new(Slot {
                serving: None,
                refreshing: false,
                last_refresh: None,
            }),
            extractors: extract::default_chain(),
            top_k,
        }
    }

    /// Builds an index from `snapshot` and atomically swaps it in without
    /// touching the refresh marker: serving a stale persisted snapshot at
    /// startup is not a refresh.
    pub fn publish(&self, snapshot: Snapshot) {
        self.install(snapshot, false);
    }

    /// Swaps in a rebuilt index and records the refresh time under the same
    /// lock acquisition, so a concurrent [`health`] call never pairs the new
    /// corpus with the previous refresh marker.
    ///
    /// [`health`]: QaEngine::health
    pub fn publish_refreshed(&self, snapshot: Snapshot) {
        self.install(snapshot, true);
    }

    /// The build happens outside the lock; the write lock is held only for
    /// the pointer swap, so concurrent queries keep flowing off the old
    /// index until the instant it is replaced.
    fn install(&self, snapshot: Snapshot, refreshed: bool) {
        let index = Index::build(&snapshot);
        let by_id = snapshot
            .messages
            .iter()
            .map(|m| (m.id.clone(), m.clone()))
            .collect();
        let serving = Arc::new(ServingIndex {
            index,
            snapshot,
            by_id,
            built_at: Utc::now(),
        });

        let mut slot = self.slot.write().expect("index slot lock poisoned");
        slot.serving = Some(serving);
        if refreshed {
            slot.last_refresh = Some(Utc::now());
        }
    }

    pub fn set_refreshing(&self, refreshing: bool) {
        let mut slot = self.slot.write().expect("index slot lock poisoned");
        slot.refreshing = refreshing;
    }

    /// The currently served index, if one has ever been published.
    pub fn current(&self) -> Option<Arc<ServingIndex>> {
        self.slot
            .read()
            .expect("index slot lock poisoned")
            .serving
            .clone()
    }

    /// Answers a question against the current index.
    ///
    /// Never fails: a cold engine returns the explicit no-data answer, and
    /// unrecognized or empty questions degrade to the fallback extractor.
    pub fn answer(&self, question: &str) -> Answer {
        let Some(serving) = self.current() else {
            return Answer::no_data();
        };

        let ranked: Vec<RankedMessage> = serving
            .index
            .rank(question, self.top_k)
            .into_iter()
            .filter_map(|doc| {
                serving.by_id.get(&doc.message_id).map(|message| RankedMessage {
                    message: message.clone(),
                    score: doc.score,
                })
            })
            .collect();

        extract::extract(&self.extractors, question, &ranked)
    }

    pub fn health(&self) -> Health {
        let slot = self.slot.read().expect("index slot lock poisoned");
        let index_state = match (&slot.serving, slot.refreshing) {
            (None, _) => IndexState::Cold,
            (Some(_), true) => IndexState::Refreshing,
            (Some(_), false) => IndexState::Ready,
        };
        Health {
            index_state,
            corpus_size: slot.serving.as_ref().map_or(0, |s| s.snapshot.len()),
            last_refresh_time: slot.last_refresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerKind, Message};

    fn msg(id: &str, author: &str, content: &str) -> Message {
        Message {
            id: id.to_string(),
            author: author.to_string(),
            timestamp: None,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_cold_engine_answers_no_data() {
        let engine = QaEngine::new(6);
        let answer = engine.answer("How many cars does Vikram have?");
        assert_eq!(answer.kind, AnswerKind::NoData);
        let health = engine.health();
        assert_eq!(health.index_state, IndexState::Cold);
        assert_eq!(health.corpus_size, 0);
        assert_eq!(health.last_refresh_time, None);
    }

    #[test]
    fn test_publish_makes_engine_ready() {
        let engine = QaEngine::new(6);
        engine.publish(Snapshot::new(vec![msg(
            "m1",
            "Vikram Desai",
            "I now own 3 cars",
        )]));

        let health = engine.health();
        assert_eq!(health.index_state, IndexState::Ready);
        assert_eq!(health.corpus_size, 1);
        // Publishing alone is not a refresh (stale disk fallback uses it).
        assert_eq!(health.last_refresh_time, None);

        let answer = engine.answer("How many cars does Vikram Desai have?");
        assert_eq!(answer.kind, AnswerKind::Count { value: 3 });
        assert_eq!(answer.sources, vec!["m1".to_string()]);
    }

    #[test]
    fn test_publish_refreshed_updates_marker_with_the_swap() {
        let engine = QaEngine::new(6);
        engine.publish(Snapshot::new(vec![msg("m1", "Ana", "first")]));
        assert_eq!(engine.health().last_refresh_time, None);

        engine.publish_refreshed(Snapshot::new(vec![
            msg("m1", "Ana", "first"),
            msg("m2", "Ben", "second"),
        ]));

        // One health read sees both effects of the swap.
        let health = engine.health();
        assert_eq!(health.corpus_size, 2);
        assert!(health.last_refresh_time.is_some());
    }

    #[test]
    fn test_refreshing_state_keeps_serving() {
        let engine = QaEngine::new(6);
        engine.publish(Snapshot::new(vec![msg("m1", "Ana", "hello world")]));
        engine.set_refreshing(true);

        assert_eq!(engine.health().index_state, IndexState::Refreshing);
        // Queries still answer off the current index mid-refresh.
        let answer = engine.answer("hello");
        assert_ne!(answer.kind, AnswerKind::NoData);

        engine.set_refreshing(false);
        assert_eq!(engine.health().index_state, IndexState::Ready);
    }

    #[test]
    fn test_zero_overlap_question_falls_back() {
        let engine = QaEngine::new(6);
        engine.publish(Snapshot::new(vec![
            msg("m1", "Ana", "first message"),
            msg("m2", "Ben", "second message"),
        ]));
        let answer = engine.answer("xyzzy plugh");
        assert_eq!(answer.kind, AnswerKind::Fallback);
        assert_eq!(answer.text, "first message");
    }

    #[test]
    fn test_empty_question_falls_back() {
        let engine = QaEngine::new(6);
        engine.publish(Snapshot::new(vec![msg("m1", "Ana", "only message")]));
        let answer = engine.answer("");
        assert_eq!(answer.kind, AnswerKind::Fallback);
        assert_eq!(answer.text, "only message");
    }

    #[test]
    fn test_publish_replaces_whole_index() {
        let engine = QaEngine::new(6);
        engine.publish(Snapshot::new(vec![msg("m1", "Ana", "old corpus")]));
        let old = engine.current().unwrap();

        engine.publish(Snapshot::new(vec![
            msg("m1", "Ana", "old corpus"),
            msg("m2", "Ben", "new arrival"),
        ]));
        let new = engine.current().unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        // The retained handle still sees its own consistent corpus.
        assert_eq!(old.snapshot.len(), 1);
        assert_eq!(new.snapshot.len(), 2);
    }
}
