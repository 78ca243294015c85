//! Core data models used throughout the QA service.
//!
//! These types represent the messages, corpus snapshots, and answers that
//! flow through the ingestion and question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single member chat message, normalized from the upstream wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique, stable identifier assigned by the upstream source.
    pub id: String,
    /// Member display name.
    pub author: String,
    /// When the message was posted, if the source provided a parseable time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Raw message text.
    pub content: String,
}

impl Message {
    /// The text a message is indexed and matched under: author name joined
    /// with the content, so questions naming a member rank their messages.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.author, self.content).trim().to_string()
    }
}

/// An immutable, versioned copy of the full message corpus.
///
/// Snapshots are created by ingestion, persisted to disk, and superseded
/// (never mutated) by the next successful refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// When this snapshot was assembled.
    pub fetched_at: DateTime<Utc>,
    /// Messages in insertion order. Ids are unique within a snapshot.
    pub messages: Vec<Message>,
}

impl Snapshot {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            fetched_at: Utc::now(),
            messages,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A ranked retrieval candidate handed to the answer extractors.
#[derive(Debug, Clone)]
pub struct RankedMessage {
    pub message: Message,
    pub score: f64,
}

impl RankedMessage {
    /// Rendered text the extractors scan (author + content).
    pub fn text(&self) -> String {
        self.message.searchable_text()
    }
}

/// The structured payload of an [`Answer`], tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerKind {
    /// A date expression extracted verbatim from a message.
    Date { value: String },
    /// A numeric count (e.g. number of cars).
    Count { value: i64 },
    /// An ordered, deduplicated list of extracted names.
    NameList { values: Vec<String> },
    /// No pattern matched; the top-ranked message text is returned verbatim.
    Fallback,
    /// The engine has no corpus at all (cold start with no persisted data).
    NoData,
}

/// The result of answering a question.
///
/// Always produced, never an error: unrecognized questions degrade to
/// [`AnswerKind::Fallback`] and a cold engine answers [`AnswerKind::NoData`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Human-readable answer sentence.
    pub text: String,
    #[serde(flatten)]
    pub kind: AnswerKind,
    /// Ids of the message(s) the answer was extracted from.
    pub sources: Vec<String>,
    /// Set when conflicting values were found and the most recent one won.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub conflict: bool,
}

impl Answer {
    pub fn date(value: impl Into<String>, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: AnswerKind::Date {
                value: value.into(),
            },
            sources: vec![source.into()],
            conflict: false,
        }
    }

    pub fn count(value: i64, text: impl Into<String>, source: impl Into<String>, conflict: bool) -> Self {
        Self {
            text: text.into(),
            kind: AnswerKind::Count { value },
            sources: vec![source.into()],
            conflict,
        }
    }

    pub fn name_list(values: Vec<String>, text: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            text: text.into(),
            kind: AnswerKind::NameList { values },
            sources,
            conflict: false,
        }
    }

    pub fn fallback(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: AnswerKind::Fallback,
            sources: vec![source.into()],
            conflict: false,
        }
    }

    pub fn no_data() -> Self {
        Self {
            text: "No message data is available yet.".to_string(),
            kind: AnswerKind::NoData,
            sources: Vec::new(),
            conflict: false,
        }
    }
}
