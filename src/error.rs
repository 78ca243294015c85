use std::path::PathBuf;

use thiserror::Error;

/// Failure classes for ingestion and snapshot handling.
///
/// None of these ever reach the query path: ingestion and rebuild failures
/// are absorbed by the refresh scheduler, which keeps serving the previous
/// index. The query path only ever sees a valid index or the explicit
/// "no data" answer.
#[derive(Debug, Error)]
pub enum QaError {
    /// Network or HTTP failure talking to the upstream message source.
    #[error("message source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source rejected a page request with a client error. The fetch
    /// loop reacts by halving the page size rather than retrying as-is.
    #[error("page request rejected with HTTP {status}")]
    PageRejected { status: u16 },

    /// A fetched record is missing required fields. Skipped and counted,
    /// never turned into a malformed [`Message`](crate::models::Message).
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// No corpus snapshot has ever been obtained, from the network or disk.
    #[error("no corpus snapshot available")]
    EmptyCorpus,

    /// Writing the snapshot file failed.
    #[error("failed to persist snapshot to {path}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl QaError {
    /// Transient errors are worth retrying with backoff; the rest are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, QaError::SourceUnavailable(_))
    }
}
