//! Snapshot persistence and merging.
//!
//! The corpus snapshot is a single JSON file, replaced atomically
//! (write-to-temp-then-rename) after each successful ingestion run so a
//! crash mid-write never corrupts the last good copy on disk.

use std::collections::HashSet;
use std::path::Path;

use crate::error::QaError;
use crate::models::{Message, Snapshot};

/// Loads the persisted snapshot, if any.
///
/// A missing file is a normal cold start. An unreadable or unparseable file
/// is logged and treated the same way — startup must not fail because of a
/// damaged cache.
pub fn load(path: &Path) -> Option<Snapshot> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not read snapshot file");
            return None;
        }
    };
    match serde_json::from_str::<Snapshot>(&content) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unparseable snapshot file");
            None
        }
    }
}

/// Atomically replaces the snapshot file.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<(), QaError> {
    let persist_err = |source: std::io::Error| QaError::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(persist_err)?;
        }
    }

    let body = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| persist_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body).map_err(persist_err)?;
    std::fs::rename(&tmp, path).map_err(persist_err)?;
    Ok(())
}

/// Merges newly fetched messages into the existing snapshot, skipping ids
/// already present. Existing messages are never mutated or reordered.
pub fn merge(existing: Option<Snapshot>, fetched: Vec<Message>) -> Snapshot {
    let mut messages = existing.map(|s| s.messages).unwrap_or_default();
    let mut known: HashSet<String> = messages.iter().map(|m| m.id.clone()).collect();

    for message in fetched {
        if known.insert(message.id.clone()) {
            messages.push(message);
        }
    }

    Snapshot::new(messages)
}
