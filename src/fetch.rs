//! Paginated ingestion from the upstream message source.
//!
//! The upstream is a read-only endpoint paged with `skip`/`limit` query
//! parameters, treated as untrusted: records missing required fields are
//! skipped and counted, never turned into malformed messages. Fetching is
//! resumable (skip starts at the number of already-known messages),
//! rate-limited (a configurable delay between pages), and degrades instead
//! of failing: transient errors get bounded retries with backoff, client
//! errors halve the page size, and an exhausted page ends the run with a
//! partial — but valid — result.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::error::QaError;
use crate::models::Message;

/// One page of raw records from the source.
#[derive(Debug)]
pub struct Page {
    pub items: Vec<Value>,
    /// Total record count, when the source reports one.
    pub total: Option<u64>,
}

/// The upstream source responds either with an envelope or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PagePayload {
    Envelope {
        items: Vec<Value>,
        #[serde(default)]
        total: Option<u64>,
    },
    Bare(Vec<Value>),
}

/// The paginated message source seam. The production implementation is
/// [`HttpMessageSource`]; tests substitute scripted sources.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Page, QaError>;
}

/// `reqwest`-backed source with a per-call timeout so one stalled page
/// request cannot starve a whole refresh cycle.
pub struct HttpMessageSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMessageSource {
    pub fn new(config: &SourceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Page, QaError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("skip", skip), ("limit", limit)])
            .send()
            .await
            .map_err(|e| QaError::SourceUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(QaError::PageRejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(QaError::SourceUnavailable(format!("HTTP {status}")));
        }

        let payload: PagePayload = response
            .json()
            .await
            .map_err(|e| QaError::SourceUnavailable(format!("invalid page body: {e}")))?;

        Ok(match payload {
            PagePayload::Envelope { items, total } => Page { items, total },
            PagePayload::Bare(items) => Page { items, total: None },
        })
    }
}

/// Normalizes one raw record into a [`Message`].
///
/// Requires a non-empty `id` and message body; a missing or unparseable
/// timestamp becomes `None` rather than rejecting the record.
pub fn parse_record(value: &Value) -> Result<Message, QaError> {
    let id = value
        .get("id")
        .and_then(nonempty_string)
        .ok_or_else(|| QaError::MalformedRecord("missing id".to_string()))?;

    let content = value
        .get("message")
        .or_else(|| value.get("content"))
        .and_then(nonempty_string)
        .ok_or_else(|| QaError::MalformedRecord(format!("record {id} has no message body")))?;

    let author = value
        .get("user_name")
        .or_else(|| value.get("author"))
        .and_then(nonempty_string)
        .unwrap_or_default();

    let timestamp = value
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(parse_timestamp);

    Ok(Message {
        id,
        author,
        timestamp,
        content,
    })
}

fn nonempty_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        // Some sources serialize ids as numbers.
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Result of one ingestion run. A partial result (`complete == false`) is
/// a valid, reportable outcome, not an error.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Newly seen messages, in fetch order.
    pub messages: Vec<Message>,
    /// Whether the run paged through the entire source.
    pub complete: bool,
    /// Pages successfully fetched.
    pub pages: u32,
    /// Malformed records skipped.
    pub skipped: u64,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub page_limit: usize,
    pub page_delay: Duration,
    pub max_retries: u32,
}

impl From<&SourceConfig> for FetchOptions {
    fn from(config: &SourceConfig) -> Self {
        Self {
            page_limit: config.page_limit,
            page_delay: Duration::from_millis(config.page_delay_ms),
            max_retries: config.max_retries,
        }
    }
}

/// Pages through the source until exhausted, de-duplicating against
/// `known_ids` and ids seen this run so repeated runs are idempotent.
pub async fn fetch_all(
    source: &dyn MessageSource,
    known_ids: &HashSet<String>,
    opts: &FetchOptions,
) -> FetchOutcome {
    let mut seen: HashSet<String> = known_ids.clone();
    let mut outcome = FetchOutcome::default();
    // Resume where the known corpus ends.
    let mut skip = known_ids.len();
    let mut limit = opts.page_limit.max(1);
    let mut total: Option<u64> = None;

    loop {
        match fetch_page_with_retry(source, skip, limit, opts).await {
            Ok(page) => {
                if page.items.is_empty() {
                    // Terminal probe, not a page of data.
                    outcome.complete = true;
                    break;
                }
                outcome.pages += 1;
                if page.total.is_some() {
                    total = page.total;
                }

                let fetched = page.items.len();
                for item in &page.items {
                    match parse_record(item) {
                        Ok(message) => {
                            if seen.insert(message.id.clone()) {
                                outcome.messages.push(message);
                            }
                        }
                        Err(err) => {
                            outcome.skipped += 1;
                            tracing::warn!(error = %err, "skipping malformed record");
                        }
                    }
                }

                skip += fetched;
                if let Some(t) = total {
                    if skip as u64 >= t {
                        outcome.complete = true;
                        break;
                    }
                }
                tokio::time::sleep(opts.page_delay).await;
            }
            Err(QaError::PageRejected { status }) if limit > 1 => {
                // The source rejects large pages sometimes; degrade and retry.
                limit = (limit / 2).max(1);
                tracing::warn!(status, new_limit = limit, "page rejected; halving page size");
                tokio::time::sleep(opts.page_delay).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, skip, collected = outcome.messages.len(),
                    "stopping ingestion early");
                break;
            }
        }
    }

    outcome
}

async fn fetch_page_with_retry(
    source: &dyn MessageSource,
    skip: usize,
    limit: usize,
    opts: &FetchOptions,
) -> Result<Page, QaError> {
    let mut attempt: u32 = 0;
    loop {
        match source.fetch_page(skip, limit).await {
            Ok(page) => return Ok(page),
            Err(err) if err.is_transient() && attempt < opts.max_retries => {
                attempt += 1;
                let backoff = opts.page_delay.saturating_mul(attempt);
                tracing::warn!(error = %err, attempt, ?backoff, "transient fetch error; backing off");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn opts() -> FetchOptions {
        FetchOptions {
            page_limit: 2,
            page_delay: Duration::from_millis(0),
            max_retries: 1,
        }
    }

    fn record(id: &str, author: &str, content: &str) -> Value {
        json!({ "id": id, "user_name": author, "message": content })
    }

    /// Serves fixed pages of two records, then an empty page.
    struct FixedSource {
        records: Vec<Value>,
    }

    #[async_trait]
    impl MessageSource for FixedSource {
        async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Page, QaError> {
            let end = (skip + limit).min(self.records.len());
            let items = if skip >= self.records.len() {
                Vec::new()
            } else {
                self.records[skip..end].to_vec()
            };
            Ok(Page {
                items,
                total: Some(self.records.len() as u64),
            })
        }
    }

    /// Fails every call with a transient error.
    struct DownSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageSource for DownSource {
        async fn fetch_page(&self, _skip: usize, _limit: usize) -> Result<Page, QaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(QaError::SourceUnavailable("connection refused".to_string()))
        }
    }

    /// Serves pages without a total, so the loop only ends on an empty page.
    struct NoTotalSource {
        records: Vec<Value>,
    }

    #[async_trait]
    impl MessageSource for NoTotalSource {
        async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Page, QaError> {
            let end = (skip + limit).min(self.records.len());
            let items = if skip >= self.records.len() {
                Vec::new()
            } else {
                self.records[skip..end].to_vec()
            };
            Ok(Page { items, total: None })
        }
    }

    /// Rejects pages bigger than one record with a client error.
    struct SmallPageSource {
        records: Vec<Value>,
    }

    #[async_trait]
    impl MessageSource for SmallPageSource {
        async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Page, QaError> {
            if limit > 1 {
                return Err(QaError::PageRejected { status: 400 });
            }
            let items = self.records.get(skip).cloned().into_iter().collect();
            Ok(Page { items, total: None })
        }
    }

    #[tokio::test]
    async fn test_fetch_all_pages_and_completes() {
        let source = FixedSource {
            records: vec![
                record("a", "Ana", "first"),
                record("b", "Ben", "second"),
                record("c", "Cleo", "third"),
            ],
        };
        let outcome = fetch_all(&source, &HashSet::new(), &opts()).await;
        assert!(outcome.complete);
        assert_eq!(outcome.messages.len(), 3);
        assert_eq!(outcome.skipped, 0);
    }

    #[tokio::test]
    async fn test_terminal_empty_page_is_not_counted() {
        let source = NoTotalSource {
            records: vec![
                record("a", "Ana", "first"),
                record("b", "Ben", "second"),
                record("c", "Cleo", "third"),
            ],
        };
        let outcome = fetch_all(&source, &HashSet::new(), &opts()).await;
        assert!(outcome.complete);
        assert_eq!(outcome.messages.len(), 3);
        // Two pages of data; the empty probe that ended the run is not one.
        assert_eq!(outcome.pages, 2);
    }

    #[tokio::test]
    async fn test_fetch_all_is_idempotent_against_known_ids() {
        let source = FixedSource {
            records: vec![record("a", "Ana", "first"), record("b", "Ben", "second")],
        };
        let first = fetch_all(&source, &HashSet::new(), &opts()).await;
        let known: HashSet<String> = first.messages.iter().map(|m| m.id.clone()).collect();
        let second = fetch_all(&source, &known, &opts()).await;
        assert!(second.complete);
        assert!(second.messages.is_empty(), "re-fetch must add nothing new");
    }

    #[tokio::test]
    async fn test_fetch_all_skips_malformed_records() {
        let source = FixedSource {
            records: vec![
                record("a", "Ana", "fine"),
                json!({ "user_name": "NoId", "message": "dropped" }),
                json!({ "id": "c", "user_name": "Cleo" }),
                record("d", "Dee", "also fine"),
            ],
        };
        let outcome = fetch_all(&source, &HashSet::new(), &opts()).await;
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.skipped, 2);
    }

    #[tokio::test]
    async fn test_total_failure_returns_empty_partial() {
        let source = DownSource {
            calls: AtomicUsize::new(0),
        };
        let outcome = fetch_all(&source, &HashSet::new(), &opts()).await;
        assert!(!outcome.complete);
        assert!(outcome.messages.is_empty());
        // One initial attempt plus max_retries.
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_halves_page_size() {
        let source = SmallPageSource {
            records: vec![record("a", "Ana", "one"), record("b", "Ben", "two")],
        };
        let outcome = fetch_all(&source, &HashSet::new(), &opts()).await;
        assert!(outcome.complete);
        assert_eq!(outcome.messages.len(), 2);
    }

    #[test]
    fn test_parse_record_timestamp_fallbacks() {
        let with_rfc3339 = json!({
            "id": "a", "user_name": "Ana", "message": "hi",
            "timestamp": "2025-06-01T12:00:00Z"
        });
        assert!(parse_record(&with_rfc3339).unwrap().timestamp.is_some());

        let with_date_only = json!({
            "id": "b", "user_name": "Ben", "message": "hi",
            "timestamp": "2025-06-01"
        });
        assert!(parse_record(&with_date_only).unwrap().timestamp.is_some());

        let with_garbage = json!({
            "id": "c", "user_name": "Cleo", "message": "hi",
            "timestamp": "not a time"
        });
        assert!(parse_record(&with_garbage).unwrap().timestamp.is_none());
    }

    #[tokio::test]
    async fn test_http_source_parses_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/messages/")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "total": 1,
                    "items": [{ "id": "m1", "user_name": "Ana", "message": "hello" }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let config = SourceConfig {
            base_url: format!("{}/messages/", server.url()),
            page_limit: 100,
            page_delay_ms: 0,
            max_retries: 0,
            timeout_secs: 5,
        };
        let source = HttpMessageSource::new(&config).unwrap();
        let page = source.fetch_page(0, 100).await.unwrap();
        assert_eq!(page.total, Some(1));
        assert_eq!(page.items.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_source_maps_status_codes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/messages/")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let config = SourceConfig {
            base_url: format!("{}/messages/", server.url()),
            page_limit: 100,
            page_delay_ms: 0,
            max_retries: 0,
            timeout_secs: 5,
        };
        let source = HttpMessageSource::new(&config).unwrap();
        match source.fetch_page(0, 100).await {
            Err(QaError::PageRejected { status: 404 }) => {}
            other => panic!("expected PageRejected, got {other:?}"),
        }
    }
}
