//! # Member QA
//!
//! A question-answering service over a corpus of short member chat
//! messages. Questions are answered by lexical retrieval (TF-IDF + cosine
//! similarity) followed by rule-based answer extraction; when no pattern
//! matches, the best-matching message is returned verbatim.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  Paginated  │──▶│  Ingestion    │──▶│  Snapshot   │
//! │  source     │   │ fetch+dedupe │   │ (JSON file) │
//! └─────────────┘   └──────────────┘   └──────┬──────┘
//!                                             │ rebuild on interval
//!                                             ▼
//!                    question ──▶ ┌───────────────────┐
//!                                 │  TF-IDF index      │
//!                                 │  rank → extract   │──▶ answer
//!                                 └───────────────────┘
//! ```
//!
//! The background refresher rebuilds the index from a fresh snapshot on a
//! fixed interval and swaps it in atomically; queries never block on a
//! refresh and never see a partially built index.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Ingestion/persistence failure taxonomy |
//! | [`fetch`] | Paginated, retrying, de-duplicating ingestion |
//! | [`snapshot`] | Atomic snapshot persistence and merging |
//! | [`index`] | TF-IDF lexical index and ranking |
//! | [`extract`] | Ordered answer-extractor chain |
//! | [`engine`] | Query engine with the swappable index slot |
//! | [`refresh`] | Startup and periodic background refresh |
//! | [`server`] | HTTP surface (`/ask`, `/health`) |

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod index;
pub mod models;
pub mod refresh;
pub mod server;
pub mod snapshot;
