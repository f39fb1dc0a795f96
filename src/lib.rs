//! # Collection Harness
//!
//! Incremental, resumable ingestion and enrichment of paginated remote
//! collections.
//!
//! Collection Harness pulls ID-ordered pages from a remote collection API,
//! merges every item into a durable file-per-record store, tracks
//! per-collection progress with a `newest_id`/`oldest_id` watermark pair,
//! and runs a separate, rate-limited annotation pass over eligible records.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Registry │──▶│ Sync pass  │──▶│ Record Store │──▶│ State Store │
//! │ listing  │   │ page+merge │   │ records/     │   │ state.json  │
//! └──────────┘   └─────┬──────┘   └──────┬───────┘   └──────▲──────┘
//!                      │                 │                  │
//!                ┌─────▼──────┐   ┌──────▼───────┐          │
//!                │  Fetcher   │   │ Enrich pass  │──────────┘
//!                │  HTTP+429  │   │  annotate    │
//!                └────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! chx sync                         # incremental sync of every collection
//! chx sync --mode backfill         # page back to older items
//! chx sync --collection demo --download-media
//! chx enrich --dry-run             # list records awaiting annotation
//! chx enrich                       # annotate them
//! chx status
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`fsio`] | Atomic whole-file writes |
//! | [`store`] | Record Store |
//! | [`state`] | Watermarks and counters |
//! | [`fetcher`] | Paginated fetcher with bounded rate-limit retry |
//! | [`registry`] | Collection listing and selection |
//! | [`media`] | Optional media caching |
//! | [`ingest`] | Sync orchestration |
//! | [`annotator`] | Annotation provider abstraction |
//! | [`enrich`] | Enrichment pass |
//! | [`progress`] | Progress reporting |
//! | [`status`] | Status overview |
//! | [`get`] | Record lookup |
//! | [`export`] | JSONL export of recent records |
//! | [`logging`] | Tracing setup |

pub mod annotator;
pub mod config;
pub mod enrich;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod fsio;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod media;
pub mod models;
pub mod progress;
pub mod registry;
pub mod state;
pub mod status;
pub mod store;
