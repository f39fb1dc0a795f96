//! Core data models used throughout Collection Harness.
//!
//! These types represent the remote items, local records, and enrichment
//! payloads that flow through the sync and enrichment passes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Globally unique, monotonically issued remote identifier.
pub type RecordId = i64;

/// Raw item produced by the remote collection API before merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: RecordId,
    pub kind: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
}

/// A collection as advertised by the remote listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub slug: String,
    pub title: String,
    /// Declared item count. Informational only; paging never trusts it.
    #[serde(default)]
    pub count: Option<u64>,
}

/// One page of a remote collection, newest ids first.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<RemoteItem>,
    /// True iff the page came back exactly full. A hint, not a promise.
    pub has_more: bool,
}

impl Page {
    /// Wrap a fetched batch; `has_more` is set when the batch is exactly full.
    pub fn new(items: Vec<RemoteItem>, page_size: usize) -> Self {
        let has_more = items.len() == page_size;
        Self { items, has_more }
    }
}

/// The durable local representation of one remote item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Path of the cached media file, relative to the store root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
    /// Slugs of every collection this record has been seen in.
    pub collections: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
}

impl Record {
    /// Build a fresh record from a remote item seen in `collection`.
    pub fn from_remote(item: &RemoteItem, collection: &str) -> Self {
        Self {
            id: item.id,
            kind: item.kind.clone(),
            media_url: item.media_url.clone(),
            media_path: None,
            text: item.text.clone(),
            posted_at: item.posted_at,
            collections: BTreeSet::from([collection.to_string()]),
            enrichment: None,
        }
    }
}

/// Result of an annotation attempt stored on a record.
///
/// Absence of enrichment is `Option::None` on the record; a failed attempt
/// is recorded explicitly so it is not retried unless forced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Enrichment {
    Analyzed(Annotation),
    Failed {
        error: String,
        annotated_at: DateTime<Utc>,
        model: String,
    },
}

impl Enrichment {
    pub fn annotated_at(&self) -> DateTime<Utc> {
        match self {
            Enrichment::Analyzed(a) => a.annotated_at,
            Enrichment::Failed { annotated_at, .. } => *annotated_at,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Enrichment::Analyzed(a) => &a.model,
            Enrichment::Failed { model, .. } => model,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Enrichment::Failed { .. })
    }
}

/// A successful annotation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    pub annotated_at: DateTime<Utc>,
    pub model: String,
}

/// What the annotation service hands back, before it is stamped.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AnnotationPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}
