//! State Store: the single global progress document.
//!
//! Holds per-collection watermarks and counters plus enrichment progress.
//! The document is loaded once per run, passed around explicitly, and
//! saved at checkpoints (after each collection, after each enriched
//! record). Saves overwrite the whole file atomically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fsio;
use crate::models::RecordId;

/// Run-local min/max tracker over the ids seen during one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdRange {
    bounds: Option<(RecordId, RecordId)>,
}

impl IdRange {
    pub fn observe(&mut self, id: RecordId) {
        self.bounds = Some(match self.bounds {
            None => (id, id),
            Some((lo, hi)) => (lo.min(id), hi.max(id)),
        });
    }

    pub fn min(&self) -> Option<RecordId> {
        self.bounds.map(|(lo, _)| lo)
    }

    pub fn max(&self) -> Option<RecordId> {
        self.bounds.map(|(_, hi)| hi)
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }
}

/// Sync progress for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionState {
    pub slug: String,
    pub title: String,
    /// Highest id ever observed. Only ever raised.
    pub newest_id: Option<RecordId>,
    /// Lowest id ever observed. Only ever lowered.
    pub oldest_id: Option<RecordId>,
    #[serde(default)]
    pub fully_backfilled: bool,
    /// Cumulative count of records first created by this collection's syncs.
    #[serde(default)]
    pub new_records: u64,
    /// Whether the most recent pass ended without a fetch or write error.
    /// Backfill only honours the `oldest_id` boundary after a complete pass.
    #[serde(default)]
    pub last_pass_complete: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CollectionState {
    pub fn new(slug: &str, title: &str) -> Self {
        Self {
            slug: slug.to_string(),
            title: title.to_string(),
            newest_id: None,
            oldest_id: None,
            fully_backfilled: false,
            new_records: 0,
            last_pass_complete: false,
            updated_at: None,
        }
    }

    /// Fold one pass's results into the persisted watermarks.
    ///
    /// Runs whether the pass finished cleanly or not, so partial progress
    /// is kept. Watermarks move monotonically: `newest_id` via max,
    /// `oldest_id` via min.
    ///
    /// `complete` is `Some(true)` when the pass covered everything down to
    /// the end or the known floor, `Some(false)` when it failed, and `None`
    /// when it stopped early at known items and so proves nothing about the
    /// range below them; `None` keeps the previous value.
    pub fn commit(
        &mut self,
        seen: IdRange,
        created: u64,
        reached_end: bool,
        complete: Option<bool>,
    ) {
        if let Some(hi) = seen.max() {
            self.newest_id = Some(self.newest_id.map_or(hi, |cur| cur.max(hi)));
        }
        if let Some(lo) = seen.min() {
            self.oldest_id = Some(self.oldest_id.map_or(lo, |cur| cur.min(lo)));
        }
        if reached_end {
            self.fully_backfilled = true;
        }
        self.new_records += created;
        if let Some(complete) = complete {
            self.last_pass_complete = complete;
        }
        self.updated_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentState {
    /// Records processed by the enrichment pass, failures included.
    #[serde(default)]
    pub total_annotated: u64,
    pub last_annotated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub per_collection: BTreeMap<String, u64>,
}

impl EnrichmentState {
    pub fn record_processed<'a>(&mut self, collections: impl IntoIterator<Item = &'a String>) {
        self.total_annotated += 1;
        self.last_annotated_at = Some(Utc::now());
        for slug in collections {
            *self.per_collection.entry(slug.clone()).or_insert(0) += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalState {
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionState>,
    #[serde(default)]
    pub enrichment: EnrichmentState,
    pub updated_at: Option<DateTime<Utc>>,
}

impl GlobalState {
    /// Get the state for `slug`, creating it on first sight.
    pub fn collection_mut(&mut self, slug: &str, title: &str) -> &mut CollectionState {
        self.collections
            .entry(slug.to_string())
            .or_insert_with(|| CollectionState::new(slug, title))
    }
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn open(root: &Path) -> Self {
        Self {
            path: root.join("state.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or an empty one if none has been written yet.
    pub fn load(&self) -> Result<GlobalState> {
        Ok(fsio::read_json(&self.path)?.unwrap_or_default())
    }

    /// Stamp `updated_at` and atomically overwrite the document.
    pub fn save(&self, state: &mut GlobalState) -> Result<()> {
        state.updated_at = Some(Utc::now());
        fsio::write_json_atomic(&self.path, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn range(ids: &[RecordId]) -> IdRange {
        let mut r = IdRange::default();
        for &id in ids {
            r.observe(id);
        }
        r
    }

    #[test]
    fn id_range_tracks_bounds() {
        let r = range(&[105, 101, 103]);
        assert_eq!(r.min(), Some(101));
        assert_eq!(r.max(), Some(105));
        assert!(IdRange::default().is_empty());
    }

    #[test]
    fn commit_is_monotonic() {
        let mut s = CollectionState::new("demo", "Demo");
        s.commit(range(&[100, 110]), 11, false, Some(false));
        assert_eq!((s.newest_id, s.oldest_id), (Some(110), Some(100)));

        // A narrower later pass moves neither marker inward.
        s.commit(range(&[104, 106]), 0, false, Some(true));
        assert_eq!((s.newest_id, s.oldest_id), (Some(110), Some(100)));

        s.commit(range(&[90, 120]), 2, true, Some(true));
        assert_eq!((s.newest_id, s.oldest_id), (Some(120), Some(90)));
        assert!(s.fully_backfilled);
        assert_eq!(s.new_records, 13);
    }

    #[test]
    fn early_stop_keeps_incomplete_flag() {
        let mut s = CollectionState::new("demo", "Demo");
        s.commit(range(&[51, 250]), 200, false, Some(false));
        s.commit(range(&[240, 260]), 10, false, None);
        assert!(!s.last_pass_complete);

        s.commit(range(&[1, 260]), 50, true, Some(true));
        s.commit(range(&[255, 270]), 10, false, None);
        assert!(s.last_pass_complete);
    }

    #[test]
    fn empty_commit_leaves_watermarks_alone() {
        let mut s = CollectionState::new("demo", "Demo");
        s.commit(IdRange::default(), 0, false, Some(false));
        assert_eq!((s.newest_id, s.oldest_id), (None, None));
        assert!(s.updated_at.is_some());
    }

    #[test]
    fn save_and_reload_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::open(tmp.path());
        assert_eq!(store.load().unwrap(), GlobalState::default());

        let mut state = GlobalState::default();
        state
            .collection_mut("demo", "Demo")
            .commit(range(&[1, 2]), 2, true, Some(true));
        state
            .enrichment
            .record_processed(["demo".to_string()].iter());
        store.save(&mut state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.enrichment.per_collection["demo"], 1);
    }
}
