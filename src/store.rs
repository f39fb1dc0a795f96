//! Record Store: one JSON file per record, keyed by remote id.
//!
//! ```text
//! <root>/records/<id>.json
//! <root>/media/<id>.<ext>
//! ```
//!
//! [`RecordStore::merge_record`] is the idempotent upsert the whole sync
//! pass relies on: repeated or cross-collection merges converge on one
//! record whose membership is the union of every collection it appeared
//! in, and whose enrichment and cached media path are never touched.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::fsio;
use crate::models::{Record, RecordId, RemoteItem};

/// What a merge did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No record existed; one was created.
    Created,
    /// The record existed and gained a collection membership.
    Updated,
    /// The record already listed this collection. Nothing was written.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Merged {
    pub record: Record,
    pub outcome: MergeOutcome,
}

pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    /// Open (creating if needed) a record store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root.join("records"))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn media_dir(&self) -> PathBuf {
        self.root.join("media")
    }

    fn record_path(&self, id: RecordId) -> PathBuf {
        self.root.join("records").join(format!("{}.json", id))
    }

    pub fn exists(&self, id: RecordId) -> bool {
        self.record_path(id).is_file()
    }

    pub fn load(&self, id: RecordId) -> Result<Record> {
        fsio::read_json(&self.record_path(id))?.ok_or(PipelineError::NotFound { id })
    }

    /// Persist a record, replacing any previous version.
    pub fn save(&self, record: &Record) -> Result<()> {
        fsio::write_json_atomic(&self.record_path(record.id), record)
    }

    /// Insert `item` as a new record, or add `collection` to the existing
    /// record's membership. Writes through to disk before returning.
    pub fn merge_record(&self, item: &RemoteItem, collection: &str) -> Result<Merged> {
        if !self.exists(item.id) {
            let record = Record::from_remote(item, collection);
            self.save(&record)?;
            return Ok(Merged {
                record,
                outcome: MergeOutcome::Created,
            });
        }

        let mut record = self.load(item.id)?;
        if !record.collections.insert(collection.to_string()) {
            return Ok(Merged {
                record,
                outcome: MergeOutcome::Unchanged,
            });
        }

        self.save(&record)?;
        Ok(Merged {
            record,
            outcome: MergeOutcome::Updated,
        })
    }

    /// All stored record ids, ascending.
    pub fn ids(&self) -> Result<Vec<RecordId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.root.join("records"))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<RecordId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}
