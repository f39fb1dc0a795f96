//! Export recent records of one collection as JSON Lines.
//!
//! Produces one record per line, oldest first, restricted to records
//! posted within the last `hours`. Records without a `posted_at` are left
//! out, as are record files that fail to load. Writes to a file if
//! `output` is given, otherwise to stdout for piping into rendering tools.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::config::Config;
use crate::fsio;
use crate::models::Record;
use crate::store::RecordStore;

/// Records in `collection` posted after `cutoff`, sorted by post time.
pub fn recent_records(
    store: &RecordStore,
    collection: &str,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Record>> {
    let mut out = Vec::new();
    for id in store.ids()? {
        let record = match store.load(id) {
            Ok(r) => r,
            Err(e) => {
                warn!(id, error = %e, "skipping unreadable record");
                continue;
            }
        };
        if !record.collections.contains(collection) {
            continue;
        }
        if record.posted_at.is_some_and(|ts| ts > cutoff) {
            out.push(record);
        }
    }
    out.sort_by_key(|r| (r.posted_at, r.id));
    Ok(out)
}

pub fn run_export(
    config: &Config,
    collection: &str,
    hours: i64,
    output: Option<&Path>,
) -> Result<()> {
    let store = RecordStore::open(&config.store.root)?;
    let cutoff = Utc::now() - Duration::hours(hours);
    let records = recent_records(&store, collection, cutoff)?;

    let mut buf = Vec::new();
    for record in &records {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }

    match output {
        Some(path) => {
            fsio::write_bytes_atomic(path, &buf)?;
            eprintln!(
                "Exported {} records from {} to {}",
                records.len(),
                collection,
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&buf)?;
            stdout.flush()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteItem;
    use tempfile::TempDir;

    #[test]
    fn filters_by_collection_and_window() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::open(tmp.path()).unwrap();
        let now = Utc::now();
        let item = |id, hours_ago: Option<i64>| RemoteItem {
            id,
            kind: "text".to_string(),
            media_url: None,
            text: Some(format!("message {}", id)),
            posted_at: hours_ago.map(|h| now - Duration::hours(h)),
        };

        store.merge_record(&item(1, Some(1)), "dms").unwrap();
        store.merge_record(&item(2, Some(48)), "dms").unwrap();
        store.merge_record(&item(3, Some(2)), "other").unwrap();
        store.merge_record(&item(4, None), "dms").unwrap();
        store.merge_record(&item(5, Some(3)), "dms").unwrap();

        let got = recent_records(&store, "dms", now - Duration::hours(24)).unwrap();
        let ids: Vec<_> = got.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 1]);
    }

    #[test]
    fn corrupt_record_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::open(tmp.path()).unwrap();
        let now = Utc::now();
        for id in [1, 2, 3] {
            let item = RemoteItem {
                id,
                kind: "text".to_string(),
                media_url: None,
                text: None,
                posted_at: Some(now - Duration::minutes(id)),
            };
            store.merge_record(&item, "dms").unwrap();
        }
        std::fs::write(tmp.path().join("records").join("2.json"), "{trunc").unwrap();

        let got = recent_records(&store, "dms", now - Duration::hours(1)).unwrap();
        let ids: Vec<_> = got.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }
}
