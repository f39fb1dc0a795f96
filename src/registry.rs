//! Collection Registry client.
//!
//! Pulls the collection listing from the remote, writes it to
//! `<root>/collections.json` for downstream tooling, and narrows it to the
//! collections a given run should touch.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::fetcher::CollectionSource;
use crate::fsio;
use crate::models::CollectionInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionsSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub collections: Vec<CollectionInfo>,
}

fn snapshot_path(root: &Path) -> PathBuf {
    root.join("collections.json")
}

/// Fetch the remote listing and persist it as the collections snapshot.
pub async fn refresh(source: &dyn CollectionSource, root: &Path) -> Result<Vec<CollectionInfo>> {
    let collections = source.list_collections().await?;
    let snapshot = CollectionsSnapshot {
        fetched_at: Utc::now(),
        collections,
    };
    fsio::write_json_atomic(&snapshot_path(root), &snapshot)?;
    info!(count = snapshot.collections.len(), "collection listing refreshed");
    Ok(snapshot.collections)
}

pub fn load_snapshot(root: &Path) -> Result<Option<CollectionsSnapshot>> {
    fsio::read_json(&snapshot_path(root))
}

/// Narrow `listed` to what this run should sync.
///
/// `only` (from the CLI) wins over the configured allow-list. A slug named
/// by `only` that the remote did not list is still returned, titled by
/// its slug, so a collection missing from the listing can be synced.
pub fn select(listed: Vec<CollectionInfo>, only: Option<&str>, allow: &[String]) -> Vec<CollectionInfo> {
    if let Some(slug) = only {
        return match listed.into_iter().find(|c| c.slug == slug) {
            Some(c) => vec![c],
            None => {
                warn!(collection = slug, "collection not in remote listing, syncing anyway");
                vec![CollectionInfo {
                    slug: slug.to_string(),
                    title: slug.to_string(),
                    count: None,
                }]
            }
        };
    }

    if allow.is_empty() {
        return listed;
    }
    listed
        .into_iter()
        .filter(|c| allow.iter().any(|a| a == &c.slug))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(slug: &str) -> CollectionInfo {
        CollectionInfo {
            slug: slug.to_string(),
            title: slug.to_uppercase(),
            count: Some(3),
        }
    }

    #[test]
    fn select_all_when_unfiltered() {
        let got = select(vec![info("a"), info("b")], None, &[]);
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn allow_list_filters() {
        let got = select(vec![info("a"), info("b"), info("c")], None, &["c".to_string()]);
        assert_eq!(got, vec![info("c")]);
    }

    #[test]
    fn only_overrides_and_tolerates_unlisted() {
        let got = select(vec![info("a")], Some("a"), &["b".to_string()]);
        assert_eq!(got, vec![info("a")]);

        let got = select(vec![info("a")], Some("zzz"), &[]);
        assert_eq!(got[0].slug, "zzz");
        assert_eq!(got[0].title, "zzz");
    }
}
