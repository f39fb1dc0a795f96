//! Opt-in local media caching.
//!
//! Downloads a record's media URL into `<root>/media/<id>.<ext>` and
//! stores the relative path on the record. Records that already have a
//! cached path are left alone.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::debug;

use crate::fsio;
use crate::models::Record;
use crate::store::RecordStore;

pub struct MediaFetcher {
    client: reqwest::Client,
}

impl MediaFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    /// Download and cache media for `record`, persisting the updated record.
    ///
    /// Returns `false` if there was nothing to do.
    pub async fn cache(&self, store: &RecordStore, record: &mut Record) -> Result<bool> {
        if record.media_path.is_some() {
            return Ok(false);
        }
        let Some(url) = record.media_url.clone() else {
            return Ok(false);
        };

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            bail!("media download failed (HTTP {}): {}", resp.status(), url);
        }
        let bytes = resp.bytes().await?;

        let rel = format!("media/{}.{}", record.id, extension_for(&url));
        fsio::write_bytes_atomic(&store.root().join(&rel), &bytes)?;
        debug!(id = record.id, path = %rel, bytes = bytes.len(), "cached media");

        record.media_path = Some(rel);
        store.save(record)?;
        Ok(true)
    }
}

/// File extension taken from the URL path, or `bin` if none looks sane.
fn extension_for(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "bin".to_string(),
    }
}
