//! Record retrieval by id.
//!
//! Used by the `chx get` command to dump a single record as JSON.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::models::{Record, RecordId};
use crate::store::RecordStore;

pub fn get_record(config: &Config, id: RecordId) -> Result<Record> {
    let store = RecordStore::open(&config.store.root)?;
    store
        .load(id)
        .with_context(|| format!("could not load record {}", id))
}

pub fn run_get(config: &Config, id: RecordId) -> Result<()> {
    let record = get_record(config, id)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
