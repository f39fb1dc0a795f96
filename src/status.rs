//! Sync and enrichment status overview.
//!
//! Prints per-collection watermarks and counters from the state document,
//! plus enrichment totals. Used by `chx status` to confirm that syncs are
//! advancing and which collections are fully backfilled.

use anyhow::Result;

use crate::config::Config;
use crate::registry;
use crate::state::{GlobalState, StateStore};

pub fn run_status(config: &Config) -> Result<()> {
    let state_store = StateStore::open(&config.store.root);
    let state = state_store.load()?;
    let snapshot = registry::load_snapshot(&config.store.root)?;

    println!("Collection Harness — Status");
    println!("===========================");
    println!();
    println!("  Store:       {}", config.store.root.display());
    println!("  State:       {}", state_store.path().display());
    if let Some(ref snap) = snapshot {
        println!(
            "  Listing:     {} collections (fetched {})",
            snap.collections.len(),
            snap.fetched_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    println!();

    print!("{}", format_collections(&state));

    println!();
    println!("  Enrichment");
    println!("  ──────────");
    println!("  Annotated:   {}", state.enrichment.total_annotated);
    match state.enrichment.last_annotated_at {
        Some(ts) => println!("  Last:        {}", ts.format("%Y-%m-%d %H:%M UTC")),
        None => println!("  Last:        never"),
    }
    for (slug, n) in &state.enrichment.per_collection {
        println!("    {:<24} {}", slug, n);
    }
    println!();

    Ok(())
}

fn format_id(id: Option<i64>) -> String {
    id.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn format_collections(state: &GlobalState) -> String {
    if state.collections.is_empty() {
        return "  No collections synced yet.\n".to_string();
    }

    let mut out = format!(
        "  {:<24} {:>12} {:>12} {:>8} {:>10}  {}\n",
        "COLLECTION", "NEWEST", "OLDEST", "NEW", "BACKFILLED", "LAST SYNC"
    );
    for cs in state.collections.values() {
        let last = cs
            .updated_at
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        let backfilled = if cs.fully_backfilled { "yes" } else { "no" };
        out.push_str(&format!(
            "  {:<24} {:>12} {:>12} {:>8} {:>10}  {}\n",
            cs.slug,
            format_id(cs.newest_id),
            format_id(cs.oldest_id),
            cs.new_records,
            backfilled,
            last
        ));
    }
    out
}
