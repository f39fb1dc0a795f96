//! Sync orchestration.
//!
//! Drives one pass per collection:
//!
//! ```text
//! START → PAGING → (END_OF_COLLECTION | BOUNDARY_HIT | CAUGHT_UP | ERROR)
//!       → WATERMARK_COMMIT → DONE
//! ```
//!
//! Every item of a page is merged into the [`RecordStore`] (and so written
//! to disk) before the next page is requested, so a crash after page K
//! never loses pages 1..K. The watermark commit runs on every exit,
//! including errors, so an interrupted pass still records how far it got.
//! Collections are processed sequentially and the state document is saved
//! after each one.
//!
//! # Modes
//!
//! | Mode | Stops paging when |
//! |------|-------------------|
//! | `incremental` | a page holds an id ≤ stored `newest_id` |
//! | `backfill` | a page holds an id ≤ stored `oldest_id` |
//! | `full` | never, short of the end of the collection |
//!
//! Both watermark stops apply only after a complete pass. A failed pass
//! commits the ids it did see, so trusting those watermarks next time
//! would skip the pages it never reached; the following pass pages to
//! the end instead.
//!
//! All modes stop at the first short or empty page, which is the only
//! authoritative end-of-collection signal and marks the collection
//! `fully_backfilled`.

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::PipelineError;
use crate::fetcher::{CollectionSource, HttpSource};
use crate::media::MediaFetcher;
use crate::models::CollectionInfo;
use crate::progress::{ProgressEvent, ProgressMode, ProgressReporter};
use crate::registry;
use crate::state::{CollectionState, GlobalState, IdRange, StateStore};
use crate::store::{MergeOutcome, RecordStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SyncMode {
    Incremental,
    Backfill,
    Full,
}

#[derive(Clone, Debug)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Restrict the run to one collection slug.
    pub collection: Option<String>,
    pub download_media: bool,
}

/// Why a collection's paging loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassEnd {
    /// A short or empty page was returned.
    EndOfCollection,
    /// Backfill reached the previously recorded `oldest_id`.
    BoundaryHit,
    /// Incremental reached the previously recorded `newest_id`.
    CaughtUp,
    /// Fetching or persisting failed; partial progress was committed.
    Failed(String),
}

impl PassEnd {
    pub fn is_failure(&self) -> bool {
        matches!(self, PassEnd::Failed(_))
    }

    /// Whether this pass leaves the collection known to be covered from
    /// its newest item down to the floor. `CaughtUp` stops at items
    /// already held and says nothing about the range below them.
    pub fn completeness(&self) -> Option<bool> {
        match self {
            PassEnd::EndOfCollection | PassEnd::BoundaryHit => Some(true),
            PassEnd::CaughtUp => None,
            PassEnd::Failed(_) => Some(false),
        }
    }
}

/// Outcome of one collection pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionReport {
    pub slug: String,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub pages: u32,
    pub media_cached: u64,
    pub end: PassEnd,
}

impl CollectionReport {
    fn new(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            created: 0,
            updated: 0,
            unchanged: 0,
            pages: 0,
            media_cached: 0,
            end: PassEnd::EndOfCollection,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    pub collections: Vec<CollectionReport>,
}

impl SyncReport {
    pub fn created(&self) -> u64 {
        self.collections.iter().map(|c| c.created).sum()
    }

    pub fn updated(&self) -> u64 {
        self.collections.iter().map(|c| c.updated).sum()
    }

    pub fn failed(&self) -> usize {
        self.collections.iter().filter(|c| c.end.is_failure()).count()
    }
}

/// Everything a sync pass touches, borrowed for the duration of a run.
pub struct Syncer<'a> {
    pub source: &'a dyn CollectionSource,
    pub store: &'a RecordStore,
    pub media: Option<&'a MediaFetcher>,
    pub progress: &'a dyn ProgressReporter,
}

impl Syncer<'_> {
    /// Sync each collection in turn, saving `state` after every one.
    ///
    /// A failing collection is reported and skipped; a failure to save the
    /// state document aborts the run.
    pub async fn run(
        &self,
        collections: &[CollectionInfo],
        mode: SyncMode,
        state: &mut GlobalState,
        state_store: &StateStore,
    ) -> std::result::Result<SyncReport, PipelineError> {
        let mut report = SyncReport::default();

        for info in collections {
            let cs = state.collection_mut(&info.slug, &info.title);
            cs.title = info.title.clone();
            let result = self.sync_collection(info, mode, cs).await;
            state_store.save(state)?;
            report.collections.push(result);
        }

        Ok(report)
    }

    /// Run one collection pass and commit its watermarks into `cs`.
    pub async fn sync_collection(
        &self,
        info: &CollectionInfo,
        mode: SyncMode,
        cs: &mut CollectionState,
    ) -> CollectionReport {
        info!(collection = %info.slug, ?mode, "sync started");

        let mut report = CollectionReport::new(&info.slug);
        let mut seen = IdRange::default();

        report.end = match self.page_collection(info, mode, cs, &mut report, &mut seen).await {
            Ok(end) => end,
            Err(e) => {
                error!(
                    collection = %info.slug,
                    error = %e,
                    local = e.is_local(),
                    "sync aborted"
                );
                PassEnd::Failed(e.to_string())
            }
        };

        let reached_end = report.end == PassEnd::EndOfCollection;
        cs.commit(seen, report.created, reached_end, report.end.completeness());

        info!(
            collection = %info.slug,
            created = report.created,
            updated = report.updated,
            pages = report.pages,
            end = ?report.end,
            newest_id = ?cs.newest_id,
            oldest_id = ?cs.oldest_id,
            "sync finished"
        );
        report
    }

    async fn page_collection(
        &self,
        info: &CollectionInfo,
        mode: SyncMode,
        cs: &CollectionState,
        report: &mut CollectionReport,
        seen: &mut IdRange,
    ) -> std::result::Result<PassEnd, PipelineError> {
        let slug = info.slug.as_str();
        let floor = match mode {
            SyncMode::Backfill if cs.last_pass_complete => cs.oldest_id,
            _ => None,
        };
        let ceiling = match mode {
            SyncMode::Incremental if cs.last_pass_complete => cs.newest_id,
            _ => None,
        };

        let mut page_no = 1u32;
        let mut items_seen = 0u64;
        loop {
            let page = self.source.fetch_page(slug, page_no).await?;

            for item in &page.items {
                let mut merged = self.store.merge_record(item, slug)?;
                seen.observe(item.id);
                match merged.outcome {
                    MergeOutcome::Created => report.created += 1,
                    MergeOutcome::Updated => report.updated += 1,
                    MergeOutcome::Unchanged => report.unchanged += 1,
                }

                if let Some(media) = self.media {
                    match media.cache(self.store, &mut merged.record).await {
                        Ok(true) => report.media_cached += 1,
                        Ok(false) => {}
                        Err(e) => warn!(id = item.id, error = %e, "media download failed"),
                    }
                }
            }

            report.pages += 1;
            items_seen += page.items.len() as u64;
            self.progress.report(ProgressEvent::Paging {
                collection: slug.to_string(),
                page: page_no,
                items_seen,
            });

            if !page.has_more || page.items.is_empty() {
                return Ok(PassEnd::EndOfCollection);
            }
            if let Some(floor) = floor {
                if page.items.iter().any(|i| i.id <= floor) {
                    return Ok(PassEnd::BoundaryHit);
                }
            }
            if let Some(ceiling) = ceiling {
                if page.items.iter().any(|i| i.id <= ceiling) {
                    return Ok(PassEnd::CaughtUp);
                }
            }
            page_no += 1;
        }
    }
}

/// CLI entry point for `chx sync`.
pub async fn run_sync(config: &Config, opts: &SyncOptions, progress: ProgressMode) -> Result<()> {
    let source = HttpSource::new(&config.remote)?;
    let store = RecordStore::open(&config.store.root)?;
    let state_store = StateStore::open(&config.store.root);
    let mut state = state_store.load()?;

    let listed = match registry::refresh(&source, &config.store.root).await {
        Ok(listed) => listed,
        Err(e) if opts.collection.is_some() => {
            warn!(error = %e, "could not refresh collection listing");
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };
    let collections = registry::select(listed, opts.collection.as_deref(), &config.sync.collections);

    let media = if opts.download_media {
        Some(MediaFetcher::new(config.remote.timeout_secs)?)
    } else {
        None
    };
    let reporter = progress.reporter();

    let syncer = Syncer {
        source: &source,
        store: &store,
        media: media.as_ref(),
        progress: reporter.as_ref(),
    };
    let report = syncer
        .run(&collections, opts.mode, &mut state, &state_store)
        .await?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    for c in &report.collections {
        let end = match &c.end {
            PassEnd::EndOfCollection => "end of collection".to_string(),
            PassEnd::BoundaryHit => "reached backfill boundary".to_string(),
            PassEnd::CaughtUp => "caught up".to_string(),
            PassEnd::Failed(e) => format!("FAILED: {}", e),
        };
        println!("sync {}", c.slug);
        println!("  pages: {}", c.pages);
        println!("  new records: {}", c.created);
        println!("  updated records: {}", c.updated);
        if c.media_cached > 0 {
            println!("  media cached: {}", c.media_cached);
        }
        println!("  stopped: {}", end);
    }
    println!(
        "total: {} new, {} updated, {} failed collections",
        report.created(),
        report.updated(),
        report.failed()
    );
    if report.failed() == 0 {
        println!("ok");
    }
}
