//! Enrichment pass.
//!
//! Scans the record store for annotatable records that have not been
//! annotated yet (or all of them with `--force`), then calls the
//! configured [`Annotator`] once per record, strictly one at a time with
//! a fixed pause between calls.
//!
//! Each record is persisted as soon as its annotation returns. A failed
//! annotation is stored as [`Enrichment::Failed`] so later passes skip it
//! unless forced. After every record the enrichment counters are bumped
//! and the state document is saved, so a crash loses at most the record
//! in flight.

use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::annotator::{create_annotator, Annotator};
use crate::config::Config;
use crate::error::PipelineError;
use crate::models::{Annotation, Enrichment, Record, RecordId};
use crate::progress::{ProgressEvent, ProgressMode, ProgressReporter};
use crate::state::{GlobalState, StateStore};
use crate::store::RecordStore;

#[derive(Clone, Debug, Default)]
pub struct EnrichOptions {
    /// Re-annotate records that already carry an enrichment.
    pub force: bool,
    /// Scan and report only; no annotation calls, no writes.
    pub dry_run: bool,
    pub limit: Option<usize>,
    /// Only consider records that belong to this collection.
    pub collection: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub eligible: u64,
    pub analyzed: u64,
    pub failed: u64,
    /// Annotated but the record could not be written back.
    pub unsaved: u64,
    /// Record files that could not be read and were skipped.
    pub unreadable: u64,
}

/// Outcome of an eligibility scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scan {
    /// Eligible ids, newest first.
    pub ids: Vec<RecordId>,
    pub unreadable: u64,
}

/// Whether `record` should be sent for annotation.
pub fn is_eligible(record: &Record, annotatable_kind: &str, force: bool) -> bool {
    record.kind == annotatable_kind
        && record.media_url.is_some()
        && (record.enrichment.is_none() || force)
}

pub struct Enricher<'a> {
    pub store: &'a RecordStore,
    pub annotator: &'a dyn Annotator,
    pub annotatable_kind: &'a str,
    /// Minimum pause between two annotation calls.
    pub interval: Duration,
    pub progress: &'a dyn ProgressReporter,
}

impl Enricher<'_> {
    /// Records eligible under `opts`, newest first.
    ///
    /// Record files that fail to load are logged and counted, not fatal.
    pub fn scan(&self, opts: &EnrichOptions) -> std::result::Result<Scan, PipelineError> {
        let mut scan = Scan::default();
        for id in self.store.ids()?.into_iter().rev() {
            let record = match self.store.load(id) {
                Ok(r) => r,
                Err(e) => {
                    warn!(id, error = %e, "skipping unreadable record");
                    scan.unreadable += 1;
                    continue;
                }
            };
            if let Some(ref slug) = opts.collection {
                if !record.collections.contains(slug) {
                    continue;
                }
            }
            if is_eligible(&record, self.annotatable_kind, opts.force) {
                scan.ids.push(id);
                if opts.limit.is_some_and(|lim| scan.ids.len() >= lim) {
                    break;
                }
            }
        }
        Ok(scan)
    }

    /// Annotate every eligible record, checkpointing `state` after each.
    pub async fn run(
        &self,
        opts: &EnrichOptions,
        state: &mut GlobalState,
        state_store: &StateStore,
    ) -> std::result::Result<EnrichReport, PipelineError> {
        let Scan { ids, unreadable } = self.scan(opts)?;
        let total = ids.len();
        let mut report = EnrichReport {
            eligible: total as u64,
            unreadable,
            ..Default::default()
        };

        if opts.dry_run {
            for id in &ids {
                info!(id, "would annotate");
            }
            return Ok(report);
        }

        for (idx, id) in ids.iter().copied().enumerate() {
            let mut record = match self.store.load(id) {
                Ok(r) => r,
                Err(e) => {
                    warn!(id, error = %e, "record became unreadable, skipping");
                    report.unreadable += 1;
                    continue;
                }
            };
            let Some(media_url) = record.media_url.clone() else {
                continue;
            };

            let enrichment = match self
                .annotator
                .annotate(&media_url, record.text.as_deref())
                .await
            {
                Ok(payload) => {
                    report.analyzed += 1;
                    Enrichment::Analyzed(Annotation {
                        title: payload.title,
                        description: payload.description,
                        tags: payload.tags,
                        patterns: payload.patterns,
                        annotated_at: Utc::now(),
                        model: self.annotator.model_name().to_string(),
                    })
                }
                Err(e) => {
                    warn!(id, error = %e, "annotation failed");
                    report.failed += 1;
                    Enrichment::Failed {
                        error: e.to_string(),
                        annotated_at: Utc::now(),
                        model: self.annotator.model_name().to_string(),
                    }
                }
            };

            record.enrichment = Some(enrichment);
            match self.store.save(&record) {
                Ok(()) => {
                    state.enrichment.record_processed(record.collections.iter());
                    state_store.save(state)?;
                }
                Err(e) => {
                    error!(id, error = %e, "could not persist enrichment");
                    report.unsaved += 1;
                }
            }

            self.progress.report(ProgressEvent::Enriching {
                n: idx as u64 + 1,
                total: total as u64,
            });

            if idx + 1 < total && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }

        Ok(report)
    }
}

/// CLI entry point for `chx enrich`.
pub async fn run_enrich(config: &Config, opts: &EnrichOptions, progress: ProgressMode) -> Result<()> {
    if !config.enrichment.is_enabled() && !opts.dry_run {
        bail!("Enrichment provider is disabled. Set [enrichment] provider in config.");
    }

    let annotator = create_annotator(&config.enrichment)?;
    let store = RecordStore::open(&config.store.root)?;
    let state_store = StateStore::open(&config.store.root);
    let mut state = state_store.load()?;
    let reporter = progress.reporter();

    let enricher = Enricher {
        store: &store,
        annotator: annotator.as_ref(),
        annotatable_kind: &config.enrichment.annotatable_kind,
        interval: config.enrichment.min_interval(),
        progress: reporter.as_ref(),
    };
    let report = enricher.run(opts, &mut state, &state_store).await?;

    if opts.dry_run {
        println!("enrich (dry-run)");
        println!("  records needing annotation: {}", report.eligible);
        if report.unreadable > 0 {
            println!("  unreadable records skipped: {}", report.unreadable);
        }
        return Ok(());
    }

    println!("enrich");
    println!("  eligible: {}", report.eligible);
    println!("  analyzed: {}", report.analyzed);
    println!("  failed: {}", report.failed);
    if report.unsaved > 0 {
        println!("  not persisted: {}", report.unsaved);
    }
    if report.unreadable > 0 {
        println!("  unreadable records skipped: {}", report.unreadable);
    }
    println!("  total annotated (all runs): {}", state.enrichment.total_annotated);
    Ok(())
}
