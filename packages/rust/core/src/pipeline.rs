//! End-to-end flows: `upload` (corpus → uploads → mapping), `export`
//! (progress → mapping) and `reconcile` (mapping → table + discrepancies).
//!
//! The two halves only meet through the persisted mapping file.

use std::path::Path;

use tracing::{info, instrument, warn};

use docbridge_shared::{
    DiscrepancyReport, Mapping, ReconcileConfig, Result, TableStore, TextId, UploadConfig,
    Uploader,
};
use docbridge_storage::{Backend, ProgressBackend};

use crate::corpus::{self, CorpusEnumerator};
use crate::discrepancy::DiscrepancyTracker;
use crate::mapping;
use crate::pacing::Pacing;
use crate::progress::ProgressStore;
use crate::reconcile::{ReconcileReport, TableReconciler};
use crate::upload::{UploadOrchestrator, UploadReport};

/// Document keys used when an artifact lives in a libSQL database.
const MAPPING_KEY: &str = "mapping";
const DISCREPANCY_KEY: &str = "discrepancies";

/// How a single unit ended in an upload run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Uploaded,
    Failed,
    /// Already done, or content rejected in an earlier run.
    Skipped,
    /// Local content unreadable or empty; recorded as rejected.
    Unreadable,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each unit of an upload run.
    fn unit_finished(&self, id: &TextId, outcome: UnitOutcome, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn unit_finished(&self, _id: &TextId, _outcome: UnitOutcome, _current: usize, _total: usize) {}
}

/// Open the progress store at `path`.
pub async fn open_progress(path: &Path) -> Result<ProgressStore<ProgressBackend>> {
    let backend = ProgressBackend::open(path).await?;
    ProgressStore::load(backend).await
}

/// Run the upload phase.
///
/// 1. Enumerate the corpus for the configured range
/// 2. Upload every unit not already done, recording each outcome
/// 3. Export the mapping from the progress store
#[instrument(skip_all, fields(range = %config.range, corpus = %config.corpus_dir.display()))]
pub async fn upload_corpus<U: Uploader>(
    config: &UploadConfig,
    uploader: U,
    progress: &dyn ProgressReporter,
) -> Result<UploadReport> {
    progress.phase("Scanning corpus");
    let mut enumerator = CorpusEnumerator::new(&config.corpus_dir);
    if let Some(list) = &config.id_list {
        let ids = corpus::read_id_list(list)?;
        info!(ids = ids.len(), list = %list.display(), "restricting to ID list");
        enumerator = enumerator.with_id_list(ids);
    }
    let enumeration = enumerator.enumerate(&config.range)?;

    progress.phase("Loading progress");
    let mut store = open_progress(&config.progress_store).await?;

    progress.phase("Uploading");
    let mut orchestrator = UploadOrchestrator::new(uploader, Pacing::from(config.pacing))
        .with_limit(config.limit)
        .with_retry_rejected(config.retry_rejected);
    let mut report = orchestrator
        .run(&enumeration.units, &mut store, progress)
        .await?;
    report.missing = enumeration.missing;

    progress.phase("Exporting mapping");
    let target = Backend::<Mapping>::open(&config.mapping_file, MAPPING_KEY).await?;
    mapping::export_to(store.log(), &target).await?;

    Ok(report)
}

/// Re-export the mapping from an existing progress store.
#[instrument(skip_all, fields(progress = %progress_path.display()))]
pub async fn export_mapping(progress_path: &Path, mapping_path: &Path) -> Result<Mapping> {
    let store = open_progress(progress_path).await?;
    if store.summary().done == 0 {
        warn!(store = %store.location(), "no completed uploads; the mapping will be empty");
    }
    let target = Backend::<Mapping>::open(mapping_path, MAPPING_KEY).await?;
    mapping::export_to(store.log(), &target).await
}

/// The discrepancy report left by the last reconcile run, with its location.
pub async fn last_discrepancies(report_path: &Path) -> Result<(String, Option<DiscrepancyReport>)> {
    let tracker = DiscrepancyTracker::new(
        Backend::<DiscrepancyReport>::open(report_path, DISCREPANCY_KEY).await?,
    );
    Ok((tracker.location(), tracker.last().await?))
}

/// Run the reconcile phase against `table`.
#[instrument(skip_all, fields(rows = ?config.rows, dry_run = config.dry_run))]
pub async fn reconcile_table<T: TableStore>(
    config: &ReconcileConfig,
    table: T,
    destination_column: &str,
    progress: &dyn ProgressReporter,
) -> Result<ReconcileReport> {
    progress.phase("Loading mapping");
    let source = Backend::<Mapping>::open(&config.mapping_file, MAPPING_KEY).await?;
    let mapping = mapping::load(&source).await?;
    info!(records = mapping.len(), "mapping loaded");

    let tracker = DiscrepancyTracker::new(
        Backend::<DiscrepancyReport>::open(&config.discrepancy_report, DISCREPANCY_KEY).await?,
    );

    progress.phase("Reconciling table");
    TableReconciler::new(table, destination_column)
        .reconcile(&mapping, config.rows, &tracker, config.dry_run)
        .await
}
