//! Upload orchestration: walk the enumerated units in order, skip what is
//! already done, upload the rest one at a time and record every outcome.

use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{Span, debug, info, instrument, warn};
use uuid::Uuid;

use docbridge_shared::{ProgressStatus, Result, TextId, TextUnit, Uploader};
use docbridge_storage::ProgressPersistence;

use crate::corpus;
use crate::pacing::{AttemptResult, Pacer};
use crate::pipeline::{ProgressReporter, UnitOutcome};
use crate::progress::{Outcome, ProgressStore};

/// One ID that did not make it through this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub id: TextId,
    pub message: String,
    /// Whether a later run may succeed without any local change.
    pub transient: bool,
}

/// Result of one orchestrator run.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub run_id: Uuid,
    /// Units handed to the run.
    pub selected: usize,
    pub uploaded: usize,
    /// Units skipped because the store already had them as done.
    pub skipped_done: usize,
    /// Units skipped because an earlier run rejected their content.
    pub skipped_rejected: usize,
    /// Remote failures, recorded in the store and retried next run.
    pub failures: Vec<UploadFailure>,
    /// Local content problems found in this run, recorded as rejected.
    pub content_errors: Vec<UploadFailure>,
    /// Units left untouched because the attempt limit was reached.
    pub deferred: usize,
    /// IDs expected in the range that had no local content.
    pub missing: Vec<TextId>,
    pub elapsed: Duration,
}

impl UploadReport {
    fn new(run_id: Uuid, selected: usize) -> Self {
        Self {
            run_id,
            selected,
            uploaded: 0,
            skipped_done: 0,
            skipped_rejected: 0,
            failures: Vec::new(),
            content_errors: Vec::new(),
            deferred: 0,
            missing: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn attempted(&self) -> usize {
        self.uploaded + self.failures.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty() || !self.content_errors.is_empty()
    }
}

/// Drives uploads through an [`Uploader`], paced by a [`Pacer`].
pub struct UploadOrchestrator<U, C> {
    uploader: U,
    pacer: C,
    limit: Option<usize>,
    retry_rejected: bool,
}

impl<U: Uploader, C: Pacer> UploadOrchestrator<U, C> {
    pub fn new(uploader: U, pacer: C) -> Self {
        Self {
            uploader,
            pacer,
            limit: None,
            retry_rejected: false,
        }
    }

    /// Stop after `limit` upload attempts.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Also attempt IDs whose content an earlier run rejected.
    pub fn with_retry_rejected(mut self, retry: bool) -> Self {
        self.retry_rejected = retry;
        self
    }

    /// Upload every unit of `units` not already done, in order.
    ///
    /// Upload failures and unusable content are recorded and the run moves
    /// on. A failure to persist progress aborts the run immediately.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, units = units.len()))]
    pub async fn run<P>(
        &mut self,
        units: &[TextUnit],
        store: &mut ProgressStore<P>,
        progress: &dyn ProgressReporter,
    ) -> Result<UploadReport>
    where
        P: ProgressPersistence,
    {
        let started = Instant::now();
        let run_id = Uuid::now_v7();
        Span::current().record("run_id", tracing::field::display(run_id));
        info!(units = units.len(), store = %store.location(), "upload run started");

        let mut report = UploadReport::new(run_id, units.len());
        let mut pending_delay: Option<Duration> = None;

        for (index, unit) in units.iter().enumerate() {
            let current = index + 1;
            let id = &unit.id;

            if store.is_done(id) {
                debug!(%id, "already uploaded, skipping");
                report.skipped_done += 1;
                progress.unit_finished(id, UnitOutcome::Skipped, current, units.len());
                continue;
            }

            let rejected = store
                .get(id)
                .is_some_and(|entry| entry.status == ProgressStatus::Rejected);
            if rejected && !self.retry_rejected {
                debug!(%id, "content rejected in an earlier run, skipping");
                report.skipped_rejected += 1;
                progress.unit_finished(id, UnitOutcome::Skipped, current, units.len());
                continue;
            }

            if self.limit.is_some_and(|limit| report.attempted() >= limit) {
                report.deferred = units[index..]
                    .iter()
                    .filter(|u| !store.is_done(&u.id))
                    .count();
                info!(deferred = report.deferred, "attempt limit reached, stopping");
                break;
            }

            let body = match corpus::load_content(unit) {
                Ok(body) => body,
                Err(e) => {
                    warn!(%id, error = %e, "rejecting unit with unusable content");
                    store.reject(id, e.to_string()).await?;
                    report.content_errors.push(UploadFailure {
                        id: id.clone(),
                        message: e.to_string(),
                        transient: false,
                    });
                    progress.unit_finished(id, UnitOutcome::Unreadable, current, units.len());
                    continue;
                }
            };

            if let Some(delay) = pending_delay.take() {
                self.pacer.wait(delay).await;
            }

            if store
                .get(id)
                .is_some_and(|entry| entry.status == ProgressStatus::Pending)
            {
                warn!(
                    %id,
                    "previous attempt was interrupted; a duplicate remote document may exist"
                );
            }

            store.begin_attempt(id, Some(content_hash(&body))).await?;

            let result = match self.uploader.upload(id, &body).await {
                Ok(reference) => {
                    info!(%id, %reference, "uploaded");
                    store.record(id, Outcome::Uploaded(reference)).await?;
                    report.uploaded += 1;
                    progress.unit_finished(id, UnitOutcome::Uploaded, current, units.len());
                    AttemptResult::Succeeded
                }
                Err(e) => {
                    let transient = e.is_transient();
                    warn!(%id, error = %e, transient, "upload failed");
                    store.record(id, Outcome::Failed(e.to_string())).await?;
                    report.failures.push(UploadFailure {
                        id: id.clone(),
                        message: e.to_string(),
                        transient,
                    });
                    progress.unit_finished(id, UnitOutcome::Failed, current, units.len());
                    AttemptResult::Failed
                }
            };
            pending_delay = Some(self.pacer.next_delay(result));
        }

        report.elapsed = started.elapsed();
        info!(
            uploaded = report.uploaded,
            failed = report.failures.len(),
            skipped = report.skipped_done,
            skipped_rejected = report.skipped_rejected,
            content_errors = report.content_errors.len(),
            deferred = report.deferred,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "upload run finished"
        );
        Ok(report)
    }
}

/// SHA-256 of the body, hex encoded.
fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}
