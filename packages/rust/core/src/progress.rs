//! Durable per-ID upload progress.
//!
//! Every state change is saved before the call returns, so a run killed at
//! any point resumes from what is on disk.

use chrono::Utc;
use tracing::{debug, warn};

use docbridge_shared::{
    CURRENT_SCHEMA_VERSION, DocBridgeError, ProgressEntry, ProgressLog, ProgressStatus, Reference,
    Result, TextId,
};
use docbridge_storage::ProgressPersistence;

/// Result of one upload attempt, as recorded in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Uploaded(Reference),
    Failed(String),
}

/// Counts of entries by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSummary {
    pub done: usize,
    pub failed: usize,
    pub pending: usize,
    pub rejected: usize,
}

impl ProgressSummary {
    pub fn total(&self) -> usize {
        self.done + self.failed + self.pending + self.rejected
    }
}

/// Progress log plus the backend it is persisted to.
pub struct ProgressStore<P> {
    backend: P,
    log: ProgressLog,
}

impl<P: ProgressPersistence> ProgressStore<P> {
    /// Load the log from `backend`. A missing document is an empty log.
    pub async fn load(backend: P) -> Result<Self> {
        let log = match backend.load().await? {
            Some(log) => {
                check_integrity(&log, &backend.location())?;
                log
            }
            None => {
                debug!(location = %backend.location(), "no progress yet, starting empty");
                ProgressLog::default()
            }
        };
        Ok(Self { backend, log })
    }

    pub fn log(&self) -> &ProgressLog {
        &self.log
    }

    pub fn location(&self) -> String {
        self.backend.location()
    }

    pub fn get(&self, id: &TextId) -> Option<&ProgressEntry> {
        self.log.entries.get(id)
    }

    pub fn is_done(&self, id: &TextId) -> bool {
        self.get(id)
            .is_some_and(|entry| entry.status == ProgressStatus::Done)
    }

    /// All entries in natural ID order.
    pub fn entries(&self) -> impl Iterator<Item = &ProgressEntry> {
        self.log.entries.values()
    }

    /// Entries whose last recorded attempt failed.
    pub fn failed(&self) -> impl Iterator<Item = &ProgressEntry> {
        self.with_status(ProgressStatus::Failed)
    }

    /// Entries whose local content was rejected.
    pub fn rejected(&self) -> impl Iterator<Item = &ProgressEntry> {
        self.with_status(ProgressStatus::Rejected)
    }

    fn with_status(&self, status: ProgressStatus) -> impl Iterator<Item = &ProgressEntry> {
        self.entries().filter(move |entry| entry.status == status)
    }

    pub fn summary(&self) -> ProgressSummary {
        self.entries()
            .fold(ProgressSummary::default(), |mut acc, entry| {
                match entry.status {
                    ProgressStatus::Done => acc.done += 1,
                    ProgressStatus::Failed => acc.failed += 1,
                    ProgressStatus::Pending => acc.pending += 1,
                    ProgressStatus::Rejected => acc.rejected += 1,
                }
                acc
            })
    }

    /// Durably mark `id` as in flight before its upload call is made.
    ///
    /// An ID that is already `done` is never attempted again.
    pub async fn begin_attempt(&mut self, id: &TextId, content_sha256: Option<String>) -> Result<()> {
        let previous = self.get(id);
        if previous.is_some_and(|entry| entry.status == ProgressStatus::Done) {
            return Err(DocBridgeError::validation(format!(
                "{id} is already uploaded; refusing a second attempt"
            )));
        }

        let entry = ProgressEntry {
            id: id.clone(),
            status: ProgressStatus::Pending,
            reference: None,
            error: None,
            attempted_at: Utc::now(),
            attempts: previous.map_or(0, |entry| entry.attempts) + 1,
            content_sha256,
        };
        self.commit(entry).await
    }

    /// Durably record the outcome of an attempt.
    ///
    /// The first success wins: recording anything against an ID that is
    /// already `done` leaves the entry untouched.
    pub async fn record(&mut self, id: &TextId, outcome: Outcome) -> Result<()> {
        let previous = self.get(id).cloned();
        if let Some(entry) = previous.as_ref().filter(|e| e.status == ProgressStatus::Done) {
            warn!(
                %id,
                kept = %entry.reference.as_ref().map_or("", |r| r.as_str()),
                "outcome recorded for an ID that is already done; keeping the first reference"
            );
            return Ok(());
        }

        let (status, reference, error) = match outcome {
            Outcome::Uploaded(reference) => (ProgressStatus::Done, Some(reference), None),
            Outcome::Failed(message) => (ProgressStatus::Failed, None, Some(message)),
        };
        let entry = ProgressEntry {
            id: id.clone(),
            status,
            reference,
            error,
            attempted_at: Utc::now(),
            attempts: previous.as_ref().map_or(1, |e| e.attempts.max(1)),
            content_sha256: previous.and_then(|e| e.content_sha256),
        };
        self.commit(entry).await
    }

    /// Durably mark `id` as having unusable local content.
    ///
    /// A rejected ID is skipped by later runs until an operator asks for it
    /// again. An ID that is already `done` is left untouched.
    pub async fn reject(&mut self, id: &TextId, reason: String) -> Result<()> {
        let previous = self.get(id).cloned();
        if previous
            .as_ref()
            .is_some_and(|e| e.status == ProgressStatus::Done)
        {
            warn!(%id, "content rejected for an ID that is already done; ignoring");
            return Ok(());
        }

        let entry = ProgressEntry {
            id: id.clone(),
            status: ProgressStatus::Rejected,
            reference: None,
            error: Some(reason),
            attempted_at: Utc::now(),
            attempts: previous.as_ref().map_or(0, |e| e.attempts),
            content_sha256: previous.and_then(|e| e.content_sha256),
        };
        self.commit(entry).await
    }

    /// Apply `entry` and save it. On a failed save the in-memory log is
    /// rolled back so it never runs ahead of what is durable.
    async fn commit(&mut self, entry: ProgressEntry) -> Result<()> {
        let id = entry.id.clone();
        let previous_entry = self.log.entries.insert(id.clone(), entry.clone());
        let previous_stamp = std::mem::replace(&mut self.log.updated_at, Utc::now());

        if let Err(e) = self.backend.save_entry(&self.log, &entry).await {
            match previous_entry {
                Some(old) => self.log.entries.insert(id, old),
                None => self.log.entries.remove(&id),
            };
            self.log.updated_at = previous_stamp;
            return Err(e);
        }
        Ok(())
    }
}

/// Reject logs this build cannot interpret safely.
fn check_integrity(log: &ProgressLog, location: &str) -> Result<()> {
    if log.schema_version > CURRENT_SCHEMA_VERSION {
        return Err(DocBridgeError::Storage(format!(
            "{location}: schema version {} is newer than supported ({CURRENT_SCHEMA_VERSION})",
            log.schema_version
        )));
    }
    for (key, entry) in &log.entries {
        if *key != entry.id {
            return Err(DocBridgeError::Storage(format!(
                "{location}: entry keyed {key} carries id {}",
                entry.id
            )));
        }
        if entry.status == ProgressStatus::Done && entry.reference.is_none() {
            return Err(DocBridgeError::Storage(format!(
                "{location}: {key} is done but has no reference"
            )));
        }
    }
    Ok(())
}
