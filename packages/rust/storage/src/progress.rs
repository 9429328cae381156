//! Progress log persistence, written one entry at a time.
//!
//! The progress log is saved after every state change of every ID, so
//! rewriting the whole document per change grows quadratically with the
//! range. [`ProgressPersistence::save_entry`] lets a backend store just the
//! changed entry:
//! - [`ProgressJournal`]: JSON lines, one appended line per change
//! - [`SqliteProgress`](crate::SqliteProgress): one upserted row per change
//! - [`JsonFile`] / [`MemoryCell`]: whole-document rewrite

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use docbridge_shared::{DocBridgeError, ProgressEntry, ProgressLog, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::json::write_atomic;
use crate::{JsonFile, MemoryCell, Persistence, SqliteProgress, Storage, is_sqlite_path};

/// Superseded lines tolerated before a journal is compacted on load.
const COMPACT_SLACK: usize = 1024;

/// Persistence for the progress log that can store a single changed entry.
#[allow(async_fn_in_trait)]
pub trait ProgressPersistence: Persistence<ProgressLog> {
    /// Persist `entry`, the only change to `log` since the last save. `log`
    /// already contains it. Returns only once the change is durable.
    async fn save_entry(&self, log: &ProgressLog, _entry: &ProgressEntry) -> Result<()> {
        self.save(log).await
    }
}

impl ProgressPersistence for MemoryCell<ProgressLog> {}

impl ProgressPersistence for JsonFile<ProgressLog> {}

// ---------------------------------------------------------------------------
// JSON lines journal
// ---------------------------------------------------------------------------

/// First line of a journal file.
#[derive(Debug, Serialize, Deserialize)]
struct JournalHeader {
    schema_version: u32,
}

/// Progress log kept as JSON lines: a header line, then one [`ProgressEntry`]
/// per line. Later lines for an ID supersede earlier ones.
///
/// Changes are appended and fsynced. A crash mid-append leaves at most one
/// torn final line, which is ignored on load and dropped by the next
/// compaction.
pub struct ProgressJournal {
    path: PathBuf,
    compact_next: AtomicBool,
}

impl ProgressJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            compact_next: AtomicBool::new(false),
        }
    }

    fn snapshot(log: &ProgressLog) -> Result<Vec<u8>> {
        let mut body = to_line(&JournalHeader {
            schema_version: log.schema_version,
        })?;
        for entry in log.entries.values() {
            body.extend(to_line(entry)?);
        }
        Ok(body)
    }

    fn append(&self, line: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(line)?;
        file.sync_data()
    }
}

fn to_line<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(value)
        .map_err(|e| DocBridgeError::Storage(format!("serialize failed: {e}")))?;
    line.push(b'\n');
    Ok(line)
}

impl Persistence<ProgressLog> for ProgressJournal {
    async fn load(&self) -> Result<Option<ProgressLog>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no journal yet");
                return Ok(None);
            }
            Err(e) => return Err(DocBridgeError::io(&self.path, e)),
        };

        let invalid = |line: usize, e: serde_json::Error| {
            DocBridgeError::Storage(format!("{}:{line} is not valid: {e}", self.path.display()))
        };

        let last_line = content.lines().count();
        let torn_tail = !content.ends_with('\n');
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line))
            .filter(|(_, line)| !line.trim().is_empty());

        let Some((number, first)) = lines.next() else {
            return Ok(None);
        };
        let header: JournalHeader = serde_json::from_str(first).map_err(|e| invalid(number, e))?;

        let mut entries = BTreeMap::new();
        let mut records = 0usize;
        for (number, line) in lines {
            match serde_json::from_str::<ProgressEntry>(line) {
                Ok(entry) => {
                    records += 1;
                    entries.insert(entry.id.clone(), entry);
                }
                Err(e) if torn_tail && number == last_line => {
                    warn!(
                        path = %self.path.display(),
                        line = number,
                        error = %e,
                        "ignoring incomplete final journal line"
                    );
                    self.compact_next.store(true, Ordering::SeqCst);
                }
                Err(e) => return Err(invalid(number, e)),
            }
        }

        if records > 2 * entries.len() + COMPACT_SLACK {
            debug!(records, entries = entries.len(), "journal will be compacted");
            self.compact_next.store(true, Ordering::SeqCst);
        }

        let updated_at = entries
            .values()
            .map(|entry: &ProgressEntry| entry.attempted_at)
            .max()
            .unwrap_or_else(Utc::now);
        Ok(Some(ProgressLog {
            schema_version: header.schema_version,
            updated_at,
            entries,
        }))
    }

    async fn save(&self, value: &ProgressLog) -> Result<()> {
        let body = Self::snapshot(value)?;
        write_atomic(&self.path, &body)?;
        self.compact_next.store(false, Ordering::SeqCst);
        info!(
            path = %self.path.display(),
            entries = value.entries.len(),
            "progress journal rewritten"
        );
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

impl ProgressPersistence for ProgressJournal {
    async fn save_entry(&self, log: &ProgressLog, entry: &ProgressEntry) -> Result<()> {
        if self.compact_next.load(Ordering::SeqCst) || !self.path.exists() {
            return self.save(log).await;
        }

        let line = to_line(entry)?;
        if let Err(e) = self.append(&line) {
            // The append may have left a partial line behind.
            self.compact_next.store(true, Ordering::SeqCst);
            return Err(DocBridgeError::io(&self.path, e));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// On-disk progress persistence selected by path extension.
pub enum ProgressBackend {
    Json(JsonFile<ProgressLog>),
    Journal(ProgressJournal),
    Sqlite(SqliteProgress),
}

impl ProgressBackend {
    /// `.db`/`.sqlite` files use a libSQL table with one row per ID, `.jsonl`
    /// files a [`ProgressJournal`], anything else a compact JSON document.
    pub async fn open(path: &Path) -> Result<Self> {
        if is_sqlite_path(path) {
            let storage = Storage::open(path).await?;
            return Ok(Self::Sqlite(SqliteProgress::new(storage.into())));
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") => Ok(Self::Journal(ProgressJournal::new(path))),
            _ => Ok(Self::Json(JsonFile::compact(path))),
        }
    }
}

impl Persistence<ProgressLog> for ProgressBackend {
    async fn load(&self) -> Result<Option<ProgressLog>> {
        match self {
            Self::Json(inner) => inner.load().await,
            Self::Journal(inner) => inner.load().await,
            Self::Sqlite(inner) => inner.load().await,
        }
    }

    async fn save(&self, value: &ProgressLog) -> Result<()> {
        match self {
            Self::Json(inner) => inner.save(value).await,
            Self::Journal(inner) => inner.save(value).await,
            Self::Sqlite(inner) => inner.save(value).await,
        }
    }

    fn location(&self) -> String {
        match self {
            Self::Json(inner) => inner.location(),
            Self::Journal(inner) => inner.location(),
            Self::Sqlite(inner) => inner.location(),
        }
    }
}

impl ProgressPersistence for ProgressBackend {
    async fn save_entry(&self, log: &ProgressLog, entry: &ProgressEntry) -> Result<()> {
        match self {
            Self::Json(inner) => inner.save_entry(log, entry).await,
            Self::Journal(inner) => inner.save_entry(log, entry).await,
            Self::Sqlite(inner) => inner.save_entry(log, entry).await,
        }
    }
}
