//! Core domain types: IDs, progress entries, the mapping artifact, sheet rows
//! and discrepancy records.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DocBridgeError, Result};

/// Current schema version for persisted progress and report documents.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Splits an ID into a non-digit prefix, the first digit run, and the rest.
static ID_PARTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\D*)(\d+)(.*)$").expect("valid ID pattern"));

// ---------------------------------------------------------------------------
// TextId
// ---------------------------------------------------------------------------

/// Stable identifier of one text unit (e.g. `D1109`, `D3785a`).
///
/// IDs order naturally: by prefix, then by the numeric part as a number, then
/// by whatever follows it. `D2` sorts before `D10`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextId(String);

/// Borrowed view of the natural-order components of a [`TextId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts<'a> {
    pub prefix: &'a str,
    /// The digit run as written, leading zeros included.
    pub digits: &'a str,
    pub number: u64,
    pub suffix: &'a str,
}

impl TextId {
    /// Create an ID, trimming surrounding whitespace.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Natural-order components, or `None` when the ID has no digit run
    /// (or one too long to fit a `u64`).
    pub fn parts(&self) -> Option<IdParts<'_>> {
        let caps = ID_PARTS.captures(&self.0)?;
        let prefix = caps.get(1).map_or("", |m| m.as_str());
        let digits = caps.get(2)?.as_str();
        let number = digits.parse::<u64>().ok()?;
        let suffix = caps.get(3).map_or("", |m| m.as_str());
        Some(IdParts {
            prefix,
            digits,
            number,
            suffix,
        })
    }
}

impl Ord for TextId {
    fn cmp(&self, other: &Self) -> Ordering {
        let natural = match (self.parts(), other.parts()) {
            (Some(a), Some(b)) => a
                .prefix
                .cmp(b.prefix)
                .then(a.number.cmp(&b.number))
                .then(a.suffix.cmp(b.suffix)),
            (Some(a), None) => a.prefix.cmp(other.as_str()).then(Ordering::Greater),
            (None, Some(b)) => self.as_str().cmp(b.prefix).then(Ordering::Less),
            (None, None) => Ordering::Equal,
        };
        natural.then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for TextId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for TextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TextId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

/// Closed range `[start, end]` of IDs under natural ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRange {
    pub start: TextId,
    pub end: TextId,
}

impl IdRange {
    pub fn new(start: TextId, end: TextId) -> Result<Self> {
        if start.is_empty() || end.is_empty() {
            return Err(DocBridgeError::validation("ID range bounds must not be empty"));
        }
        if start > end {
            return Err(DocBridgeError::validation(format!(
                "start ID {start} sorts after end ID {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, id: &TextId) -> bool {
        *id >= self.start && *id <= self.end
    }
}

impl std::fmt::Display for IdRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Closed, 1-based range of table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: u32,
    pub end: u32,
}

impl RowRange {
    pub fn new(start: u32, end: u32) -> Result<Self> {
        if start == 0 {
            return Err(DocBridgeError::validation("rows are 1-based; start row must be >= 1"));
        }
        if start > end {
            return Err(DocBridgeError::validation(format!(
                "start row {start} is after end row {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of rows covered by the range.
    pub fn row_count(&self) -> usize {
        (self.end - self.start + 1) as usize
    }
}

// ---------------------------------------------------------------------------
// Corpus
// ---------------------------------------------------------------------------

/// One locally stored text unit, as produced by corpus enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub id: TextId,
    pub locator: ContentLocator,
}

/// Where the body of a [`TextUnit`] lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentLocator {
    /// A single `<ID>.txt` file.
    File(PathBuf),
    /// A `<ID>/` directory whose `*.txt` files are joined in name order.
    Directory(PathBuf),
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Opaque locator returned by the document-hosting service (a URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(pub String);

impl Reference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of one ID in the progress store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// An attempt started but its outcome was never recorded.
    Pending,
    Done,
    Failed,
    /// Local content was unusable. Not attempted again unless asked.
    Rejected,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }
}

/// Persisted record of the upload attempts for a single ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub id: TextId,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
    /// Number of attempts started for this ID across all runs.
    #[serde(default)]
    pub attempts: u32,
    /// SHA-256 of the body that was last sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_sha256: Option<String>,
}

/// The persisted progress document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressLog {
    pub schema_version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub entries: BTreeMap<TextId, ProgressEntry>,
}

impl Default for ProgressLog {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            updated_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// One `ID → reference` pair of the mapping artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRecord {
    pub id: TextId,
    pub reference: Reference,
}

/// The handoff artifact between the upload and reconcile phases.
///
/// Serialized as a flat JSON object `{ "<id>": "<reference>" }` in natural ID
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping(BTreeMap<TextId, Reference>);

impl Mapping {
    pub fn get(&self, id: &TextId) -> Option<&Reference> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<MappingRecord> for Mapping {
    fn from_iter<I: IntoIterator<Item = MappingRecord>>(iter: I) -> Self {
        Self(iter.into_iter().map(|r| (r.id, r.reference)).collect())
    }
}

// ---------------------------------------------------------------------------
// Table rows and discrepancies
// ---------------------------------------------------------------------------

/// One row as read from the destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// 1-based row number in the sheet.
    pub row_index: u32,
    pub id_cell: String,
    pub destination_cell: String,
}

/// A single-cell write staged by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellWrite {
    pub row_index: u32,
    /// Column letter(s), e.g. `L`.
    pub column: String,
    pub value: String,
}

/// A row whose ID has no entry in the mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyRecord {
    pub id: TextId,
    pub row_index: u32,
}

/// The persisted discrepancy report, replaced wholesale on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub rows: RowRange,
    pub discrepancies: Vec<DiscrepancyRecord>,
}
