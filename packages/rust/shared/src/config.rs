//! Application configuration for docbridge.
//!
//! User config lives at `~/.docbridge/docbridge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocBridgeError, Result};
use crate::types::{IdRange, RowRange};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docbridge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docbridge";

// ---------------------------------------------------------------------------
// Config structs (matching docbridge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where local content and persisted artifacts live.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Upload phase settings.
    #[serde(default)]
    pub upload: UploadSection,

    /// Destination sheet settings.
    #[serde(default)]
    pub sheet: SheetSection,

    /// Google API endpoints and credentials lookup.
    #[serde(default)]
    pub google: GoogleConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding `<ID>.txt` files or `<ID>/` directories.
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: String,

    /// Progress store location. `.jsonl` keeps an append-only journal,
    /// `.db`/`.sqlite` a libSQL table, anything else a single JSON document.
    #[serde(default = "default_progress_store")]
    pub progress_store: String,

    /// Mapping artifact handed from upload to reconcile.
    #[serde(default = "default_mapping_file")]
    pub mapping_file: String,

    /// Discrepancy report written by reconcile.
    #[serde(default = "default_discrepancy_report")]
    pub discrepancy_report: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            corpus_dir: default_corpus_dir(),
            progress_store: default_progress_store(),
            mapping_file: default_mapping_file(),
            discrepancy_report: default_discrepancy_report(),
        }
    }
}

fn default_corpus_dir() -> String {
    "data/text".into()
}
fn default_progress_store() -> String {
    "docbridge_output/progress.jsonl".into()
}
fn default_mapping_file() -> String {
    "docbridge_output/text_id_to_url_mapping.json".into()
}
fn default_discrepancy_report() -> String {
    "docbridge_output/missing_text_ids.json".into()
}

/// `[upload]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSection {
    /// First ID to process (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_id: Option<String>,

    /// Last ID to process (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_id: Option<String>,

    /// Optional file with one ID per line restricting the range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_list: Option<String>,

    /// Seconds to wait between upload attempts.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,

    /// Pacing strategy: "fixed" or "backoff".
    #[serde(default = "default_pacing")]
    pub pacing: String,

    /// Upper bound for the backoff delay, in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            start_id: None,
            end_id: None,
            id_list: None,
            delay_secs: default_delay_secs(),
            pacing: default_pacing(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

fn default_delay_secs() -> f64 {
    1.0
}
fn default_pacing() -> String {
    "fixed".into()
}
fn default_max_delay_secs() -> f64 {
    60.0
}

/// `[sheet]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetSection {
    /// Spreadsheet identifier.
    #[serde(default)]
    pub spreadsheet_id: String,

    /// Tab (sheet) name inside the spreadsheet.
    #[serde(default)]
    pub tab: String,

    /// Column holding the text ID.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Column receiving the reference.
    #[serde(default = "default_destination_column")]
    pub destination_column: String,

    /// First row to reconcile (1-based, inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_row: Option<u32>,

    /// Last row to reconcile (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_row: Option<u32>,
}

impl Default for SheetSection {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            tab: String::new(),
            id_column: default_id_column(),
            destination_column: default_destination_column(),
            start_row: None,
            end_row: None,
        }
    }
}

fn default_id_column() -> String {
    "J".into()
}
fn default_destination_column() -> String {
    "L".into()
}

/// `[google]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Name of the env var holding an OAuth access token (never the token itself).
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Google Docs API base URL.
    #[serde(default = "default_docs_api")]
    pub docs_api_base: String,

    /// Google Sheets API base URL.
    #[serde(default = "default_sheets_api")]
    pub sheets_api_base: String,

    /// Google Drive API base URL.
    #[serde(default = "default_drive_api")]
    pub drive_api_base: String,

    /// Drive folder new documents are moved into, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            access_token_env: default_access_token_env(),
            docs_api_base: default_docs_api(),
            sheets_api_base: default_sheets_api(),
            drive_api_base: default_drive_api(),
            folder_id: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_access_token_env() -> String {
    "GOOGLE_ACCESS_TOKEN".into()
}
fn default_docs_api() -> String {
    "https://docs.googleapis.com".into()
}
fn default_sheets_api() -> String {
    "https://sheets.googleapis.com".into()
}
fn default_drive_api() -> String {
    "https://www.googleapis.com".into()
}
fn default_timeout_secs() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// How the orchestrator paces consecutive upload attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacingConfig {
    /// Constant pause after every attempt.
    Fixed { delay: Duration },
    /// Pause doubles after each failure (up to `max`), resets on success.
    Backoff { base: Duration, max: Duration },
}

impl PacingConfig {
    /// Build from the `[upload]` section.
    pub fn from_section(section: &UploadSection) -> Result<Self> {
        let base = secs_to_duration(section.delay_secs, "delay_secs")?;
        match section.pacing.as_str() {
            "fixed" => Ok(Self::Fixed { delay: base }),
            "backoff" => {
                let max = secs_to_duration(section.max_delay_secs, "max_delay_secs")?;
                if max < base {
                    return Err(DocBridgeError::config(
                        "max_delay_secs must be at least delay_secs",
                    ));
                }
                Ok(Self::Backoff { base, max })
            }
            other => Err(DocBridgeError::config(format!(
                "unknown pacing '{other}': expected 'fixed' or 'backoff'"
            ))),
        }
    }
}

fn secs_to_duration(secs: f64, field: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| DocBridgeError::config(format!("{field} must be a non-negative number")))
}

/// Runtime upload configuration.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub corpus_dir: PathBuf,
    pub range: IdRange,
    pub id_list: Option<PathBuf>,
    pub pacing: PacingConfig,
    pub progress_store: PathBuf,
    pub mapping_file: PathBuf,
    /// Stop after this many upload attempts.
    pub limit: Option<usize>,
    /// Attempt IDs whose content was rejected in an earlier run.
    pub retry_rejected: bool,
}

/// Column layout of the destination sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub spreadsheet_id: String,
    pub tab: String,
    pub id_column: String,
    pub destination_column: String,
}

impl SheetLayout {
    /// Validate and normalize the `[sheet]` section.
    pub fn from_section(section: &SheetSection) -> Result<Self> {
        if section.spreadsheet_id.trim().is_empty() {
            return Err(DocBridgeError::config("sheet.spreadsheet_id is not set"));
        }
        if section.tab.trim().is_empty() {
            return Err(DocBridgeError::config("sheet.tab is not set"));
        }
        let id_column = normalize_column(&section.id_column)?;
        let destination_column = normalize_column(&section.destination_column)?;
        if column_index(&destination_column) < column_index(&id_column) {
            return Err(DocBridgeError::config(
                "destination column must not come before the ID column",
            ));
        }
        Ok(Self {
            spreadsheet_id: section.spreadsheet_id.trim().to_string(),
            tab: section.tab.clone(),
            id_column,
            destination_column,
        })
    }

    /// Zero-based offset of the destination column within a row read from
    /// the ID column onwards.
    pub fn destination_offset(&self) -> usize {
        column_index(&self.destination_column) - column_index(&self.id_column)
    }
}

/// Longest column name a sheet can have (`XFD`).
const MAX_COLUMN_LETTERS: usize = 3;

/// Uppercase a column letter sequence, rejecting anything but one to three
/// letters A–Z.
fn normalize_column(raw: &str) -> Result<String> {
    let col = raw.trim().to_ascii_uppercase();
    if col.is_empty()
        || col.len() > MAX_COLUMN_LETTERS
        || !col.chars().all(|c| c.is_ascii_uppercase())
    {
        return Err(DocBridgeError::config(format!(
            "invalid column '{raw}': expected one to three letters like 'J' or 'AB'"
        )));
    }
    Ok(col)
}

/// Zero-based index of a column already checked by [`normalize_column`]
/// (`A` → 0, `Z` → 25, `AA` → 26).
fn column_index(col: &str) -> usize {
    col.bytes()
        .fold(0usize, |acc, b| acc * 26 + usize::from(b - b'A' + 1))
        - 1
}

/// Runtime reconciliation configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub rows: RowRange,
    pub mapping_file: PathBuf,
    pub discrepancy_report: PathBuf,
    /// Compute the plan without writing to the table.
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docbridge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocBridgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docbridge/docbridge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocBridgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocBridgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocBridgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(DocBridgeError::config(format!(
            "{} already exists; refusing to overwrite",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocBridgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocBridgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the access token from the env var named in the config.
pub fn access_token(config: &GoogleConfig) -> Result<String> {
    let var_name = &config.access_token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(DocBridgeError::config(format!(
            "Google access token not found. Set the {var_name} environment variable \
             (e.g. from `gcloud auth print-access-token`)."
        ))),
    }
}
