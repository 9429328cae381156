//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docbridge_core::pipeline::{self, ProgressReporter, UnitOutcome};
use docbridge_core::upload::UploadReport;
use docbridge_google::{DocsUploader, GoogleClient, SheetsTable};
use docbridge_shared::{
    AppConfig, IdRange, PacingConfig, ReconcileConfig, RowRange, SheetLayout, TextId,
    UploadConfig, access_token, init_config, load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docbridge: upload a text corpus as documents and link them from a sheet.
#[derive(Parser)]
#[command(
    name = "docbridge",
    version,
    about = "Upload a local text corpus as hosted documents and reconcile the links into a spreadsheet.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.docbridge/docbridge.toml).
    #[arg(long, env = "DOCBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Also append plain-text logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Upload every text unit in the ID range that is not already uploaded.
    Upload {
        /// First ID (inclusive).
        #[arg(long)]
        start: Option<String>,

        /// Last ID (inclusive).
        #[arg(long)]
        end: Option<String>,

        /// Corpus directory.
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// File with one ID per line; only these IDs are uploaded.
        #[arg(long)]
        id_list: Option<PathBuf>,

        /// Seconds to pause between upload attempts.
        #[arg(long)]
        delay: Option<f64>,

        /// Double the pause after each failure instead of keeping it fixed.
        #[arg(long)]
        backoff: bool,

        /// Progress store location.
        #[arg(long)]
        progress: Option<PathBuf>,

        /// Mapping file written at the end of the run.
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Stop after this many upload attempts.
        #[arg(long)]
        limit: Option<usize>,

        /// Also attempt IDs whose content was rejected in an earlier run.
        #[arg(long)]
        retry_rejected: bool,
    },

    /// Rewrite the mapping file from the progress store.
    Export {
        #[arg(long)]
        progress: Option<PathBuf>,

        #[arg(long)]
        mapping: Option<PathBuf>,
    },

    /// Write mapped references into empty destination cells of the sheet.
    Reconcile {
        /// First row (1-based, inclusive).
        #[arg(long)]
        start_row: Option<u32>,

        /// Last row (inclusive).
        #[arg(long)]
        end_row: Option<u32>,

        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Where to write IDs that have no mapping entry.
        #[arg(long)]
        discrepancies: Option<PathBuf>,

        /// Spreadsheet ID.
        #[arg(long, env = "DOCBRIDGE_SPREADSHEET")]
        spreadsheet: Option<String>,

        /// Tab name.
        #[arg(long)]
        tab: Option<String>,

        /// Compute the plan without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show progress store counts, failed and rejected IDs, and the last
    /// discrepancy report.
    Status {
        #[arg(long)]
        progress: Option<PathBuf>,

        /// Discrepancy report to summarize.
        #[arg(long)]
        discrepancies: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    let filter = match cli.verbose {
        0 => "docbridge=info",
        1 => "docbridge=debug",
        _ => "docbridge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    let console = match cli.log_format {
        LogFormat::Text => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };

    let file = match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| eyre!("cannot open log file {}: {e}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();
    Ok(())
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Upload {
            start,
            end,
            corpus,
            id_list,
            delay,
            backoff,
            progress,
            mapping,
            limit,
            retry_rejected,
        } => {
            let args = UploadArgs {
                start,
                end,
                corpus,
                id_list,
                delay,
                backoff,
                progress,
                mapping,
                limit,
                retry_rejected,
            };
            cmd_upload(&config, args).await
        }
        Command::Export { progress, mapping } => cmd_export(&config, progress, mapping).await,
        Command::Reconcile {
            start_row,
            end_row,
            mapping,
            discrepancies,
            spreadsheet,
            tab,
            dry_run,
        } => {
            let args = ReconcileArgs {
                start_row,
                end_row,
                mapping,
                discrepancies,
                spreadsheet,
                tab,
                dry_run,
            };
            cmd_reconcile(&config, args).await
        }
        Command::Status {
            progress,
            discrepancies,
        } => cmd_status(&config, progress, discrepancies).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// upload
// ---------------------------------------------------------------------------

struct UploadArgs {
    start: Option<String>,
    end: Option<String>,
    corpus: Option<PathBuf>,
    id_list: Option<PathBuf>,
    delay: Option<f64>,
    backoff: bool,
    progress: Option<PathBuf>,
    mapping: Option<PathBuf>,
    limit: Option<usize>,
    retry_rejected: bool,
}

/// Merge flags over the config file into an [`UploadConfig`].
fn upload_config(config: &AppConfig, args: UploadArgs) -> Result<UploadConfig> {
    let start = args
        .start
        .or_else(|| config.upload.start_id.clone())
        .ok_or_else(|| eyre!("no start ID: pass --start or set upload.start_id"))?;
    let end = args
        .end
        .or_else(|| config.upload.end_id.clone())
        .ok_or_else(|| eyre!("no end ID: pass --end or set upload.end_id"))?;

    let mut section = config.upload.clone();
    if let Some(delay) = args.delay {
        section.delay_secs = delay;
    }
    if args.backoff {
        section.pacing = "backoff".into();
    }

    Ok(UploadConfig {
        corpus_dir: args
            .corpus
            .unwrap_or_else(|| PathBuf::from(&config.paths.corpus_dir)),
        range: IdRange::new(TextId::new(start), TextId::new(end))?,
        id_list: args
            .id_list
            .or_else(|| config.upload.id_list.as_ref().map(PathBuf::from)),
        pacing: PacingConfig::from_section(&section)?,
        progress_store: args
            .progress
            .unwrap_or_else(|| PathBuf::from(&config.paths.progress_store)),
        mapping_file: args
            .mapping
            .unwrap_or_else(|| PathBuf::from(&config.paths.mapping_file)),
        limit: args.limit,
        retry_rejected: args.retry_rejected,
    })
}

fn google_client(config: &AppConfig) -> Result<GoogleClient> {
    let token = access_token(&config.google)?;
    Ok(GoogleClient::new(&config.google, token)?)
}

async fn cmd_upload(config: &AppConfig, args: UploadArgs) -> Result<()> {
    let upload = upload_config(config, args)?;
    let uploader = DocsUploader::new(google_client(config)?, config.google.folder_id.clone());

    info!(
        range = %upload.range,
        corpus = %upload.corpus_dir.display(),
        progress = %upload.progress_store.display(),
        "starting upload"
    );

    let reporter = CliProgress::new();
    let result = pipeline::upload_corpus(&upload, uploader, &reporter).await;
    reporter.finish();
    let report = result?;

    print_upload_summary(&report, &upload);

    if report.has_failures() {
        return Err(eyre!(
            "{} upload(s) failed and {} unit(s) had unusable content; rerun to retry failures, \
             add --retry-rejected once content is fixed",
            report.failures.len(),
            report.content_errors.len()
        ));
    }
    Ok(())
}

fn print_upload_summary(report: &UploadReport, upload: &UploadConfig) {
    println!();
    println!("  Upload run {}", report.run_id);
    println!("  Selected:       {}", report.selected);
    println!("  Uploaded:       {}", report.uploaded);
    println!("  Already done:   {}", report.skipped_done);
    if report.skipped_rejected > 0 {
        println!(
            "  Rejected:       {} (earlier runs; --retry-rejected to attempt)",
            report.skipped_rejected
        );
    }
    println!("  Failed:         {}", report.failures.len());
    println!("  Bad content:    {}", report.content_errors.len());
    println!("  Missing:        {}", report.missing.len());
    if report.deferred > 0 {
        println!("  Deferred:       {} (limit reached)", report.deferred);
    }
    println!("  Mapping:        {}", upload.mapping_file.display());
    println!("  Time:           {:.1}s", report.elapsed.as_secs_f64());
    for failure in report.failures.iter().chain(&report.content_errors) {
        println!("    {}  {}", failure.id, failure.message);
    }
    println!();
}

// ---------------------------------------------------------------------------
// export / status
// ---------------------------------------------------------------------------

async fn cmd_export(
    config: &AppConfig,
    progress: Option<PathBuf>,
    mapping: Option<PathBuf>,
) -> Result<()> {
    let progress = progress.unwrap_or_else(|| PathBuf::from(&config.paths.progress_store));
    let mapping = mapping.unwrap_or_else(|| PathBuf::from(&config.paths.mapping_file));

    let exported = pipeline::export_mapping(&progress, &mapping).await?;
    println!(
        "Exported {} reference(s) to {}",
        exported.len(),
        mapping.display()
    );
    Ok(())
}

async fn cmd_status(
    config: &AppConfig,
    progress: Option<PathBuf>,
    discrepancies: Option<PathBuf>,
) -> Result<()> {
    let progress = progress.unwrap_or_else(|| PathBuf::from(&config.paths.progress_store));
    let store = pipeline::open_progress(&progress).await?;
    let summary = store.summary();

    println!();
    println!("  Progress store: {}", store.location());
    println!("  Done:           {}", summary.done);
    println!("  Failed:         {}", summary.failed);
    println!("  Rejected:       {}", summary.rejected);
    println!("  Interrupted:    {}", summary.pending);
    for entry in store.failed().chain(store.rejected()) {
        println!(
            "    {}  {}  attempts={}  {}",
            entry.id,
            entry.status.as_str(),
            entry.attempts,
            entry.error.as_deref().unwrap_or("")
        );
    }

    let report_path =
        discrepancies.unwrap_or_else(|| PathBuf::from(&config.paths.discrepancy_report));
    let (location, report) = pipeline::last_discrepancies(&report_path).await?;
    println!();
    match report {
        Some(report) => {
            println!("  Discrepancies:  {} ({location})", report.discrepancies.len());
            println!(
                "  Last reconcile: rows {}..={} at {}",
                report.rows.start,
                report.rows.end,
                report.generated_at.to_rfc3339()
            );
            for record in &report.discrepancies {
                println!("    row {}  {}", record.row_index, record.id);
            }
        }
        None => println!("  Discrepancies:  no reconcile run yet ({location})"),
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// reconcile
// ---------------------------------------------------------------------------

struct ReconcileArgs {
    start_row: Option<u32>,
    end_row: Option<u32>,
    mapping: Option<PathBuf>,
    discrepancies: Option<PathBuf>,
    spreadsheet: Option<String>,
    tab: Option<String>,
    dry_run: bool,
}

async fn cmd_reconcile(config: &AppConfig, args: ReconcileArgs) -> Result<()> {
    let mut section = config.sheet.clone();
    if let Some(spreadsheet) = args.spreadsheet {
        section.spreadsheet_id = spreadsheet;
    }
    if let Some(tab) = args.tab {
        section.tab = tab;
    }
    let layout = SheetLayout::from_section(&section)?;

    let start = args
        .start_row
        .or(section.start_row)
        .ok_or_else(|| eyre!("no start row: pass --start-row or set sheet.start_row"))?;
    let end = args
        .end_row
        .or(section.end_row)
        .ok_or_else(|| eyre!("no end row: pass --end-row or set sheet.end_row"))?;

    let reconcile = ReconcileConfig {
        rows: RowRange::new(start, end)?,
        mapping_file: args
            .mapping
            .unwrap_or_else(|| PathBuf::from(&config.paths.mapping_file)),
        discrepancy_report: args
            .discrepancies
            .unwrap_or_else(|| PathBuf::from(&config.paths.discrepancy_report)),
        dry_run: args.dry_run,
    };

    info!(
        spreadsheet = %layout.spreadsheet_id,
        tab = %layout.tab,
        start,
        end,
        dry_run = reconcile.dry_run,
        "starting reconciliation"
    );

    let destination = layout.destination_column.clone();
    let table = SheetsTable::new(google_client(config)?, layout);

    let reporter = CliProgress::new();
    let result = pipeline::reconcile_table(&reconcile, table, &destination, &reporter).await;
    reporter.finish();
    let report = result?;

    println!();
    if report.dry_run {
        println!("  Dry run: nothing was written");
    }
    println!("  Rows:           {}-{}", report.rows.start, report.rows.end);
    println!("  Read:           {}", report.rows_read);
    println!("  To write:       {}", report.plan.writes.len());
    println!("  Cells updated:  {}", report.updated_cells);
    println!("  Already filled: {}", report.plan.skipped_existing);
    println!("  Blank IDs:      {}", report.plan.blank_ids);
    println!("  Missing:        {}", report.plan.discrepancies.len());
    if !report.dry_run {
        println!(
            "  Report:         {}",
            reconcile.discrepancy_report.display()
        );
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn unit_finished(&self, id: &TextId, outcome: UnitOutcome, current: usize, total: usize) {
        let label = match outcome {
            UnitOutcome::Uploaded => "uploaded",
            UnitOutcome::Failed => "failed",
            UnitOutcome::Skipped => "skipped",
            UnitOutcome::Unreadable => "bad content",
        };
        self.spinner
            .set_message(format!("[{current}/{total}] {id} {label}"));
    }
}
