//! docbridge CLI: resumable corpus upload and sheet reconciliation.
//!
//! Uploads local text units as hosted documents, one per ID, and writes the
//! resulting links back into a spreadsheet.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli)?;
    commands::run(cli).await
}
