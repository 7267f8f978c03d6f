use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Collect GRN spreadsheets and keep a deduplicated ledger",
    long_about = None
)]
pub struct Cli {
    /// YAML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Copy spreadsheet attachments from matching messages into the object store
    Intake(IntakeArgs),
    /// Append new rows from stored spreadsheets to the ledger
    Ingest(IngestArgs),
    /// Deduplicate, tidy and sort the whole ledger
    Reconcile,
    /// Run intake followed by ingest
    Run(RunArgs),
    /// Read a local spreadsheet and print the extracted table
    Inspect(InspectArgs),
    /// Write a commented default configuration file
    Init(InitArgs),
}

#[derive(Debug, Args, Default)]
pub struct IntakeArgs {
    /// Only messages whose sender contains this text
    #[arg(long)]
    pub sender: Option<String>,
    /// Comma-separated keywords; any may match
    #[arg(short, long)]
    pub keywords: Option<String>,
    /// How many days back to search
    #[arg(long = "days-back")]
    pub days_back: Option<u32>,
    /// Maximum number of messages to process
    #[arg(long = "max-messages")]
    pub max_messages: Option<usize>,
}

impl IntakeArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(sender) = &self.sender {
            config.intake.sender = sender.clone();
        }
        if let Some(keywords) = &self.keywords {
            config.intake.keywords = keywords.clone();
        }
        if let Some(days) = self.days_back {
            config.intake.days_back = days;
        }
        if let Some(max) = self.max_messages {
            config.intake.max_results = max;
        }
    }
}

#[derive(Debug, Args, Default)]
pub struct IngestArgs {
    /// 0-based header row in each file, or -1 when files have no header
    #[arg(long = "header-row", allow_hyphen_values = true, value_parser = parse_header_row)]
    pub header_row: Option<i64>,
    /// Maximum number of files to process
    #[arg(long = "max-files")]
    pub max_files: Option<usize>,
    /// Object store folder to read spreadsheets from
    #[arg(long)]
    pub source: Option<String>,
    /// Skip the reconciliation pass after appending
    #[arg(long = "skip-reconcile")]
    pub skip_reconcile: bool,
}

impl IngestArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(header_row) = self.header_row {
            config.ingest.header_row = header_row;
        }
        if let Some(max) = self.max_files {
            config.ingest.max_results = max;
        }
        if let Some(source) = &self.source {
            config.ingest.source_folder = source.clone();
        }
        if self.skip_reconcile {
            config.ingest.reconcile = false;
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub intake: IntakeArgs,
    #[command(flatten)]
    pub ingest: IngestArgs,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Spreadsheet file to read
    #[arg(short, long)]
    pub input: PathBuf,
    /// 0-based header row, or -1 when the file has no header
    #[arg(
        long = "header-row",
        allow_hyphen_values = true,
        default_value_t = 0,
        value_parser = parse_header_row
    )]
    pub header_row: i64,
    /// Number of rows to display
    #[arg(long, default_value_t = 20)]
    pub rows: usize,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Destination configuration file
    #[arg(short, long, default_value = "grn.yaml")]
    pub output: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn parse_header_row(value: &str) -> Result<i64, String> {
    let parsed = value
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("'{value}' is not a row number"))?;
    if parsed < -1 {
        return Err("Header row must be -1 (no header) or a 0-based row offset".to_string());
    }
    Ok(parsed)
}
