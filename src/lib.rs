pub mod clean;
pub mod cli;
pub mod config;
pub mod container;
pub mod context;
pub mod data;
pub mod grid;
pub mod ingest;
pub mod intake;
pub mod io_utils;
pub mod merge;
pub mod reader;
pub mod reconcile;
pub mod store;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands, InspectArgs},
    config::Config,
    context::RunContext,
    data::Scalar,
    ingest::IngestReport,
    intake::IntakeReport,
    reader::{SpreadsheetFile, TableReader},
    store::{CsvLedgerStore, LocalObjectStore, MailDirStore},
    table::HeaderRow,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("grn_ledger", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    if let Commands::Init(args) = &cli.command {
        config::write_template(&args.output, args.force)?;
        info!("✓ Configuration template written to {:?}", args.output);
        return Ok(());
    }
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    match cli.command {
        Commands::Intake(args) => {
            args.apply(&mut config);
            config.validate()?;
            let mut ctx = RunContext::new();
            let report = handle_intake(&config, &mut ctx);
            print_summary(&ctx, report.as_ref().ok(), None);
            report.map(|_| ())
        }
        Commands::Ingest(args) => {
            args.apply(&mut config);
            config.validate()?;
            let mut ctx = RunContext::new();
            let report = handle_ingest(&config, &mut ctx);
            print_summary(&ctx, None, report.as_ref().ok());
            report.map(|_| ())
        }
        Commands::Reconcile => handle_reconcile(&config),
        Commands::Run(args) => {
            args.intake.apply(&mut config);
            args.ingest.apply(&mut config);
            config.validate()?;
            handle_run(&config)
        }
        Commands::Inspect(args) => handle_inspect(&args),
        Commands::Init(_) => Ok(()),
    }
}

fn open_ledger(config: &Config) -> Result<CsvLedgerStore> {
    let root = config.resolve_store_path(&config.stores.ledger);
    let encoding = io_utils::resolve_encoding(config.ledger.encoding.as_deref())?;
    CsvLedgerStore::open(&root, encoding).with_context(|| format!("Opening ledger store {root:?}"))
}

fn open_objects(config: &Config) -> Result<LocalObjectStore> {
    let root = config.resolve_store_path(&config.stores.objects);
    LocalObjectStore::open(&root).with_context(|| format!("Opening object store {root:?}"))
}

fn handle_intake(config: &Config, ctx: &mut RunContext) -> Result<IntakeReport> {
    let mail_root = config.resolve_store_path(&config.stores.mail);
    let messages =
        MailDirStore::open(&mail_root).with_context(|| format!("Opening mail store {mail_root:?}"))?;
    let objects = open_objects(config)?;
    intake::run_intake(&messages, &objects, &config.intake, ctx).inspect_err(|err| {
        ctx.error(format!("Intake failed: {err:#}"));
    })
}

fn handle_ingest(config: &Config, ctx: &mut RunContext) -> Result<IngestReport> {
    let objects = open_objects(config)?;
    let ledger = open_ledger(config)?;
    let reader = TableReader::default();
    ingest::run_ingest(&objects, &ledger, &reader, config, ctx).inspect_err(|err| {
        ctx.error(format!("Ingest failed: {err:#}"));
    })
}

fn handle_run(config: &Config) -> Result<()> {
    let mut ctx = RunContext::new();
    info!("Run {} started", ctx.run_id());
    ctx.set_progress_window(0.0, 0.5);
    let intake_report = match handle_intake(config, &mut ctx) {
        Ok(report) => report,
        Err(err) => {
            ctx.warn("Skipping ingest because intake failed");
            print_summary(&ctx, None, None);
            return Err(err);
        }
    };
    ctx.set_progress_window(0.5, 0.5);
    let ingest_report = handle_ingest(config, &mut ctx);
    print_summary(&ctx, Some(&intake_report), ingest_report.as_ref().ok());
    ingest_report.map(|_| ())
}

fn handle_reconcile(config: &Config) -> Result<()> {
    let ledger = open_ledger(config)?;
    let mut ctx = RunContext::new();
    let report = reconcile::reconcile_ledger(
        &ledger,
        &config.ledger.sheet_id,
        &config.ledger.tab,
        &config.keys,
        &mut ctx,
    );
    let ingest = report.map(|reconcile| IngestReport {
        reconcile: Some(reconcile),
        ..IngestReport::default()
    });
    print_summary(&ctx, None, ingest.as_ref());
    Ok(())
}

fn handle_inspect(args: &InspectArgs) -> Result<()> {
    let header = HeaderRow::from_offset(args.header_row)
        .with_context(|| format!("Invalid header row {}", args.header_row))?;
    let file = SpreadsheetFile::from_path(&args.input)?;
    let mut ctx = RunContext::new();
    let outcome = TableReader::default().read_table(&file, header, &mut ctx);
    match outcome.strategy {
        Some(strategy) => println!(
            "{}: {} row(s) x {} column(s) via the {strategy} reader",
            file.name,
            outcome.table.len(),
            outcome.table.width()
        ),
        None => {
            println!("{}: no data could be extracted", file.name);
            return Ok(());
        }
    }
    let shown = args.rows.min(outcome.table.len());
    table::print_table(&outcome.table.columns, &outcome.table.rows[..shown]);
    Ok(())
}

fn count(value: usize) -> Scalar {
    Scalar::Integer(value as i64)
}

fn print_summary(ctx: &RunContext, intake: Option<&IntakeReport>, ingest: Option<&IngestReport>) {
    let mut rows: Vec<(&str, Scalar)> = Vec::new();
    if let Some(report) = intake {
        rows.push(("Messages found", count(report.messages_found)));
        rows.push(("Messages with uploads", count(report.messages_with_uploads)));
        rows.push(("Attachments uploaded", count(report.attachments_uploaded)));
        rows.push(("Intake failures", count(report.failures)));
    }
    if let Some(report) = ingest {
        if report.files_seen > 0 || report.reconcile.is_none() {
            rows.push(("Files seen", count(report.files_seen)));
            rows.push(("Files appended", count(report.files_appended)));
            rows.push(("Files skipped", count(report.files_skipped)));
            rows.push(("Files failed", count(report.files_failed)));
            rows.push(("Rows appended", count(report.rows_appended)));
            rows.push(("Duplicate rows dropped", count(report.duplicates_dropped)));
        }
        if let Some(reconcile) = report.reconcile {
            rows.push(("Ledger duplicates removed", count(reconcile.duplicates_removed)));
            rows.push(("Ledger blank rows removed", count(reconcile.blank_rows_removed)));
            rows.push(("Ledger rows", count(reconcile.rows_after)));
        }
    }
    let stats = ctx.stats();
    rows.push(("Log entries", count(stats.total)));
    rows.push(("Errors", count(stats.errors)));
    rows.push(("Warnings", count(stats.warnings)));
    rows.push(("Successes", count(stats.successes)));
    rows.push(("Skips", count(stats.skips)));
    rows.push(("Progress", Scalar::Text(format!("{:.0}%", ctx.progress() * 100.0))));

    let headers = vec!["metric".to_string(), "value".to_string()];
    let body = rows
        .into_iter()
        .map(|(metric, value)| vec![Scalar::Text(metric.to_string()), value])
        .collect::<Vec<_>>();
    println!("Run {}", ctx.run_id());
    table::print_table(&headers, &body);
}
