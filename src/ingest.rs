//! Spreadsheet ingest: reads every listed file, appends rows with unseen
//! compound keys to the ledger, then reconciles the ledger once.

use anyhow::{Context, Result};

use crate::{
    config::Config,
    context::RunContext,
    data::Scalar,
    merge::{KeySet, MergeError, reconcile_new_data},
    reader::{SpreadsheetFile, TableReader},
    reconcile::{LEDGER_COLUMNS, ReconcileReport, reconcile_ledger},
    store::{FileEntry, LedgerStore, ObjectStore, SPREADSHEET_MIMES},
    table::{HeaderRow, Table},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files_seen: usize,
    pub files_appended: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub rows_appended: usize,
    pub duplicates_dropped: usize,
    pub reconcile: Option<ReconcileReport>,
}

enum FileOutcome {
    Appended { rows: usize, duplicates: usize },
    Skipped { duplicates: usize },
}

/// Mutable state threaded through the per-file loop.
struct LedgerCursor<'a> {
    store: &'a dyn LedgerStore,
    sheet_id: &'a str,
    tab: &'a str,
    header: Option<Vec<String>>,
    keys: KeySet,
}

impl LedgerCursor<'_> {
    /// Reorders `table` to the ledger's column order, widening the ledger
    /// header first when the table brings new columns. An empty ledger gets
    /// the table's header row in front of the data.
    fn aligned_rows(&mut self, table: &Table) -> Result<Vec<Vec<Scalar>>> {
        let Some(header) = self.header.as_mut() else {
            let mut values = vec![table.columns.iter().map(|c| Scalar::Text(c.clone())).collect()];
            values.extend(table.rows.iter().cloned());
            return Ok(values);
        };
        let extra = table
            .columns
            .iter()
            .filter(|c| !header.contains(c))
            .cloned()
            .collect::<Vec<_>>();
        if !extra.is_empty() {
            header.extend(extra);
            let row = header.iter().map(|c| Scalar::Text(c.clone())).collect();
            self.store
                .update_range(self.sheet_id, &format!("{}!A1", self.tab), &[row])
                .context("Widening ledger header")?;
        }
        let positions = header
            .iter()
            .map(|name| table.column_index(name))
            .collect::<Vec<_>>();
        Ok(table
            .rows
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|pos| pos.and_then(|idx| row.get(idx).cloned()).unwrap_or_default())
                    .collect()
            })
            .collect())
    }
}

/// Spreadsheets under the source folder, newest first. With
/// `include_subfolders` every folder below it is listed as well.
fn list_source_files(objects: &dyn ObjectStore, config: &Config) -> Result<Vec<FileEntry>> {
    let limit = config.ingest.max_results;
    let mut pending = vec![config.ingest.source_folder.clone()];
    let mut files = Vec::new();
    while let Some(folder) = pending.pop() {
        let listed = objects
            .list_files(&folder, SPREADSHEET_MIMES, limit)
            .with_context(|| format!("Listing folder '{folder}'"))?;
        files.extend(listed);
        if config.ingest.include_subfolders {
            let folders = objects
                .list_folders(&folder)
                .with_context(|| format!("Listing subfolders of '{folder}'"))?;
            pending.extend(folders.into_iter().map(|entry| entry.id));
        }
    }
    files.sort_by(FileEntry::newest_first);
    files.truncate(limit);
    Ok(files)
}

/// Runs one ingest pass. Listing the source folder and loading the ledger
/// are fatal; everything per file is logged and counted.
pub fn run_ingest(
    objects: &dyn ObjectStore,
    ledger: &dyn LedgerStore,
    reader: &TableReader,
    config: &Config,
    ctx: &mut RunContext,
) -> Result<IngestReport> {
    let header_row = config.ingest.header()?;
    let sheet_id = config.ledger.sheet_id.as_str();
    let tab = config.ledger.tab.as_str();
    ctx.info("Starting spreadsheet ingest");

    let files = list_source_files(objects, config)?;
    ctx.info(format!("Found {} spreadsheet file(s)", files.len()));
    ctx.set_progress(0.25);
    let mut report = IngestReport {
        files_seen: files.len(),
        ..IngestReport::default()
    };
    if files.is_empty() {
        ctx.set_progress(1.0);
        return Ok(report);
    }

    let values = ledger
        .get_range(sheet_id, &format!("{tab}!{LEDGER_COLUMNS}"))
        .with_context(|| format!("Loading ledger {sheet_id}/{tab}"))?;
    let keys = match KeySet::from_ledger(&values, &config.keys) {
        Ok(keys) => keys,
        Err(MergeError::MissingKeyColumn(name)) => {
            ctx.warn(format!(
                "Ledger header lacks key column '{name}'; existing rows will not be deduplicated"
            ));
            KeySet::new()
        }
    };
    ctx.info(format!("Loaded {} existing key(s) from the ledger", keys.len()));
    let mut cursor = LedgerCursor {
        store: ledger,
        sheet_id,
        tab,
        header: values.into_iter().next(),
        keys,
    };

    let total = files.len();
    for (idx, file) in files.iter().enumerate() {
        ctx.info(format!("Processing {}", file.name));
        match ingest_file(objects, reader, file, header_row, config, &mut cursor, ctx) {
            Ok(FileOutcome::Appended { rows, duplicates }) => {
                report.files_appended += 1;
                report.rows_appended += rows;
                report.duplicates_dropped += duplicates;
                ctx.success(format!("Appended {rows} row(s) from {}", file.name));
            }
            Ok(FileOutcome::Skipped { duplicates }) => {
                report.files_skipped += 1;
                report.duplicates_dropped += duplicates;
            }
            Err(err) => {
                report.files_failed += 1;
                ctx.error(format!("Failed to process {}: {err:#}", file.name));
            }
        }
        ctx.set_progress(0.25 + (idx + 1) as f64 / total as f64 * 0.7);
    }

    if report.files_appended > 0 && config.ingest.reconcile {
        report.reconcile = reconcile_ledger(ledger, sheet_id, tab, &config.keys, ctx);
    }
    ctx.set_progress(1.0);
    ctx.success(format!(
        "Ingest completed: {} row(s) appended from {} of {} file(s)",
        report.rows_appended, report.files_appended, report.files_seen
    ));
    Ok(report)
}

fn ingest_file(
    objects: &dyn ObjectStore,
    reader: &TableReader,
    entry: &FileEntry,
    header_row: HeaderRow,
    config: &Config,
    cursor: &mut LedgerCursor<'_>,
    ctx: &mut RunContext,
) -> Result<FileOutcome> {
    let bytes = objects
        .download_file(&entry.id)
        .context("Downloading file")?;
    let file = SpreadsheetFile::new(&entry.id, &entry.name, bytes);
    let outcome = reader.read_table(&file, header_row, ctx);
    if outcome.table.is_empty() {
        return Ok(FileOutcome::Skipped { duplicates: 0 });
    }
    let merged = match reconcile_new_data(&outcome.table, &cursor.keys, &config.keys) {
        Ok(merged) => merged,
        Err(err) => {
            ctx.skip(format!("{}: {err}", entry.name));
            return Ok(FileOutcome::Skipped { duplicates: 0 });
        }
    };
    let duplicates = merged.internal_duplicates + merged.known_duplicates;
    if merged.table.is_empty() {
        ctx.skip(format!(
            "{}: all {} row(s) already in the ledger",
            entry.name,
            outcome.table.len()
        ));
        return Ok(FileOutcome::Skipped { duplicates });
    }
    let rows = cursor.aligned_rows(&merged.table)?;
    cursor
        .store
        .append_rows(cursor.sheet_id, &format!("{}!A1", cursor.tab), &rows)
        .context("Appending to ledger")?;
    if cursor.header.is_none() {
        cursor.header = Some(merged.table.columns.clone());
    }
    cursor.keys.absorb(merged.new_keys);
    Ok(FileOutcome::Appended {
        rows: merged.table.len(),
        duplicates,
    })
}
