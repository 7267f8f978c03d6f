//! Multi-strategy spreadsheet reader.
//!
//! Strategies are tried in order and the first one producing a non-empty
//! table after cleaning wins. Errors and panics raised inside a strategy are
//! contained and logged; reading a file never fails, it degrades to an empty
//! table.

use std::{
    fs,
    io::Cursor,
    panic::{self, AssertUnwindSafe},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Range, Reader, Xls, Xlsx, open_workbook_from_rs};
use log::debug;

use crate::{
    clean::clean,
    container,
    context::RunContext,
    data::{Scalar, normalize},
    table::{HeaderRow, Table},
};

/// A downloaded spreadsheet awaiting parsing.
#[derive(Debug, Clone)]
pub struct SpreadsheetFile {
    pub id: String,
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SpreadsheetFile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("Reading spreadsheet {path:?}"))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(path.display().to_string(), name, bytes))
    }

    /// Lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

pub trait ReadStrategy {
    fn name(&self) -> &'static str;

    fn applies_to(&self, _file: &SpreadsheetFile) -> bool {
        true
    }

    /// Produces a raw (uncleaned) table. An empty table means "no data", an
    /// error means the strategy could not parse the bytes at all.
    fn read(&self, bytes: &[u8], header: HeaderRow) -> Result<Table>;
}

/// Structured reader for the zip-based workbook format.
#[derive(Debug, Default)]
pub struct ModernStrategy;

impl ReadStrategy for ModernStrategy {
    fn name(&self) -> &'static str {
        "modern"
    }

    fn read(&self, bytes: &[u8], header: HeaderRow) -> Result<Table> {
        let mut workbook: Xlsx<_> =
            open_workbook_from_rs(Cursor::new(bytes)).context("Opening workbook")?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("Workbook has no worksheets"))?
            .context("Reading first worksheet")?;
        Ok(table_from_range(&range, header))
    }
}

/// Structured reader for the legacy binary format; only offered `.xls` files.
#[derive(Debug, Default)]
pub struct LegacyStrategy;

impl ReadStrategy for LegacyStrategy {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn applies_to(&self, file: &SpreadsheetFile) -> bool {
        file.extension().as_deref() == Some("xls")
    }

    fn read(&self, bytes: &[u8], header: HeaderRow) -> Result<Table> {
        let mut workbook: Xls<_> =
            open_workbook_from_rs(Cursor::new(bytes)).context("Opening legacy workbook")?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("Workbook has no worksheets"))?
            .context("Reading first worksheet")?;
        Ok(table_from_range(&range, header))
    }
}

/// Last resort: scan the container's worksheet markup directly.
#[derive(Debug, Default)]
pub struct ContainerStrategy;

impl ReadStrategy for ContainerStrategy {
    fn name(&self) -> &'static str {
        "container"
    }

    fn read(&self, bytes: &[u8], header: HeaderRow) -> Result<Table> {
        let rows = container::extract_rows(bytes);
        Ok(Table::from_rectangle(rows, header).unwrap_or_default())
    }
}

/// Lays the used range out from A1 so positions match the container scan.
fn table_from_range(range: &Range<Data>, header: HeaderRow) -> Table {
    let (top, left) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .unwrap_or((0, 0));
    let mut rows = vec![Vec::new(); top];
    rows.extend(range.rows().map(|cells| {
        let mut row = vec![Scalar::Empty; left];
        row.extend(cells.iter().map(scalar_from_data));
        row
    }));
    Table::from_rectangle(rows, header).unwrap_or_default()
}

pub fn scalar_from_data(cell: &Data) -> Scalar {
    match cell {
        Data::Empty | Data::Error(_) => Scalar::Empty,
        Data::Int(i) => Scalar::Integer(*i),
        Data::Float(f) => {
            if f.is_finite() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                Scalar::Integer(*f as i64)
            } else if f.is_finite() {
                Scalar::Float(*f)
            } else {
                Scalar::Empty
            }
        }
        Data::String(s) if s.trim().is_empty() => Scalar::Empty,
        Data::String(s) => Scalar::Text(s.clone()),
        Data::Bool(b) => Scalar::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(serial) => match serial.as_datetime() {
            Some(moment) => Scalar::Text(moment.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => normalize(Some(&serial.as_f64().to_string())),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Scalar::Text(s.clone()),
    }
}

/// The result of reading one file.
#[derive(Debug, Clone, Default)]
pub struct ReadOutcome {
    pub table: Table,
    /// Name of the strategy whose output was accepted.
    pub strategy: Option<&'static str>,
}

pub struct TableReader {
    strategies: Vec<Box<dyn ReadStrategy>>,
}

impl Default for TableReader {
    fn default() -> Self {
        Self::with_strategies(vec![
            Box::new(ModernStrategy),
            Box::new(LegacyStrategy),
            Box::new(ContainerStrategy),
        ])
    }
}

impl TableReader {
    pub fn with_strategies(strategies: Vec<Box<dyn ReadStrategy>>) -> Self {
        Self { strategies }
    }

    /// Runs the cascade. Never fails: when every strategy comes up empty the
    /// outcome carries an empty table and no strategy name.
    pub fn read_table(
        &self,
        file: &SpreadsheetFile,
        header: HeaderRow,
        ctx: &mut RunContext,
    ) -> ReadOutcome {
        for strategy in self.strategies.iter().filter(|s| s.applies_to(file)) {
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
                strategy.read(&file.bytes, header)
            }));
            let raw = match attempt {
                Ok(Ok(table)) => table,
                Ok(Err(err)) => {
                    debug!("{} reader rejected {}: {err:#}", strategy.name(), file.name);
                    continue;
                }
                Err(_) => {
                    ctx.warn(format!(
                        "{} reader panicked on {}; trying next strategy",
                        strategy.name(),
                        file.name
                    ));
                    continue;
                }
            };
            let cleaned = clean(&raw);
            if cleaned.is_empty() {
                debug!("{} reader produced no rows for {}", strategy.name(), file.name);
                continue;
            }
            ctx.info(format!(
                "Read {} row(s) x {} column(s) from {} with the {} reader",
                cleaned.len(),
                cleaned.width(),
                file.name,
                strategy.name()
            ));
            return ReadOutcome {
                table: cleaned,
                strategy: Some(strategy.name()),
            };
        }
        ctx.skip(format!("No reader could extract data from {}", file.name));
        ReadOutcome::default()
    }
}
