//! CSV-backed ledger store addressed with A1 range notation.
//!
//! A spreadsheet id maps to a directory under the store root and each tab to
//! `<tab>.csv` inside it. Reads mimic a hosted sheet: trailing blank cells and
//! rows are trimmed, and every value comes back as formatted text.

use std::{
    fs,
    path::PathBuf,
};

use encoding_rs::Encoding;
use log::debug;

use super::{LedgerStore, StoreError, StoreResult};
use crate::{
    data::Scalar,
    grid::{CellCoordinate, column_from_letters},
    io_utils,
};

/// A parsed range such as `Sheet1!A1:ZZ`. Rows and columns are 1-based and
/// inclusive; a missing end means "to the end of the data".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpec {
    pub tab: String,
    pub start_row: u32,
    pub start_column: u32,
    pub end_row: Option<u32>,
    pub end_column: Option<u32>,
}

impl RangeSpec {
    pub fn whole(tab: &str) -> Self {
        Self {
            tab: tab.to_string(),
            start_row: 1,
            start_column: 1,
            end_row: None,
            end_column: None,
        }
    }

    pub fn parse(spec: &str) -> StoreResult<Self> {
        let invalid = || StoreError::InvalidRange(spec.to_string());
        let (tab, cells) = match spec.rsplit_once('!') {
            Some((tab, cells)) => (tab, Some(cells)),
            None => (spec, None),
        };
        let tab = tab.trim().trim_matches('\'');
        if tab.is_empty() {
            return Err(invalid());
        }
        let mut range = Self::whole(tab);
        let Some(cells) = cells else {
            return Ok(range);
        };
        let (start, end) = match cells.split_once(':') {
            Some((start, end)) => (start, Some(end)),
            None => (cells, None),
        };
        let (start_column, start_row) = parse_bound(start).ok_or_else(invalid)?;
        range.start_column = start_column.unwrap_or(1);
        range.start_row = start_row.unwrap_or(1);
        match end {
            Some(end) => {
                let (end_column, end_row) = parse_bound(end).ok_or_else(invalid)?;
                range.end_column = end_column;
                range.end_row = end_row;
            }
            None => {
                // A lone reference addresses a single cell; a lone column the
                // whole column.
                range.end_column = start_column;
                range.end_row = start_row;
            }
        }
        if range.end_row.is_some_and(|end| end < range.start_row)
            || range.end_column.is_some_and(|end| end < range.start_column)
        {
            return Err(invalid());
        }
        Ok(range)
    }

    fn contains_row(&self, row: u32) -> bool {
        row >= self.start_row && self.end_row.is_none_or(|end| row <= end)
    }

    fn contains_column(&self, column: u32) -> bool {
        column >= self.start_column && self.end_column.is_none_or(|end| column <= end)
    }
}

/// Parses `A1`, `A` or `1` into optional (column, row) components.
fn parse_bound(bound: &str) -> Option<(Option<u32>, Option<u32>)> {
    let bound = bound.trim().replace('$', "");
    if bound.is_empty() {
        return None;
    }
    if let Some(coordinate) = CellCoordinate::parse(&bound) {
        return Some((Some(coordinate.column), Some(coordinate.row)));
    }
    if bound.chars().all(|c| c.is_ascii_alphabetic()) {
        return column_from_letters(&bound).map(|column| (Some(column), None));
    }
    bound
        .parse::<u32>()
        .ok()
        .filter(|row| *row >= 1)
        .map(|row| (None, Some(row)))
}

fn validate_segment<'a>(segment: &'a str) -> StoreResult<&'a str> {
    let trimmed = segment.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0'])
    {
        return Err(StoreError::InvalidId(segment.to_string()));
    }
    Ok(trimmed)
}

fn render(rows: &[Vec<Scalar>]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(Scalar::as_display).collect())
        .collect()
}

fn trim_trailing(rows: &mut Vec<Vec<String>>) {
    for row in rows.iter_mut() {
        while row.last().is_some_and(|cell| cell.is_empty()) {
            row.pop();
        }
    }
    while rows.last().is_some_and(|row| row.is_empty()) {
        rows.pop();
    }
}

#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    root: PathBuf,
    encoding: &'static Encoding,
}

impl CsvLedgerStore {
    /// Opens (creating if needed) a ledger root directory.
    pub fn open(root: impl Into<PathBuf>, encoding: &'static Encoding) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| StoreError::io(&root, err))?;
        Ok(Self { root, encoding })
    }

    pub fn tab_path(&self, sheet_id: &str, tab: &str) -> StoreResult<PathBuf> {
        let sheet = validate_segment(sheet_id)?;
        let tab = validate_segment(tab)?;
        Ok(self.root.join(sheet).join(format!("{tab}.csv")))
    }

    fn load(&self, sheet_id: &str, tab: &str) -> StoreResult<Vec<Vec<String>>> {
        let path = self.tab_path(sheet_id, tab)?;
        Ok(io_utils::read_csv_rows(&path, self.encoding)?)
    }

    fn save(&self, sheet_id: &str, tab: &str, mut rows: Vec<Vec<String>>) -> StoreResult<()> {
        let path = self.tab_path(sheet_id, tab)?;
        trim_trailing(&mut rows);
        // A zero-field record would be written as a bare line terminator,
        // which readers skip; keep interior blank rows addressable.
        for row in rows.iter_mut().filter(|row| row.is_empty()) {
            row.push(String::new());
        }
        io_utils::replace_csv_rows(&path, &rows, self.encoding)?;
        debug!("Wrote {} row(s) to {path:?}", rows.len());
        Ok(())
    }

    fn write_at(grid: &mut Vec<Vec<String>>, top: u32, left: u32, values: &[Vec<String>]) {
        let top = (top - 1) as usize;
        let left = (left - 1) as usize;
        for (r, row) in values.iter().enumerate() {
            let target_row = top + r;
            if grid.len() <= target_row {
                grid.resize(target_row + 1, Vec::new());
            }
            let target = &mut grid[target_row];
            if target.len() < left + row.len() {
                target.resize(left + row.len(), String::new());
            }
            for (c, value) in row.iter().enumerate() {
                target[left + c] = value.clone();
            }
        }
    }
}

impl LedgerStore for CsvLedgerStore {
    fn get_range(&self, sheet_id: &str, range: &str) -> StoreResult<Vec<Vec<String>>> {
        let spec = RangeSpec::parse(range)?;
        let values = self.load(sheet_id, &spec.tab)?;
        let mut selected = values
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| spec.contains_row(*idx as u32 + 1))
            .map(|(_, row)| {
                row.into_iter()
                    .enumerate()
                    .filter(|(idx, _)| spec.contains_column(*idx as u32 + 1))
                    .map(|(_, cell)| cell)
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        trim_trailing(&mut selected);
        Ok(selected)
    }

    fn append_rows(&self, sheet_id: &str, range: &str, rows: &[Vec<Scalar>]) -> StoreResult<()> {
        let spec = RangeSpec::parse(range)?;
        let mut values = self.load(sheet_id, &spec.tab)?;
        trim_trailing(&mut values);
        let next_row = values.len() as u32 + 1;
        Self::write_at(&mut values, next_row, spec.start_column, &render(rows));
        self.save(sheet_id, &spec.tab, values)
    }

    fn clear_range(&self, sheet_id: &str, range: &str) -> StoreResult<()> {
        let spec = RangeSpec::parse(range)?;
        let mut values = self.load(sheet_id, &spec.tab)?;
        for (r, row) in values.iter_mut().enumerate() {
            if !spec.contains_row(r as u32 + 1) {
                continue;
            }
            for (c, cell) in row.iter_mut().enumerate() {
                if spec.contains_column(c as u32 + 1) {
                    cell.clear();
                }
            }
        }
        self.save(sheet_id, &spec.tab, values)
    }

    fn update_range(&self, sheet_id: &str, range: &str, rows: &[Vec<Scalar>]) -> StoreResult<()> {
        let spec = RangeSpec::parse(range)?;
        let mut values = self.load(sheet_id, &spec.tab)?;
        Self::write_at(&mut values, spec.start_row, spec.start_column, &render(rows));
        self.save(sheet_id, &spec.tab, values)
    }

    fn replace_all(&self, sheet_id: &str, tab: &str, rows: &[Vec<Scalar>]) -> StoreResult<()> {
        let spec = RangeSpec::parse(tab)?;
        self.save(sheet_id, &spec.tab, render(rows))
    }
}
