use std::fmt::Write as _;

use itertools::Itertools;

use crate::data::{Scalar, normalize_column_name, synthesized_column_name};

/// Where a sheet's column names come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRow {
    /// The source has no header; columns are named `Column_1..N`.
    Absent,
    /// 0-based offset of the header row among the retained rows.
    At(usize),
}

impl HeaderRow {
    /// Interprets the configured offset, where `-1` means "no header".
    pub fn from_offset(offset: i64) -> Option<Self> {
        match offset {
            -1 => Some(HeaderRow::Absent),
            n if n >= 0 => Some(HeaderRow::At(n as usize)),
            _ => None,
        }
    }

    /// Rows a rectangle must retain to yield a header plus one data row.
    pub fn min_rows(&self) -> usize {
        match self {
            HeaderRow::Absent => 1,
            HeaderRow::At(n) => n + 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Scalar::Empty);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A table is empty when it carries no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn with_rows(&self, rows: Vec<Vec<Scalar>>) -> Self {
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Builds a table from a dense rectangle: entirely empty rows are dropped,
    /// then the header policy picks the column names. Returns `None` when too
    /// few rows remain to honour the policy.
    pub fn from_rectangle(rows: Vec<Vec<Scalar>>, header: HeaderRow) -> Option<Self> {
        let mut retained = rows
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect::<Vec<_>>();
        if retained.len() < header.min_rows() {
            return None;
        }
        let width = retained.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut retained {
            row.resize(width, Scalar::Empty);
        }
        match header {
            HeaderRow::Absent => {
                let columns = (0..width).map(synthesized_column_name).collect();
                Some(Self::new(columns, retained))
            }
            HeaderRow::At(offset) => {
                let data = retained.split_off(offset + 1);
                let header_cells = retained.pop().unwrap_or_default();
                Some(Self::new(header_names(&header_cells), data))
            }
        }
    }
}

/// Column names from a header row: blank cells get `Column_N`, repeated names
/// get a `.1`, `.2`, … suffix so every name stays addressable.
pub fn header_names(cells: &[Scalar]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(cells.len());
    for (idx, cell) in cells.iter().enumerate() {
        let base = match normalize_column_name(&cell.as_display()) {
            name if name.is_empty() => synthesized_column_name(idx),
            name => name,
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while names.contains(&candidate) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    width: usize,
    align: Align,
}

impl ColumnLayout {
    /// Numbers line up on the right when nothing but numbers (and blanks)
    /// fill the column.
    fn measure(header: &str, cells: &[&Scalar]) -> Self {
        let numeric = cells.iter().any(|cell| cell.is_numeric())
            && cells.iter().all(|cell| cell.is_numeric() || cell.is_empty());
        let width = cells
            .iter()
            .map(|cell| cell_text(cell).chars().count())
            .chain(std::iter::once(header.chars().count()))
            .max()
            .unwrap_or(0);
        Self {
            width,
            align: if numeric { Align::Right } else { Align::Left },
        }
    }

    fn pad(&self, text: &str) -> String {
        match self.align {
            Align::Left => format!("{text:<width$}", width = self.width),
            Align::Right => format!("{text:>width$}", width = self.width),
        }
    }
}

/// Renders a header plus typed rows as a `|`-separated text table. Cells
/// beyond the header are dropped; short rows render blank.
pub fn render_table(headers: &[String], rows: &[Vec<Scalar>]) -> String {
    let layout = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let cells = rows.iter().filter_map(|row| row.get(idx)).collect::<Vec<_>>();
            ColumnLayout::measure(header, &cells)
        })
        .collect::<Vec<_>>();

    let mut output = String::new();
    let heading = layout.iter().zip(headers).map(|(column, header)| column.pad(header));
    let _ = writeln!(output, "{}", join_line(heading));
    let rule = layout.iter().map(|column| "-".repeat(column.width)).join("-+-");
    let _ = writeln!(output, "{rule}");
    for row in rows {
        let cells = layout.iter().enumerate().map(|(idx, column)| {
            let text = row.get(idx).map(cell_text).unwrap_or_default();
            column.pad(&text)
        });
        let _ = writeln!(output, "{}", join_line(cells));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<Scalar>]) {
    print!("{}", render_table(headers, rows));
}

fn join_line(mut cells: impl Iterator<Item = String>) -> String {
    cells.join(" | ").trim_end().to_string()
}

/// Display text of a cell, flattened onto one line.
fn cell_text(cell: &Scalar) -> String {
    cell.as_display().replace(['\n', '\r', '\t'], " ")
}
