//! Row normalization applied to every table a read strategy produces.

use itertools::Itertools;
use log::debug;

use crate::{data::Scalar, table::Table};

/// Cleans a table without touching the input:
///
/// 1. decorative apostrophes are stripped from textual cells;
/// 2. with two or more columns, rows whose second column is blank,
///    whitespace-only or the literal `nan` are dropped;
/// 3. exact duplicate rows are dropped, keeping the first occurrence.
///
/// Applying it to an already clean table returns an equal table.
pub fn clean(table: &Table) -> Table {
    let check_second = table.width() >= 2;
    let before = table.len();
    let rows = table
        .rows
        .iter()
        .map(|row| row.iter().map(Scalar::strip_decoration).collect::<Vec<_>>())
        .filter(|row| !check_second || !is_blank_key(row.get(1)))
        .unique()
        .collect::<Vec<_>>();
    if rows.len() != before {
        debug!("Cleaner dropped {} of {before} row(s)", before - rows.len());
    }
    table.with_rows(rows)
}

fn is_blank_key(cell: Option<&Scalar>) -> bool {
    match cell {
        None | Some(Scalar::Empty) => true,
        Some(Scalar::Float(f)) => f.is_nan(),
        Some(Scalar::Text(s)) => {
            let trimmed = s.trim();
            trimmed.is_empty() || trimmed == "nan"
        }
        Some(Scalar::Integer(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> Scalar {
        Scalar::Text(value.to_string())
    }

    fn table(rows: Vec<Vec<Scalar>>) -> Table {
        Table::new(
            vec!["Item Code".into(), "po_number".into(), "Qty".into()],
            rows,
        )
    }

    #[test]
    fn drops_blank_second_column_rows() {
        let input = table(vec![
            vec![text("A1"), text("PO1"), Scalar::Integer(1)],
            vec![text("A2"), Scalar::Empty, Scalar::Integer(2)],
            vec![text("A3"), text("   "), Scalar::Integer(3)],
            vec![text("A4"), text("nan"), Scalar::Integer(4)],
            vec![text("A5"), Scalar::Float(f64::NAN), Scalar::Integer(5)],
            vec![text("A6"), Scalar::Integer(0), Scalar::Integer(6)],
        ]);
        let cleaned = clean(&input);
        let codes = cleaned.rows.iter().map(|r| r[0].clone()).collect::<Vec<_>>();
        assert_eq!(codes, vec![text("A1"), text("A6")]);
        assert_eq!(input.len(), 6, "input left untouched");
    }

    #[test]
    fn strips_quotes_before_deduplicating() {
        let input = table(vec![
            vec![text("'A1"), text("PO1"), Scalar::Integer(1)],
            vec![text("A1"), text("PO1'"), Scalar::Integer(1)],
            vec![text("A1"), text("PO1"), Scalar::Integer(2)],
        ]);
        let cleaned = clean(&input);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned.rows[0], vec![text("A1"), text("PO1"), Scalar::Integer(1)]);
    }

    #[test]
    fn single_column_tables_keep_blank_rows_but_dedupe() {
        let input = Table::new(
            vec!["Column_1".into()],
            vec![vec![Scalar::Empty], vec![text("x")], vec![Scalar::Empty]],
        );
        let cleaned = clean(&input);
        assert_eq!(cleaned.rows, vec![vec![Scalar::Empty], vec![text("x")]]);
    }

    #[test]
    fn clean_is_idempotent() {
        let input = table(vec![
            vec![text("'A1"), text("PO1"), Scalar::Float(1.5)],
            vec![text("A2"), Scalar::Empty, Scalar::Integer(2)],
            vec![text("A1"), text("PO1"), Scalar::Float(1.5)],
        ]);
        let once = clean(&input);
        assert_eq!(clean(&once), once);
    }
}
