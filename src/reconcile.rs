//! Full-ledger maintenance pass run once after a batch of appends.

use std::collections::HashSet;

use log::debug;

use crate::{
    context::RunContext,
    data::Scalar,
    merge::{CompoundKey, KeyColumns},
    store::LedgerStore,
    table::header_names,
};

/// Widest range read back from the ledger.
pub const LEDGER_COLUMNS: &str = "A1:ZZ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub rows_before: usize,
    pub duplicates_removed: usize,
    pub blank_rows_removed: usize,
    pub blank_columns_removed: usize,
    pub rows_after: usize,
    pub sorted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledLedger {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
    pub report: ReconcileReport,
}

impl ReconciledLedger {
    /// Header plus rows, ready to be written back in one update.
    pub fn to_values(&self) -> Vec<Vec<Scalar>> {
        let header = self
            .header
            .iter()
            .map(|name| Scalar::Text(name.clone()))
            .collect();
        std::iter::once(header)
            .chain(self.rows.iter().cloned())
            .collect()
    }
}

fn is_blank(cell: &str) -> bool {
    cell.trim().is_empty()
}

/// Computes the cleaned ledger from a raw snapshot (header first). Returns
/// `None` for an empty ledger. Running it on its own output changes nothing.
pub fn reconcile_snapshot(values: &[Vec<String>], keys: &KeyColumns) -> Option<ReconciledLedger> {
    let (header, rows) = values.split_first()?;
    let mut report = ReconcileReport {
        rows_before: rows.len(),
        ..ReconcileReport::default()
    };

    let width = values.iter().map(Vec::len).max().unwrap_or(0);
    let mut header = header.clone();
    header.resize(width, String::new());
    let header_cells = header
        .iter()
        .map(|name| Scalar::Text(name.clone()))
        .collect::<Vec<_>>();
    let mut header = header_names(&header_cells);
    let mut rows = rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.resize(width, String::new());
            row
        })
        .collect::<Vec<_>>();

    if let Ok((primary, secondary)) = keys.locate(header.as_slice()) {
        let mut seen = HashSet::new();
        rows.retain(|row| seen.insert(CompoundKey::from_text(&row[primary], &row[secondary])));
        report.duplicates_removed = report.rows_before - rows.len();
    } else {
        debug!(
            "Key columns '{}' / '{}' missing; skipping duplicate removal",
            keys.primary, keys.secondary
        );
    }

    let before_blank = rows.len();
    rows.retain(|row| !row.iter().all(|cell| is_blank(cell)));
    report.blank_rows_removed = before_blank - rows.len();

    if !rows.is_empty() {
        let keep = (0..width)
            .map(|col| rows.iter().any(|row| !is_blank(&row[col])))
            .collect::<Vec<_>>();
        report.blank_columns_removed = keep.iter().filter(|k| !**k).count();
        if report.blank_columns_removed > 0 {
            let retain = |cells: Vec<String>| {
                cells
                    .into_iter()
                    .zip(&keep)
                    .filter_map(|(cell, keep)| keep.then_some(cell))
                    .collect::<Vec<_>>()
            };
            header = retain(header);
            rows = rows.into_iter().map(retain).collect();
        }
    }

    let mut rows = rows
        .into_iter()
        .map(|row| {
            row.iter()
                .map(|cell| Scalar::from_ledger_text(cell))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    if let Some(secondary) = header.iter().position(|name| *name == keys.secondary) {
        rows.sort_by_cached_key(|row| row[secondary].key_text());
        report.sorted = true;
    }

    report.rows_after = rows.len();
    Some(ReconciledLedger {
        header,
        rows,
        report,
    })
}

/// Reloads the ledger tab, reconciles it and writes it back. Failures are
/// logged to `ctx` and reported as `None`; they never abort the run.
pub fn reconcile_ledger(
    store: &dyn LedgerStore,
    sheet_id: &str,
    tab: &str,
    keys: &KeyColumns,
    ctx: &mut RunContext,
) -> Option<ReconcileReport> {
    ctx.info(format!("Reconciling ledger {sheet_id}/{tab}"));
    let values = match store.get_range(sheet_id, &format!("{tab}!{LEDGER_COLUMNS}")) {
        Ok(values) => values,
        Err(err) => {
            ctx.error(format!("Reading ledger for reconciliation failed: {err}"));
            return None;
        }
    };
    let Some(reconciled) = reconcile_snapshot(&values, keys) else {
        ctx.info("Ledger is empty; nothing to reconcile");
        return None;
    };
    if let Err(err) = store.replace_all(sheet_id, tab, &reconciled.to_values()) {
        ctx.error(format!("Rewriting ledger during reconciliation failed: {err}"));
        return None;
    }
    let report = reconciled.report;
    ctx.success(format!(
        "Reconciled ledger: removed {} duplicate(s), {} blank row(s), {} blank column(s); {} row(s) remain",
        report.duplicates_removed,
        report.blank_rows_removed,
        report.blank_columns_removed,
        report.rows_after
    ));
    Some(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn rendered(ledger: &ReconciledLedger) -> Vec<Vec<String>> {
        ledger
            .to_values()
            .iter()
            .map(|row| row.iter().map(Scalar::as_display).collect())
            .collect()
    }

    #[test]
    fn removes_duplicates_blanks_and_sorts() {
        let snapshot = values(&[
            &["Item Code", "po_number", "", "Qty"],
            &["A2", "PO9", "", "1"],
            &["A1", "PO1", "", "2.50"],
            &["A2", "PO9", "", "3"],
            &["", "", "", ""],
            &["A3", "PO5"],
        ]);
        let ledger = reconcile_snapshot(&snapshot, &KeyColumns::default()).unwrap();
        assert_eq!(ledger.header, vec!["Item Code", "po_number", "Qty"]);
        assert_eq!(
            ledger.report,
            ReconcileReport {
                rows_before: 5,
                duplicates_removed: 1,
                blank_rows_removed: 1,
                blank_columns_removed: 1,
                rows_after: 3,
                sorted: true,
            }
        );
        assert_eq!(
            rendered(&ledger)[1..],
            values(&[&["A1", "PO1", "2.5"], &["A3", "PO5", ""], &["A2", "PO9", "1"]])
        );
        assert_eq!(ledger.rows[2][2], Scalar::Integer(1));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let snapshot = values(&[
            &["po_number", "Item Code", "Note"],
            &["10", "X", "'007"],
            &["9", "Y", ""],
            &["10", "X", "dup"],
        ]);
        let first = reconcile_snapshot(&snapshot, &KeyColumns::default()).unwrap();
        let second = reconcile_snapshot(&rendered(&first), &KeyColumns::default()).unwrap();
        assert_eq!(rendered(&first), rendered(&second));
        assert_eq!(second.report.duplicates_removed, 0);
        // Lexicographic on key text.
        assert_eq!(first.rows[0][0], Scalar::Integer(10));
    }

    #[test]
    fn empty_ledger_and_header_only_ledger() {
        assert!(reconcile_snapshot(&[], &KeyColumns::default()).is_none());
        let header_only = values(&[&["Item Code", "", "po_number"]]);
        let ledger = reconcile_snapshot(&header_only, &KeyColumns::default()).unwrap();
        assert_eq!(ledger.header, vec!["Item Code", "Column_2", "po_number"]);
        assert!(ledger.rows.is_empty());
    }
}
