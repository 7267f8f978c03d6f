mod common;

use std::collections::HashSet;

use common::{text, xlsx_bytes};
use grn_ledger::clean::clean;
use grn_ledger::context::RunContext;
use grn_ledger::data::Scalar;
use grn_ledger::reader::{SpreadsheetFile, TableReader};
use grn_ledger::table::{HeaderRow, Table};
use proptest::prelude::*;

#[test]
fn blank_second_column_rows_are_removed_from_a_file() {
    let bytes = xlsx_bytes(&[
        &["Item Code", "po_number", "Qty"],
        &["A1", "PO1", "1"],
        &["A2", "", "2"],
        &["A3", "PO3", "3"],
        &["A4", "", "4"],
        &["A5", "PO5", "5"],
    ]);
    let mut ctx = RunContext::new();
    let outcome = TableReader::default().read_table(
        &SpreadsheetFile::new("b", "b.xlsx", bytes),
        HeaderRow::At(0),
        &mut ctx,
    );
    let codes = outcome
        .table
        .rows
        .iter()
        .map(|row| row[0].clone())
        .collect::<Vec<_>>();
    assert_eq!(codes, vec![text("A1"), text("A3"), text("A5")]);
}

fn cell_strategy() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        Just(Scalar::Empty),
        Just(Scalar::Text("nan".into())),
        Just(Scalar::Text("  ".into())),
        Just(Scalar::Text("'".into())),
        (0i64..4).prop_map(Scalar::Integer),
        "'?[ab]'?".prop_map(Scalar::Text),
    ]
}

fn table_strategy() -> impl Strategy<Value = Table> {
    (1usize..4).prop_flat_map(|width| {
        prop::collection::vec(prop::collection::vec(cell_strategy(), width), 0..12).prop_map(
            move |rows| Table::new((0..width).map(|i| format!("c{i}")).collect(), rows),
        )
    })
}

fn is_blank(cell: &Scalar) -> bool {
    match cell {
        Scalar::Empty => true,
        Scalar::Text(s) => s.trim().is_empty() || s.trim() == "nan",
        Scalar::Float(f) => f.is_nan(),
        Scalar::Integer(_) => false,
    }
}

proptest! {
    #[test]
    fn cleaned_tables_hold_their_invariants(table in table_strategy()) {
        let cleaned = clean(&table);
        let distinct = cleaned.rows.iter().collect::<HashSet<_>>();
        prop_assert_eq!(distinct.len(), cleaned.len());
        if cleaned.width() >= 2 {
            prop_assert!(cleaned.rows.iter().all(|row| !is_blank(&row[1])));
        }
        prop_assert!(cleaned
            .rows
            .iter()
            .flatten()
            .all(|cell| !matches!(cell, Scalar::Text(s) if s.contains('\''))));
        prop_assert_eq!(clean(&cleaned), cleaned.clone());
        prop_assert!(cleaned.len() <= table.len());
    }
}
