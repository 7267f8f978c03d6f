mod common;

use std::fs;

use assert_cmd::Command;
use chrono::Utc;
use common::{TestWorkspace, write_message, xlsx_bytes};
use predicates::prelude::*;
use predicates::str::contains;

fn grn_ledger() -> Command {
    Command::cargo_bin("grn-ledger").expect("binary exists")
}

#[test]
fn init_writes_template_and_refuses_to_clobber() {
    let workspace = TestWorkspace::new();
    let path = workspace.path().join("grn.yaml");
    grn_ledger()
        .args(["init", "-o", path.to_str().unwrap()])
        .assert()
        .success();
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("po_number"));

    grn_ledger()
        .args(["init", "-o", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("--force"));
    grn_ledger()
        .args(["init", "-o", path.to_str().unwrap(), "--force"])
        .assert()
        .success();
}

#[test]
fn inspect_prints_the_winning_reader_and_rows() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "grn.xlsx",
        &xlsx_bytes(&[
            &["Item Code", "po_number", "Qty"],
            &["A1", "PO1", "10"],
            &["A2", "PO2", "20"],
            &["A3", "PO3", "30"],
        ]),
    );
    grn_ledger()
        .args(["inspect", "-i", path.to_str().unwrap(), "--rows", "2"])
        .assert()
        .success()
        .stdout(contains("3 row(s) x 3 column(s) via the modern reader"))
        .stdout(contains("Item Code"))
        .stdout(contains("PO2"))
        .stdout(contains("PO3").not());
}

#[test]
fn inspect_reports_unreadable_files() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("broken.xlsx", b"definitely not a workbook");
    grn_ledger()
        .args(["inspect", "-i", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("no data could be extracted"));
}

#[test]
fn header_row_below_minus_one_is_rejected() {
    grn_ledger()
        .args(["ingest", "--header-row", "-2"])
        .assert()
        .failure()
        .stderr(contains("Header row must be -1"));
}

#[test]
fn run_moves_attachments_into_the_ledger() {
    let workspace = TestWorkspace::new();
    let config_path = workspace.write(
        "grn.yaml",
        br#"intake:
  sender: "ops@example.com"
stores:
  objects: "objects"
  ledger: "ledger"
  mail: "mail"
"#,
    );
    let mail_root = workspace.path().join("mail");
    write_message(
        &mail_root,
        "m1",
        "Ops <ops@example.com>",
        "GRN batch",
        &Utc::now().to_rfc3339(),
        &[(
            "grn.xlsx",
            &xlsx_bytes(&[
                &["Item Code", "po_number", "Qty"],
                &["A2", "PO2", "20"],
                &["A1", "PO1", "10"],
                &["A1", "PO1", "10"],
            ]),
        )],
    );

    grn_ledger()
        .args(["--config", config_path.to_str().unwrap(), "run"])
        .assert()
        .success()
        .stdout(contains("Attachments uploaded"))
        .stdout(contains("Rows appended"));

    let ledger = fs::read_to_string(workspace.path().join("ledger/grn/ledger.csv")).unwrap();
    let lines = ledger.lines().collect::<Vec<_>>();
    assert_eq!(
        lines,
        vec!["Item Code,po_number,Qty", "A1,PO1,10", "A2,PO2,20"]
    );

    // Nothing new the second time round.
    grn_ledger()
        .args(["--config", config_path.to_str().unwrap(), "run"])
        .assert()
        .success();
    let again = fs::read_to_string(workspace.path().join("ledger/grn/ledger.csv")).unwrap();
    assert_eq!(again, ledger);
}

#[test]
fn run_fails_when_the_mail_store_is_missing() {
    let workspace = TestWorkspace::new();
    let config_path = workspace.write("grn.yaml", b"stores:\n  mail: \"absent\"\n");
    grn_ledger()
        .args(["--config", config_path.to_str().unwrap(), "run"])
        .assert()
        .failure()
        .stderr(contains("mail store"));
}
