#![allow(dead_code)]

use std::cell::Cell;
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use grn_ledger::data::Scalar;
use grn_ledger::grid::column_letters;
use grn_ledger::store::{CsvLedgerStore, LedgerStore, StoreError, StoreResult};
use tempfile::{TempDir, tempdir};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }
}

/// Pins a file's modification time `age_secs` seconds in the past so listings
/// order deterministically.
pub fn set_age(path: &Path, age_secs: u64) {
    let file = File::options().write(true).open(path).expect("open for mtime");
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .expect("set mtime");
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#;

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Worksheet and shared-string markup for `rows`. Blank cells are omitted,
/// numeric-looking cells are stored as values and the rest as shared strings.
pub fn sheet_parts(rows: &[&[&str]]) -> (String, String) {
    let mut shared: Vec<String> = Vec::new();
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        let row_number = r + 1;
        sheet.push_str(&format!(r#"<row r="{row_number}">"#));
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let reference = format!("{}{row_number}", column_letters(c as u32 + 1));
            if value.parse::<f64>().is_ok() {
                sheet.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#));
            } else {
                let idx = match shared.iter().position(|s| s == value) {
                    Some(idx) => idx,
                    None => {
                        shared.push(value.to_string());
                        shared.len() - 1
                    }
                };
                sheet.push_str(&format!(r#"<c r="{reference}" t="s"><v>{idx}</v></c>"#));
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let mut strings = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
        shared.len()
    );
    for value in &shared {
        strings.push_str(&format!("<si><t>{}</t></si>", escape(value)));
    }
    strings.push_str("</sst>");
    (sheet, strings)
}

fn zip_parts(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, contents) in parts {
        writer.start_file(*name, options).expect("start zip entry");
        writer
            .write_all(contents.as_bytes())
            .expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// A well-formed single-sheet workbook.
pub fn xlsx_bytes(rows: &[&[&str]]) -> Vec<u8> {
    let (sheet, strings) = sheet_parts(rows);
    zip_parts(&[
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/sharedStrings.xml", &strings),
        ("xl/worksheets/sheet1.xml", &sheet),
    ])
}

/// A container the structured readers reject (no workbook part) whose
/// worksheet markup is still intact.
pub fn broken_xlsx_bytes(rows: &[&[&str]]) -> Vec<u8> {
    let (sheet, strings) = sheet_parts(rows);
    zip_parts(&[
        ("xl/sharedStrings.xml", &strings),
        ("xl/worksheets/sheet1.xml", &sheet),
    ])
}

/// Zip container holding arbitrary parts.
pub fn container_bytes(parts: &[(&str, &str)]) -> Vec<u8> {
    zip_parts(parts)
}

pub fn text(value: &str) -> Scalar {
    Scalar::Text(value.to_string())
}

pub fn strings(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|s| s.to_string()).collect())
        .collect()
}

/// Ledger double that delegates to a CSV store but can be told to fail reads
/// or writes.
pub struct FlakyLedger {
    pub inner: CsvLedgerStore,
    pub fail_reads: Cell<bool>,
    pub fail_writes: Cell<bool>,
}

impl FlakyLedger {
    pub fn new(inner: CsvLedgerStore) -> Self {
        Self {
            inner,
            fail_reads: Cell::new(false),
            fail_writes: Cell::new(false),
        }
    }

    fn check(&self, flag: &Cell<bool>) -> StoreResult<()> {
        if flag.get() {
            Err(StoreError::Other(anyhow::anyhow!("simulated outage")))
        } else {
            Ok(())
        }
    }
}

impl LedgerStore for FlakyLedger {
    fn get_range(&self, sheet_id: &str, range: &str) -> StoreResult<Vec<Vec<String>>> {
        self.check(&self.fail_reads)?;
        self.inner.get_range(sheet_id, range)
    }

    fn append_rows(&self, sheet_id: &str, range: &str, rows: &[Vec<Scalar>]) -> StoreResult<()> {
        self.check(&self.fail_writes)?;
        self.inner.append_rows(sheet_id, range, rows)
    }

    fn clear_range(&self, sheet_id: &str, range: &str) -> StoreResult<()> {
        self.check(&self.fail_writes)?;
        self.inner.clear_range(sheet_id, range)
    }

    fn update_range(&self, sheet_id: &str, range: &str, rows: &[Vec<Scalar>]) -> StoreResult<()> {
        self.check(&self.fail_writes)?;
        self.inner.update_range(sheet_id, range, rows)
    }
}

/// Writes a mail-directory message with the given attachments.
pub fn write_message(
    root: &Path,
    id: &str,
    from: &str,
    subject: &str,
    date: &str,
    attachments: &[(&str, &[u8])],
) {
    let dir = root.join(id);
    fs::create_dir_all(&dir).expect("message dir");
    let header = serde_json::json!({
        "from": from,
        "subject": subject,
        "date": date,
    });
    fs::write(dir.join("message.json"), header.to_string()).expect("message header");
    for (name, bytes) in attachments {
        fs::write(dir.join(name), bytes).expect("attachment");
    }
}
