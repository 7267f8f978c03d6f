//! Raw cell extraction from the zip-based spreadsheet container.
//!
//! This path runs after the structured readers have rejected a file, so it is
//! a permissive pattern scan rather than a schema-validating parse: it
//! tolerates missing workbook parts, namespace prefixes, truncated markup and
//! unknown attributes. Only the shared-string table and the first worksheet
//! part are consulted.

use std::{
    io::{Cursor, Read},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use log::debug;
use regex::Regex;
use zip::ZipArchive;

use crate::{
    data::{Scalar, normalize},
    grid::{CellCoordinate, CellGrid},
    io_utils,
};

const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const WORKSHEETS_DIR: &str = "xl/worksheets/";

/// Extracts the first worksheet's cells. Any failure yields an empty grid.
pub fn extract_grid(bytes: &[u8]) -> CellGrid {
    match try_extract_grid(bytes) {
        Ok(grid) => grid,
        Err(err) => {
            debug!("Container extraction found no data: {err:#}");
            CellGrid::new()
        }
    }
}

fn try_extract_grid(bytes: &[u8]) -> Result<CellGrid> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).context("Opening spreadsheet container")?;

    let shared_strings = match read_part(&mut archive, SHARED_STRINGS_PART) {
        Ok(Some(markup)) => parse_shared_strings(&markup),
        Ok(None) => Vec::new(),
        Err(err) => {
            debug!("Ignoring unreadable shared strings: {err:#}");
            Vec::new()
        }
    };

    let Some(sheet_part) = first_worksheet(&archive) else {
        debug!("Container has no worksheet part");
        return Ok(CellGrid::new());
    };
    let markup = read_part(&mut archive, &sheet_part)?.unwrap_or_default();
    let grid = scan_cells(&markup, &shared_strings);
    debug!(
        "Scanned {} cell(s) from {sheet_part} ({} shared string(s))",
        grid.len(),
        shared_strings.len()
    );
    Ok(grid)
}

fn read_part(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("Opening part {name}")),
    };
    let mut raw = Vec::new();
    if let Err(err) = entry.read_to_end(&mut raw) {
        // Keep whatever inflated before a corrupt tail.
        debug!("Part {name} truncated after {} byte(s): {err}", raw.len());
        if raw.is_empty() {
            return Err(err).with_context(|| format!("Reading part {name}"));
        }
    }
    Ok(Some(io_utils::decode_lossy(&raw)))
}

/// First worksheet part in archive order.
fn first_worksheet(archive: &ZipArchive<Cursor<&[u8]>>) -> Option<String> {
    archive
        .file_names()
        .find(|name| name.starts_with(WORKSHEETS_DIR) && name.ends_with(".xml"))
        .map(str::to_string)
}

fn shared_item_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<(?:\w+:)?si(?:\s[^>]*)?>(.*?)</(?:\w+:)?si>")
            .expect("shared item pattern is valid")
    })
}

fn text_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<(?:\w+:)?t(?:\s[^>]*)?>(.*?)</(?:\w+:)?t>")
            .expect("text run pattern is valid")
    })
}

fn phonetic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<(?:\w+:)?rPh\b.*?</(?:\w+:)?rPh>").expect("phonetic pattern is valid")
    })
}

fn cell_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<(?:\w+:)?c(\s[^>]*?)?(?:/>|>(.*?)</(?:\w+:)?c>)")
            .expect("cell pattern is valid")
    })
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?:^|\s)(r|t)\s*=\s*["']([^"']*)["']"#).expect("attribute pattern is valid")
    })
}

fn value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<(?:\w+:)?v(?:\s[^>]*)?>(.*?)</(?:\w+:)?v>")
            .expect("value pattern is valid")
    })
}

fn inline_string_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<(?:\w+:)?is(?:\s[^>]*)?>(.*?)</(?:\w+:)?is>")
            .expect("inline string pattern is valid")
    })
}

fn unescape(text: &str) -> String {
    quick_xml::escape::unescape(text)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

fn concat_runs(markup: &str) -> String {
    let without_phonetics = phonetic_pattern().replace_all(markup, "");
    text_run_pattern()
        .captures_iter(&without_phonetics)
        .map(|caps| unescape(&caps[1]))
        .collect()
}

/// Builds the shared-string index. Each `<si>` item is one entry; rich-text
/// items concatenate their runs. Markup without `<si>` wrappers falls back to
/// one entry per text run.
pub fn parse_shared_strings(markup: &str) -> Vec<String> {
    let items = shared_item_pattern()
        .captures_iter(markup)
        .map(|caps| concat_runs(&caps[1]).trim().to_string())
        .collect::<Vec<_>>();
    if !items.is_empty() {
        return items;
    }
    text_run_pattern()
        .captures_iter(markup)
        .map(|caps| unescape(&caps[1]).trim().to_string())
        .collect()
}

/// Scans worksheet markup for cells carrying a reference attribute and
/// resolves each one to a normalized scalar.
pub fn scan_cells(markup: &str, shared_strings: &[String]) -> CellGrid {
    let mut grid = CellGrid::new();
    for caps in cell_pattern().captures_iter(markup) {
        let attributes = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");

        let mut reference = None;
        let mut cell_type = None;
        for attr in attribute_pattern().captures_iter(attributes) {
            match &attr[1] {
                "r" => reference = Some(attr.get(2).map(|m| m.as_str()).unwrap_or("")),
                "t" => cell_type = Some(attr.get(2).map(|m| m.as_str()).unwrap_or("")),
                _ => {}
            }
        }
        let Some(coordinate) = reference.and_then(CellCoordinate::parse) else {
            continue;
        };

        let value = resolve_value(body, cell_type, shared_strings);
        grid.insert(coordinate, normalize(value.as_deref()));
    }
    grid
}

fn resolve_value(body: &str, cell_type: Option<&str>, shared_strings: &[String]) -> Option<String> {
    if let Some(inline) = inline_string_pattern().captures(body) {
        let text = concat_runs(&inline[1]);
        if !text.trim().is_empty() {
            return Some(text);
        }
    }
    let raw = value_pattern()
        .captures(body)
        .map(|caps| unescape(&caps[1]))?;
    if cell_type == Some("s") {
        let resolved = raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| shared_strings.get(idx))
            .cloned();
        return Some(resolved.unwrap_or(raw));
    }
    Some(raw)
}

/// The first worksheet as rows: only rows holding cells, padded to the
/// widest column.
pub fn extract_rows(bytes: &[u8]) -> Vec<Vec<Scalar>> {
    extract_grid(bytes).to_rows()
}
