//! Interfaces to the three remote collaborators plus local filesystem
//! implementations of each.
//!
//! Every operation is a blocking round trip returning [`StoreResult`]; callers
//! decide whether a failure ends one unit of work or the whole pass.

pub mod ledger;
pub mod mailbox;
pub mod objects;

use std::{io, path::PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Scalar;

pub use ledger::{CsvLedgerStore, RangeSpec};
pub use mailbox::{MailDirStore, MessageFilter};
pub use objects::LocalObjectStore;

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const XLS_MIME: &str = "application/vnd.ms-excel";
pub const XLSM_MIME: &str = "application/vnd.ms-excel.sheet.macroEnabled.12";
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

/// MIME types the ingest workflow lists from the source folder.
pub const SPREADSHEET_MIMES: &[&str] = &[XLSX_MIME, XLS_MIME];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid range '{0}'")]
    InvalidRange(String),
    #[error("invalid identifier '{0}'")]
    InvalidId(String),
    #[error("malformed {what}: {reason}")]
    Format { what: String, reason: String },
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A listed file or folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: String,
    pub name: String,
    pub modified: DateTime<Utc>,
}

impl FileEntry {
    /// Listing order: most recently modified first, then by name.
    pub fn newest_first(a: &FileEntry, b: &FileEntry) -> std::cmp::Ordering {
        b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name))
    }
}

pub trait ObjectStore {
    /// Files directly inside `folder_id` whose MIME type is in `mime_filter`,
    /// newest first, at most `max_results`.
    fn list_files(
        &self,
        folder_id: &str,
        mime_filter: &[&str],
        max_results: usize,
    ) -> StoreResult<Vec<FileEntry>>;

    /// Folders directly inside `folder_id`, by name.
    fn list_folders(&self, folder_id: &str) -> StoreResult<Vec<FileEntry>>;

    fn download_file(&self, id: &str) -> StoreResult<Vec<u8>>;

    /// Returns the id of the folder `name` under `parent_id`, creating it only
    /// when it does not exist yet.
    fn create_folder(&self, name: &str, parent_id: &str) -> StoreResult<String>;

    fn upload_file(
        &self,
        name: &str,
        parent_id: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> StoreResult<String>;
}

pub trait LedgerStore {
    /// Formatted cell values of the range, trailing blanks trimmed.
    fn get_range(&self, sheet_id: &str, range: &str) -> StoreResult<Vec<Vec<String>>>;

    /// Appends rows after the last non-empty row of the range's tab.
    fn append_rows(&self, sheet_id: &str, range: &str, rows: &[Vec<Scalar>]) -> StoreResult<()>;

    fn clear_range(&self, sheet_id: &str, range: &str) -> StoreResult<()>;

    /// Writes rows starting at the range's top-left cell.
    fn update_range(&self, sheet_id: &str, range: &str, rows: &[Vec<Scalar>]) -> StoreResult<()>;

    /// Replaces the tab's whole content. Stores that can swap content in one
    /// step override this; the default clears then writes.
    fn replace_all(&self, sheet_id: &str, tab: &str, rows: &[Vec<Scalar>]) -> StoreResult<()> {
        self.clear_range(sheet_id, tab)?;
        self.update_range(sheet_id, &format!("{tab}!A1"), rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub date: Option<DateTime<FixedOffset>>,
    pub attachments: Vec<AttachmentRef>,
}

pub trait MessageStore {
    /// Ids of messages matching the filter, newest first.
    fn search_messages(&self, filter: &MessageFilter) -> StoreResult<Vec<String>>;

    fn get_message_metadata(&self, id: &str) -> StoreResult<MessageMetadata>;

    fn get_message_attachment(&self, message_id: &str, attachment_id: &str)
    -> StoreResult<Vec<u8>>;
}

/// MIME type for a file name, derived from its extension.
pub fn mime_for_name(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" => XLSX_MIME,
        "xls" => XLS_MIME,
        "xlsm" => XLSM_MIME,
        _ => OCTET_STREAM_MIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_for_name_uses_extension() {
        assert_eq!(mime_for_name("GRN.XLSX"), XLSX_MIME);
        assert_eq!(mime_for_name("old.xls"), XLS_MIME);
        assert_eq!(mime_for_name("macro.xlsm"), XLSM_MIME);
        assert_eq!(mime_for_name("notes"), OCTET_STREAM_MIME);
    }
}
