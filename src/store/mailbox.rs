//! Mail-directory message store.
//!
//! Each message is a directory under the root named by its id, holding a
//! `message.json` header file plus the attachment files themselves:
//!
//! ```json
//! { "from": "Ops <ops@example.com>", "subject": "GRN 12",
//!   "date": "Tue, 14 Oct 2025 09:30:00 +0530", "attachments": ["grn.xlsx"] }
//! ```

use std::{fs, path::PathBuf};

use chrono::{DateTime, Duration, FixedOffset, Utc};
use log::warn;
use serde::Deserialize;

use super::{AttachmentRef, MessageMetadata, MessageStore, StoreError, StoreResult};

pub const HEADER_FILE: &str = "message.json";

/// Search criteria for attachment-bearing messages.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    pub sender: Option<String>,
    pub keywords: Vec<String>,
    pub lookback_days: u32,
    pub max_results: usize,
    pub now: DateTime<Utc>,
}

impl MessageFilter {
    /// `keywords` is the raw comma-separated OR list.
    pub fn new(sender: &str, keywords: &str, lookback_days: u32, max_results: usize) -> Self {
        let sender = sender.trim();
        Self {
            sender: (!sender.is_empty()).then(|| sender.to_string()),
            keywords: keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            lookback_days,
            max_results,
            now: Utc::now(),
        }
    }

    pub fn earliest(&self) -> DateTime<Utc> {
        self.now - Duration::days(i64::from(self.lookback_days))
    }

    /// The equivalent hosted mail search query.
    pub fn to_query(&self) -> String {
        let mut parts = vec!["has:attachment".to_string()];
        if let Some(sender) = &self.sender {
            parts.push(format!("from:\"{sender}\""));
        }
        match self.keywords.as_slice() {
            [] => {}
            [single] => parts.push(format!("\"{single}\"")),
            many => {
                let terms = many
                    .iter()
                    .map(|k| format!("\"{k}\""))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                parts.push(format!("({terms})"));
            }
        }
        parts.push(format!("after:{}", self.earliest().format("%Y/%m/%d")));
        parts.join(" ")
    }

    pub fn matches(&self, message: &MessageMetadata) -> bool {
        if message.attachments.is_empty() {
            return false;
        }
        if let Some(sender) = &self.sender
            && !message
                .sender
                .to_lowercase()
                .contains(&sender.to_lowercase())
        {
            return false;
        }
        if !self.keywords.is_empty() {
            let subject = message.subject.to_lowercase();
            let hit = self.keywords.iter().any(|keyword| {
                let keyword = keyword.to_lowercase();
                subject.contains(&keyword)
                    || message
                        .attachments
                        .iter()
                        .any(|a| a.filename.to_lowercase().contains(&keyword))
            });
            if !hit {
                return false;
            }
        }
        // `after:` in the query is day-granular, so the cutoff is too.
        match message.date {
            Some(date) => date.with_timezone(&Utc).date_naive() >= self.earliest().date_naive(),
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    #[serde(default)]
    from: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    attachments: Option<Vec<String>>,
}

pub fn parse_message_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

#[derive(Debug, Clone)]
pub struct MailDirStore {
    root: PathBuf,
}

impl MailDirStore {
    /// Opens an existing mail directory; a missing root is an error.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::NotFound {
                kind: "mail directory",
                id: root.display().to_string(),
            });
        }
        Ok(Self { root })
    }

    fn message_dir(&self, id: &str) -> StoreResult<PathBuf> {
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        let dir = self.root.join(id);
        if !dir.join(HEADER_FILE).is_file() {
            return Err(StoreError::NotFound {
                kind: "message",
                id: id.to_string(),
            });
        }
        Ok(dir)
    }
}

impl MessageStore for MailDirStore {
    fn search_messages(&self, filter: &MessageFilter) -> StoreResult<Vec<String>> {
        let mut hits = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|err| StoreError::io(&self.root, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io(&self.root, err))?;
            if !entry.path().join(HEADER_FILE).is_file() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.get_message_metadata(&id) {
                Ok(metadata) if filter.matches(&metadata) => hits.push(metadata),
                Ok(_) => {}
                Err(err) => warn!("Ignoring unreadable message {id}: {err}"),
            }
        }
        hits.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        Ok(hits
            .into_iter()
            .take(filter.max_results)
            .map(|m| m.id)
            .collect())
    }

    fn get_message_metadata(&self, id: &str) -> StoreResult<MessageMetadata> {
        let dir = self.message_dir(id)?;
        let header_path = dir.join(HEADER_FILE);
        let raw = fs::read_to_string(&header_path).map_err(|err| StoreError::io(&header_path, err))?;
        let header: MessageHeader =
            serde_json::from_str(&raw).map_err(|err| StoreError::Format {
                what: format!("message header {header_path:?}"),
                reason: err.to_string(),
            })?;
        let names = match header.attachments {
            Some(names) => names,
            None => {
                let mut names = Vec::new();
                for entry in fs::read_dir(&dir).map_err(|err| StoreError::io(&dir, err))? {
                    let entry = entry.map_err(|err| StoreError::io(&dir, err))?;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name != HEADER_FILE && entry.path().is_file() {
                        names.push(name);
                    }
                }
                names.sort();
                names
            }
        };
        Ok(MessageMetadata {
            id: id.to_string(),
            sender: header.from,
            subject: header.subject,
            date: header.date.as_deref().and_then(parse_message_date),
            attachments: names
                .into_iter()
                .map(|name| AttachmentRef {
                    id: name.clone(),
                    filename: name,
                })
                .collect(),
        })
    }

    fn get_message_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> StoreResult<Vec<u8>> {
        let dir = self.message_dir(message_id)?;
        if attachment_id.is_empty()
            || attachment_id == HEADER_FILE
            || attachment_id.contains(['/', '\\', '\0'])
            || attachment_id == ".."
        {
            return Err(StoreError::InvalidId(attachment_id.to_string()));
        }
        let path = dir.join(attachment_id);
        if !path.is_file() {
            return Err(StoreError::NotFound {
                kind: "attachment",
                id: format!("{message_id}/{attachment_id}"),
            });
        }
        fs::read(&path).map_err(|err| StoreError::io(&path, err))
    }
}
