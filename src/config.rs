//! YAML run configuration.
//!
//! Every section carries serde defaults, so a partial file (or none at all)
//! yields a usable configuration. Relative store paths resolve against the
//! directory holding the configuration file.

use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

use crate::{merge::KeyColumns, table::HeaderRow};

pub const DEFAULT_BASE_FOLDER: &str = "Gmail_Attachments_BigBasket";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Substring matched against the sender; empty accepts every sender.
    pub sender: String,
    /// Comma-separated keywords, any of which may match.
    pub keywords: String,
    pub days_back: u32,
    pub max_results: usize,
    /// Folder created under `parent_folder` to hold per-sender folders.
    pub base_folder: String,
    pub parent_folder: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            sender: String::new(),
            keywords: "grn".to_string(),
            days_back: 2,
            max_results: 1000,
            base_folder: DEFAULT_BASE_FOLDER.to_string(),
            parent_folder: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Object store folder listed for spreadsheets.
    pub source_folder: String,
    /// 0-based header row, or -1 when files carry no header.
    pub header_row: i64,
    pub max_results: usize,
    /// Also ingest files in folders below `source_folder`, such as the
    /// per-sender folders intake creates.
    pub include_subfolders: bool,
    /// Run the reconciliation pass after appending.
    pub reconcile: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_folder: DEFAULT_BASE_FOLDER.to_string(),
            header_row: 0,
            max_results: 1000,
            include_subfolders: true,
            reconcile: true,
        }
    }
}

impl IngestConfig {
    pub fn header(&self) -> Result<HeaderRow> {
        HeaderRow::from_offset(self.header_row).ok_or_else(|| {
            anyhow!(
                "Invalid header row {}: use -1 for no header or a 0-based row offset",
                self.header_row
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub sheet_id: String,
    pub tab: String,
    /// Character encoding of the ledger files.
    pub encoding: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            sheet_id: "grn".to_string(),
            tab: "ledger".to_string(),
            encoding: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub objects: PathBuf,
    pub ledger: PathBuf,
    pub mail: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            objects: PathBuf::from("data/objects"),
            ledger: PathBuf::from("data/ledger"),
            mail: PathBuf::from("data/mail"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub intake: IntakeConfig,
    pub ingest: IngestConfig,
    pub ledger: LedgerConfig,
    pub keys: KeyColumns,
    pub stores: StoreConfig,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .with_context(|| format!("Reading config file {path:?}"))?;
        let mut config = Self::from_yaml(&raw).with_context(|| format!("Parsing {path:?}"))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Loads `path` when given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ingest.header()?;
        ensure!(self.intake.max_results > 0, "intake.max_results must be positive");
        ensure!(self.ingest.max_results > 0, "ingest.max_results must be positive");
        ensure!(
            !self.keys.primary.trim().is_empty() && !self.keys.secondary.trim().is_empty(),
            "Both key column names must be set"
        );
        ensure!(!self.ledger.tab.trim().is_empty(), "ledger.tab must be set");
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_yaml::to_string(self)?;
        let mut file =
            File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn resolve_store_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// Commented starting configuration written by `init`.
pub const TEMPLATE: &str = r#"# grn-ledger configuration
intake:
  # Substring of the sender address; empty matches everyone.
  sender: ""
  # Comma-separated keywords; a message matches when any appears.
  keywords: "grn"
  days_back: 2
  max_results: 1000
  base_folder: "Gmail_Attachments_BigBasket"
  parent_folder: ""
ingest:
  # Folder listed for spreadsheets to append.
  source_folder: "Gmail_Attachments_BigBasket"
  # 0-based header row; -1 when files have no header.
  header_row: 0
  max_results: 1000
  # Walk the per-sender folders under source_folder too.
  include_subfolders: true
  reconcile: true
ledger:
  sheet_id: "grn"
  tab: "ledger"
keys:
  primary: "Item Code"
  secondary: "po_number"
stores:
  objects: "data/objects"
  ledger: "data/ledger"
  mail: "data/mail"
"#;

pub fn write_template(path: &Path, force: bool) -> Result<()> {
    ensure!(
        force || !path.exists(),
        "{path:?} already exists; pass --force to overwrite"
    );
    let mut file = File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
    file.write_all(TEMPLATE.as_bytes())?;
    file.flush()?;
    Ok(())
}
