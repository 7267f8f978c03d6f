//! Compound-key bookkeeping and the per-file dedup merge.
//!
//! Every ledger row is identified by a `(primary, secondary)` pair taken from
//! two configurable columns. Key components are compared on their canonical
//! text (see [`Scalar::key_text`]) so a key read back from the ledger as
//! `"1001"` matches a freshly parsed `1001`.

use std::collections::HashSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{data::Scalar, table::Table};

pub const DEFAULT_PRIMARY_KEY: &str = "Item Code";
pub const DEFAULT_SECONDARY_KEY: &str = "po_number";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("key column '{0}' not found")]
    MissingKeyColumn(String),
}

/// Names of the two columns forming the compound key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyColumns {
    pub primary: String,
    pub secondary: String,
}

impl Default for KeyColumns {
    fn default() -> Self {
        Self {
            primary: DEFAULT_PRIMARY_KEY.to_string(),
            secondary: DEFAULT_SECONDARY_KEY.to_string(),
        }
    }
}

impl KeyColumns {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// Positions of both key columns within `columns`.
    pub fn locate<S: AsRef<str>>(&self, columns: &[S]) -> Result<(usize, usize), MergeError> {
        let find = |name: &str| {
            columns
                .iter()
                .position(|c| c.as_ref() == name)
                .ok_or_else(|| MergeError::MissingKeyColumn(name.to_string()))
        };
        Ok((find(&self.primary)?, find(&self.secondary)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompoundKey {
    pub primary: String,
    pub secondary: String,
}

impl CompoundKey {
    pub fn from_cells(primary: &Scalar, secondary: &Scalar) -> Self {
        Self {
            primary: primary.key_text(),
            secondary: secondary.key_text(),
        }
    }

    pub fn from_text(primary: &str, secondary: &str) -> Self {
        Self::from_cells(&Scalar::from(primary), &Scalar::from(secondary))
    }
}

/// Keys known to exist in the ledger plus keys appended during the run.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashSet<CompoundKey>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set from raw ledger values, header first. An empty ledger
    /// yields an empty set; a header without both key columns is an error.
    pub fn from_ledger(values: &[Vec<String>], keys: &KeyColumns) -> Result<Self, MergeError> {
        let Some((header, rows)) = values.split_first() else {
            return Ok(Self::new());
        };
        let (primary, secondary) = keys.locate(header.as_slice())?;
        fn cell(row: &[String], idx: usize) -> &str {
            row.get(idx).map(String::as_str).unwrap_or("")
        }
        Ok(rows
            .iter()
            .map(|row| CompoundKey::from_text(cell(row, primary), cell(row, secondary)))
            .collect())
    }

    pub fn contains(&self, key: &CompoundKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Folds newly appended keys in; the set only ever grows.
    pub fn absorb(&mut self, added: impl IntoIterator<Item = CompoundKey>) {
        self.keys.extend(added);
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompoundKey> {
        self.keys.iter()
    }
}

impl FromIterator<CompoundKey> for KeySet {
    fn from_iter<I: IntoIterator<Item = CompoundKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub table: Table,
    pub new_keys: HashSet<CompoundKey>,
    /// Rows dropped because the same key appeared earlier in the file.
    pub internal_duplicates: usize,
    /// Rows dropped because their key is already known.
    pub known_duplicates: usize,
}

/// Filters `table` down to rows whose compound key is neither repeated
/// earlier in the table nor present in `existing`. Does not modify
/// `existing`; callers fold `new_keys` in before the next file.
pub fn reconcile_new_data(
    table: &Table,
    existing: &KeySet,
    keys: &KeyColumns,
) -> Result<MergeOutcome, MergeError> {
    let (primary, secondary) = keys.locate(table.columns.as_slice())?;
    let empty = Scalar::Empty;
    let cell = |row: &[Scalar], idx: usize| row.get(idx).unwrap_or(&empty).clone();
    let keyed = table
        .rows
        .iter()
        .map(|row| {
            let key = CompoundKey::from_cells(&cell(row, primary), &cell(row, secondary));
            (key, row)
        })
        .unique_by(|(key, _)| key.clone())
        .collect::<Vec<_>>();
    let internal_duplicates = table.len() - keyed.len();

    let mut new_keys = HashSet::new();
    let mut rows = Vec::new();
    for (key, row) in keyed {
        if existing.contains(&key) {
            continue;
        }
        new_keys.insert(key);
        rows.push(row.clone());
    }
    let known_duplicates = table.len() - internal_duplicates - rows.len();

    Ok(MergeOutcome {
        table: table.with_rows(rows),
        new_keys,
        internal_duplicates,
        known_duplicates,
    })
}
