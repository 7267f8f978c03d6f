use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

/// Characters removed from cell text before typing. Legacy producer tooling
/// prefixes numeric text with a quote to force text storage.
const DECORATION: char = '\'';

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Scalar {
    #[default]
    Empty,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn is_empty(&self) -> bool {
        matches!(self, Scalar::Empty)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Scalar::Integer(_) | Scalar::Float(_))
    }

    /// Rendering used for persistence and display. `Empty` renders as an
    /// empty string and whole floats keep their fractional marker so the
    /// rendered form normalizes back to the same variant.
    pub fn as_display(&self) -> String {
        match self {
            Scalar::Empty => String::new(),
            Scalar::Integer(i) => i.to_string(),
            Scalar::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Scalar::Text(s) => s.clone(),
        }
    }

    /// Canonical text used when cells take part in a compound key or a key
    /// sort. Cells that normalize to the same scalar share the same key text.
    pub fn key_text(&self) -> String {
        match self {
            Scalar::Text(s) => normalize(Some(s)).as_display(),
            other => other.as_display(),
        }
    }

    /// Removes decorative apostrophes from textual cells. Text that becomes
    /// blank collapses to `Empty`.
    pub fn strip_decoration(&self) -> Scalar {
        match self {
            Scalar::Text(s) if s.contains(DECORATION) => {
                let stripped = s.replace(DECORATION, "");
                if stripped.trim().is_empty() {
                    Scalar::Empty
                } else {
                    Scalar::Text(stripped)
                }
            }
            other => other.clone(),
        }
    }

    /// Types ledger text: numeric-looking cells become numbers, blanks become
    /// `Empty` and everything else keeps its original text verbatim.
    pub fn from_ledger_text(value: &str) -> Scalar {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Scalar::Empty;
        }
        parse_numeric(trimmed).unwrap_or_else(|| Scalar::Text(value.to_string()))
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Empty, Scalar::Empty) => true,
            (Scalar::Integer(a), Scalar::Integer(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a.to_bits() == b.to_bits(),
            (Scalar::Text(a), Scalar::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Scalar::Empty => {}
            Scalar::Integer(i) => i.hash(state),
            Scalar::Float(f) => f.to_bits().hash(state),
            Scalar::Text(s) => s.hash(state),
        }
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(value: &Scalar) -> u8 {
            match value {
                Scalar::Empty => 0,
                Scalar::Integer(_) | Scalar::Float(_) => 1,
                Scalar::Text(_) => 2,
            }
        }
        match (self, other) {
            (Scalar::Integer(a), Scalar::Integer(b)) => a.cmp(b),
            (Scalar::Float(a), Scalar::Float(b)) => a.total_cmp(b),
            // Numerically equal mixed values are still unequal; integers go first.
            (Scalar::Integer(a), Scalar::Float(b)) => {
                (*a as f64).total_cmp(b).then(Ordering::Less)
            }
            (Scalar::Float(a), Scalar::Integer(b)) => {
                a.total_cmp(&(*b as f64)).then(Ordering::Greater)
            }
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        normalize(Some(value))
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

/// Canonicalizes raw cell text into a typed scalar. Never fails: anything that
/// does not parse as a number stays text.
pub fn normalize(raw: Option<&str>) -> Scalar {
    let Some(raw) = raw else {
        return Scalar::Empty;
    };
    if raw.trim().is_empty() {
        return Scalar::Empty;
    }
    let stripped = raw.replace(DECORATION, "");
    let value = stripped.trim();
    if value.is_empty() {
        return Scalar::Empty;
    }
    parse_numeric(value).unwrap_or_else(|| Scalar::Text(value.to_string()))
}

fn parse_numeric(value: &str) -> Option<Scalar> {
    if value.contains(['.', 'e', 'E']) {
        value
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Scalar::Float)
    } else {
        value.parse::<i64>().ok().map(Scalar::Integer)
    }
}

pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_string()
}

pub fn synthesized_column_name(position: usize) -> String {
    format!("Column_{}", position + 1)
}
