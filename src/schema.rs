//! Column type vocabulary and column specifications.
//!
//! The store only ever declares four types: `INTEGER`, `REAL`, `TEXT` and
//! `TIMESTAMP`. [`ColumnType`] is the closed enum the summary engine dispatches
//! on; [`ColumnSpec`] pairs a column name with its declared type.

use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Timestamp,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["INTEGER", "REAL", "TEXT", "TIMESTAMP"]
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Real)
    }

    /// Maps a declared SQLite type onto the vocabulary using SQLite's own
    /// affinity rules, with date/time names routed to `Timestamp`.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        if upper.contains("INT") {
            ColumnType::Integer
        } else if upper.contains("TIME") || upper.contains("DATE") {
            ColumnType::Timestamp
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnType::Real
        } else {
            ColumnType::Text
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "integer" | "int" => Ok(ColumnType::Integer),
            "real" | "float" | "double" => Ok(ColumnType::Real),
            "text" | "string" => Ok(ColumnType::Text),
            "timestamp" | "datetime" | "date" => Ok(ColumnType::Timestamp),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub datatype: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, datatype: ColumnType) -> Self {
        Self {
            name: name.into(),
            datatype,
        }
    }
}

impl FromStr for ColumnSpec {
    type Err = anyhow::Error;

    /// Parses `name:TYPE`. The name is not validated here; the store does that
    /// before composing any statement.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, ty) = value
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("Column spec '{value}' must look like name:TYPE"))?;
        Ok(ColumnSpec::new(name.trim(), ty.parse()?))
    }
}
