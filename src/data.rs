use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::schema::ColumnType;

/// Canonical rendering for timestamps, both in storage and in summaries.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Text(s) => s.clone(),
            Value::Timestamp(dt) => format_timestamp(dt),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Timestamp(dt) => serializer.serialize_str(&format_timestamp(dt)),
        }
    }
}

pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
];

const DAY_FIRST_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"];

/// Parses a date or date-time, reading ambiguous `a/b/yyyy` forms as
/// day/month. Date-only values land on midnight.
pub fn parse_day_first_datetime(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    for fmt in DAY_FIRST_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(parsed);
        }
    }
    for fmt in DAY_FIRST_DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(parsed.and_time(chrono::NaiveTime::MIN));
        }
    }
    Err(anyhow!("Failed to parse '{value}' as a day-first date-time"))
}

/// Tokens that ingestion treats as missing, compared case-insensitively.
pub fn is_placeholder_token(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    matches!(
        lowered.as_str(),
        "" | "na" | "n/a" | "nan" | "null" | "none"
    )
}

/// Converts a raw cell into a typed value. `None` marks a missing cell.
pub fn parse_typed_value(value: &str, ty: ColumnType) -> Result<Option<Value>> {
    if is_placeholder_token(value) {
        return Ok(None);
    }
    let trimmed = value.trim();
    let parsed = match ty {
        ColumnType::Integer => Value::Integer(
            trimmed
                .parse()
                .map_err(|_| anyhow!("Failed to parse '{value}' as integer"))?,
        ),
        ColumnType::Real => Value::Real(
            trimmed
                .parse()
                .map_err(|_| anyhow!("Failed to parse '{value}' as real"))?,
        ),
        ColumnType::Text => Value::Text(value.to_string()),
        ColumnType::Timestamp => Value::Timestamp(parse_day_first_datetime(trimmed)?),
    };
    Ok(Some(parsed))
}

/// One column of a freshly parsed upload.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetColumn {
    pub name: String,
    pub values: Vec<Option<String>>,
    pub type_hint: Option<ColumnType>,
}

impl DatasetColumn {
    pub fn new(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values,
            type_hint: None,
        }
    }

    pub fn with_hint(mut self, hint: ColumnType) -> Self {
        self.type_hint = Some(hint);
        self
    }

    pub fn present_values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().filter_map(|v| v.as_deref())
    }
}

/// Parsed tabular upload: ordered columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<DatasetColumn>,
}

impl Dataset {
    pub fn new(columns: Vec<DatasetColumn>) -> Self {
        Self { columns }
    }

    /// Builds a dataset from a header row and row-major string records.
    pub fn from_rows(headers: &[String], rows: &[Vec<String>]) -> Self {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let values = rows
                    .iter()
                    .map(|row| {
                        row.get(idx)
                            .filter(|raw| !is_placeholder_token(raw))
                            .cloned()
                    })
                    .collect();
                DatasetColumn::new(header.clone(), values)
            })
            .collect();
        Self { columns }
    }

    pub fn row_count(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.values.len())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn day_first_reads_slashes_as_day_month() {
        assert_eq!(
            parse_day_first_datetime("03/04/2024").unwrap(),
            at(2024, 4, 3, 0, 0, 0)
        );
        assert_eq!(
            parse_day_first_datetime("13/01/2024 08:15:00").unwrap(),
            at(2024, 1, 13, 8, 15, 0)
        );
        assert!(parse_day_first_datetime("01/13/2024").is_err());
    }

    #[test]
    fn day_first_accepts_iso_forms() {
        assert_eq!(
            parse_day_first_datetime("2024-05-06T14:30:00").unwrap(),
            at(2024, 5, 6, 14, 30, 0)
        );
        assert_eq!(
            parse_day_first_datetime(" 2024-05-06 ").unwrap(),
            at(2024, 5, 6, 0, 0, 0)
        );
        assert!(parse_day_first_datetime("mañana").is_err());
        assert!(parse_day_first_datetime("42").is_err());
    }

    #[test]
    fn typed_values_treat_placeholders_as_missing() {
        assert_eq!(parse_typed_value("", ColumnType::Integer).unwrap(), None);
        assert_eq!(parse_typed_value("N/A", ColumnType::Real).unwrap(), None);
        assert_eq!(
            parse_typed_value(" 7 ", ColumnType::Integer).unwrap(),
            Some(Value::Integer(7))
        );
        assert!(parse_typed_value("siete", ColumnType::Integer).is_err());
    }

    #[test]
    fn timestamps_display_canonically() {
        let value = parse_typed_value("06/05/2024 14:30", ColumnType::Timestamp)
            .unwrap()
            .unwrap();
        assert_eq!(value.as_display(), "2024-05-06 14:30:00");
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            "\"2024-05-06 14:30:00\""
        );
    }

    #[test]
    fn dataset_from_rows_is_column_major() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let rows = vec![
            vec!["1".to_string(), "x".to_string()],
            vec!["NA".to_string(), "y".to_string()],
        ];
        let dataset = Dataset::from_rows(&headers, &rows);
        assert_eq!(dataset.row_count(), 2);
        assert_eq!(
            dataset.columns[0].values,
            vec![Some("1".to_string()), None]
        );
        assert_eq!(dataset.columns[1].present_values().count(), 2);
    }
}
