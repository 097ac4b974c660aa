//! Loads stored columns into [`ColumnSeries`], coercing by declared type.
//!
//! Only `TIMESTAMP` columns are coerced: each stored value is parsed day-first
//! and anything unparsable becomes missing instead of failing the read.
//! Every call goes back to the store.

use log::debug;

use crate::{
    data::{Value, parse_day_first_datetime},
    error::StoreResult,
    schema::ColumnType,
    store::{ROW_INDEX_COLUMN, Store, StoredColumn},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSeries {
    pub name: String,
    pub datatype: ColumnType,
    pub values: Vec<Option<Value>>,
}

impl ColumnSeries {
    pub fn new(name: impl Into<String>, datatype: ColumnType, values: Vec<Option<Value>>) -> Self {
        Self {
            name: name.into(),
            datatype,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn present(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().flatten()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    pub fn is_row_index(&self) -> bool {
        self.name.eq_ignore_ascii_case(ROW_INDEX_COLUMN)
    }
}

pub fn read_column(store: &Store, table: &str, column: &str) -> StoreResult<ColumnSeries> {
    Ok(coerce(store.fetch_column(table, column)?))
}

pub fn read_table(store: &Store, table: &str) -> StoreResult<Vec<ColumnSeries>> {
    Ok(store
        .fetch_all_columns(table)?
        .into_iter()
        .map(coerce)
        .collect())
}

pub fn coerce(stored: StoredColumn) -> ColumnSeries {
    let StoredColumn { spec, values } = stored;
    let values = match spec.datatype {
        ColumnType::Timestamp => {
            let mut dropped = 0usize;
            let parsed: Vec<Option<Value>> = values
                .into_iter()
                .map(|value| {
                    let coerced = value.as_ref().and_then(coerce_timestamp);
                    if value.is_some() && coerced.is_none() {
                        dropped += 1;
                    }
                    coerced
                })
                .collect();
            if dropped > 0 {
                debug!(
                    "Column '{}': {dropped} value(s) could not be read as timestamps and were treated as missing",
                    spec.name
                );
            }
            parsed
        }
        ColumnType::Integer | ColumnType::Real | ColumnType::Text => values,
    };
    ColumnSeries::new(spec.name, spec.datatype, values)
}

fn coerce_timestamp(value: &Value) -> Option<Value> {
    match value {
        Value::Timestamp(dt) => Some(Value::Timestamp(*dt)),
        Value::Text(raw) => parse_day_first_datetime(raw).ok().map(Value::Timestamp),
        Value::Integer(_) | Value::Real(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSpec;
    use chrono::NaiveDate;

    #[test]
    fn unparsable_timestamps_become_missing() {
        let stored = StoredColumn {
            spec: ColumnSpec::new("alta", ColumnType::Timestamp),
            values: vec![
                Some(Value::Text("05/01/2024".into())),
                Some(Value::Text("pronto".into())),
                None,
                Some(Value::Integer(17)),
            ],
        };
        let series = coerce(stored);
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            series.values,
            vec![Some(Value::Timestamp(expected)), None, None, None]
        );
        assert_eq!(series.missing_count(), 3);
    }

    #[test]
    fn other_types_pass_through() {
        let values = vec![Some(Value::Text("x".into())), Some(Value::Integer(3)), None];
        let series = coerce(StoredColumn {
            spec: ColumnSpec::new("mixta", ColumnType::Integer),
            values: values.clone(),
        });
        assert_eq!(series.values, values);
        assert_eq!(series.datatype, ColumnType::Integer);
    }
}
