//! Turns a freshly parsed [`Dataset`] into a stored table.
//!
//! Column types are inferred from the values (integer, then real, then
//! day-first timestamp, else text). Text columns whose every value reads as a
//! date-time become `TIMESTAMP`. Headers are sanitized into valid identifiers
//! and de-duplicated before the table is replaced wholesale.

use std::collections::HashSet;

use log::info;
use serde::Serialize;

use crate::{
    data::{Dataset, DatasetColumn, parse_day_first_datetime},
    error::StoreResult,
    identifier::{check_name, sanitize_name},
    schema::{ColumnSpec, ColumnType},
    store::{ROW_INDEX_COLUMN, Store},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub table: String,
    pub rows: usize,
    pub columns: Vec<ColumnSpec>,
    /// `(original, sanitized)` for every header that had to change.
    pub renamed: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDataset {
    pub dataset: Dataset,
    pub renamed: Vec<(String, String)>,
}

pub fn ingest_dataset(store: &mut Store, table: &str, dataset: Dataset) -> StoreResult<IngestReport> {
    let ident = check_name(table)?;
    let NormalizedDataset { dataset, renamed } = normalize_dataset(dataset);
    for (original, sanitized) in &renamed {
        info!("Column '{original}' stored as '{sanitized}'");
    }
    let rows = store.create_table_from_dataset(ident.as_str(), &dataset, true)?;
    let columns = dataset
        .columns
        .iter()
        .map(|column| {
            ColumnSpec::new(
                column.name.clone(),
                column.type_hint.unwrap_or(ColumnType::Text),
            )
        })
        .collect();
    Ok(IngestReport {
        table: ident.into_string(),
        rows,
        columns,
        renamed,
    })
}

pub fn normalize_dataset(dataset: Dataset) -> NormalizedDataset {
    let raw_names = dataset
        .columns
        .iter()
        .map(|column| column.name.clone())
        .collect::<Vec<_>>();
    let names = sanitize_column_names(&raw_names);
    let renamed = raw_names
        .iter()
        .zip(&names)
        .filter(|(raw, clean)| raw != clean)
        .map(|(raw, clean)| (raw.clone(), clean.clone()))
        .collect();
    let columns = dataset
        .columns
        .into_iter()
        .zip(names)
        .map(|(column, name)| {
            let datatype = infer_column_type(&column);
            DatasetColumn {
                name,
                type_hint: Some(datatype),
                values: column.values,
            }
        })
        .collect();
    NormalizedDataset {
        dataset: Dataset::new(columns),
        renamed,
    }
}

/// Keeps an explicit non-text hint; otherwise infers from the present values.
/// A text hint still upgrades to `TIMESTAMP` when every value parses.
pub fn infer_column_type(column: &DatasetColumn) -> ColumnType {
    let mut values = column.present_values().map(str::trim).peekable();
    if values.peek().is_none() {
        return column.type_hint.unwrap_or(ColumnType::Text);
    }
    let values = values.collect::<Vec<_>>();
    let all = |check: fn(&str) -> bool| values.iter().all(|v| check(v));
    let is_timestamp = |v: &str| parse_day_first_datetime(v).is_ok();

    match column.type_hint {
        Some(ColumnType::Text) if all(is_timestamp) => ColumnType::Timestamp,
        Some(hint) => hint,
        None if all(|v| v.parse::<i64>().is_ok()) => ColumnType::Integer,
        None if all(|v| v.parse::<f64>().is_ok()) => ColumnType::Real,
        None if all(is_timestamp) => ColumnType::Timestamp,
        None => ColumnType::Text,
    }
}

/// Sanitizes headers into identifiers, numbering empty results by position
/// and suffixing `_2`, `_3`, … on case-insensitive collisions (the synthetic
/// row index name is reserved).
pub fn sanitize_column_names(raw: &[String]) -> Vec<String> {
    let mut taken = HashSet::from([ROW_INDEX_COLUMN.to_ascii_lowercase()]);
    raw.iter()
        .enumerate()
        .map(|(idx, name)| {
            let mut base = sanitize_name(name);
            if base.is_empty() {
                base = format!("columna_{}", idx + 1);
            }
            let mut candidate = base.clone();
            let mut suffix = 2;
            while !taken.insert(candidate.to_ascii_lowercase()) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            candidate
        })
        .collect()
}
