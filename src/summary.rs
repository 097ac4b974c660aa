//! Type-dispatched descriptive statistics.
//!
//! The declared [`ColumnType`] alone decides what a column reports:
//!
//! | type               | statistics                                                  |
//! |--------------------|-------------------------------------------------------------|
//! | `INTEGER`, `REAL`  | mean, sample std dev, min, max, median, quintiles, quartiles |
//! | `TIMESTAMP`        | min, max, median, quintiles, quartiles (formatted back)     |
//! | `TEXT`             | value counts and every value tied for the top count         |
//!
//! Numeric statistics over data that is not numeric fail with
//! [`StoreError::NonNumericOperation`]; nothing is silently defaulted.
//! Output field names follow the Spanish vocabulary the front end shows.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::info;
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{
    correlation::{CorrelationMatrix, correlation_matrices, pearson_pairwise},
    data::{Value, format_timestamp},
    error::{StoreError, StoreResult},
    reader::{ColumnSeries, read_column, read_table},
    schema::ColumnType,
    store::Store,
};

pub const QUINTILES: [u8; 4] = [20, 40, 60, 80];
pub const QUARTILES: [u8; 3] = [25, 50, 75];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    #[serde(rename = "media")]
    pub mean: Option<f64>,
    #[serde(rename = "desviacion_estandar")]
    pub std_dev: Option<f64>,
    #[serde(rename = "minimo")]
    pub min: Option<f64>,
    #[serde(rename = "maximo")]
    pub max: Option<f64>,
    #[serde(rename = "mediana")]
    pub median: Option<f64>,
    pub quintiles: BTreeMap<u8, f64>,
    #[serde(rename = "cuartiles")]
    pub quartiles: BTreeMap<u8, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalSummary {
    #[serde(rename = "minimo")]
    pub min: Option<String>,
    #[serde(rename = "maximo")]
    pub max: Option<String>,
    #[serde(rename = "mediana")]
    pub median: Option<String>,
    pub quintiles: BTreeMap<u8, String>,
    #[serde(rename = "cuartiles")]
    pub quartiles: BTreeMap<u8, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalSummary {
    #[serde(rename = "conteo")]
    pub counts: BTreeMap<String, usize>,
    #[serde(rename = "moda")]
    pub mode: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnSummary {
    Numeric(NumericSummary),
    Temporal(TemporalSummary),
    Categorical(CategoricalSummary),
}

impl ColumnSummary {
    pub fn as_numeric(&self) -> Option<&NumericSummary> {
        match self {
            ColumnSummary::Numeric(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn as_temporal(&self) -> Option<&TemporalSummary> {
        match self {
            ColumnSummary::Temporal(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&CategoricalSummary> {
        match self {
            ColumnSummary::Categorical(summary) => Some(summary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairSummary {
    #[serde(rename = "columnas", serialize_with = "serialize_pairs")]
    pub columns: Vec<(String, ColumnSummary)>,
    #[serde(rename = "correlacion", skip_serializing_if = "Option::is_none")]
    pub correlation: Option<f64>,
    #[serde(rename = "p_valor", skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    #[serde(rename = "columnas", serialize_with = "serialize_pairs")]
    pub columns: Vec<(String, ColumnSummary)>,
    #[serde(rename = "correlaciones")]
    pub correlations: CorrelationMatrix,
    #[serde(rename = "p_valores")]
    pub p_values: CorrelationMatrix,
}

impl TableSummary {
    pub fn column(&self, name: &str) -> Option<&ColumnSummary> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, summary)| summary)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NullReport {
    #[serde(rename = "nulos_por_columna", serialize_with = "serialize_pairs")]
    pub missing_per_column: Vec<(String, usize)>,
    #[serde(rename = "filas_con_nulos")]
    pub rows_with_missing: Vec<usize>,
}

/// Serializes ordered `(key, value)` pairs as a map, keeping their order.
fn serialize_pairs<S, K, V>(pairs: &[(K, V)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    K: Serialize,
    V: Serialize,
{
    let mut map = serializer.serialize_map(Some(pairs.len()))?;
    for (key, value) in pairs {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

/// Present values as `f64`. Fails unless the column is declared numeric and
/// every present value is a number.
pub fn numeric_values(series: &ColumnSeries) -> StoreResult<Vec<f64>> {
    let non_numeric = || StoreError::NonNumericOperation {
        column: series.name.clone(),
    };
    if !series.datatype.is_numeric() {
        return Err(non_numeric());
    }
    series
        .present()
        .map(|value| value.as_f64().ok_or_else(non_numeric))
        .collect()
}

pub fn mean(series: &ColumnSeries) -> StoreResult<Option<f64>> {
    Ok(mean_of(&numeric_values(series)?))
}

/// Sample standard deviation (divides by `n - 1`); `None` below two values.
pub fn standard_deviation(series: &ColumnSeries) -> StoreResult<Option<f64>> {
    Ok(std_dev_of(&numeric_values(series)?))
}

pub fn minimum(series: &ColumnSeries) -> StoreResult<Option<f64>> {
    Ok(numeric_values(series)?.into_iter().reduce(f64::min))
}

pub fn maximum(series: &ColumnSeries) -> StoreResult<Option<f64>> {
    Ok(numeric_values(series)?.into_iter().reduce(f64::max))
}

pub fn median(series: &ColumnSeries) -> StoreResult<Option<f64>> {
    let sorted = sorted(numeric_values(series)?);
    Ok(quantile(&sorted, 0.5))
}

/// Quantiles at the given percentiles, keyed by percentile.
pub fn quantiles(series: &ColumnSeries, percentiles: &[u8]) -> StoreResult<BTreeMap<u8, f64>> {
    let sorted = sorted(numeric_values(series)?);
    Ok(quantile_map(&sorted, percentiles))
}

/// Occurrences of each distinct present value.
pub fn value_counts(series: &ColumnSeries) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for value in series.present() {
        *counts.entry(value.as_display()).or_insert(0) += 1;
    }
    counts
}

/// Every value tied for the highest count, in sorted order.
pub fn obtain_mode(series: &ColumnSeries) -> Vec<String> {
    mode_of(&value_counts(series))
}

fn mode_of(counts: &BTreeMap<String, usize>) -> Vec<String> {
    let Some(top) = counts.values().max().copied() else {
        return Vec::new();
    };
    counts
        .iter()
        .filter(|(_, count)| **count == top)
        .map(|(value, _)| value.clone())
        .collect()
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn std_dev_of(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean_of(values)?;
    let squares = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Some((squares / (values.len() - 1) as f64).sqrt())
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}

/// Linear interpolation between the closest ranks at position `(n - 1)·q`.
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let position = last as f64 * q;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

fn quantile_map(sorted: &[f64], percentiles: &[u8]) -> BTreeMap<u8, f64> {
    percentiles
        .iter()
        .filter_map(|p| quantile(sorted, f64::from(*p) / 100.0).map(|v| (*p, v)))
        .collect()
}

fn summarize_numeric(series: &ColumnSeries) -> StoreResult<NumericSummary> {
    let values = sorted(numeric_values(series)?);
    Ok(NumericSummary {
        mean: mean_of(&values),
        std_dev: std_dev_of(&values),
        min: values.first().copied(),
        max: values.last().copied(),
        median: quantile(&values, 0.5),
        quintiles: quantile_map(&values, &QUINTILES),
        quartiles: quantile_map(&values, &QUARTILES),
    })
}

fn timestamp_to_seconds(dt: &NaiveDateTime) -> f64 {
    dt.and_utc().timestamp() as f64
}

fn seconds_to_text(seconds: f64) -> Option<String> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp(seconds.round() as i64, 0)
        .map(|dt| format_timestamp(&dt.naive_utc()))
}

fn summarize_temporal(series: &ColumnSeries) -> TemporalSummary {
    let seconds = sorted(
        series
            .present()
            .filter_map(Value::as_timestamp)
            .map(|dt| timestamp_to_seconds(&dt))
            .collect(),
    );
    let render = |map: BTreeMap<u8, f64>| {
        map.into_iter()
            .filter_map(|(p, v)| seconds_to_text(v).map(|text| (p, text)))
            .collect::<BTreeMap<_, _>>()
    };
    TemporalSummary {
        min: seconds.first().copied().and_then(seconds_to_text),
        max: seconds.last().copied().and_then(seconds_to_text),
        median: quantile(&seconds, 0.5).and_then(seconds_to_text),
        quintiles: render(quantile_map(&seconds, &QUINTILES)),
        quartiles: render(quantile_map(&seconds, &QUARTILES)),
    }
}

fn summarize_categorical(series: &ColumnSeries) -> CategoricalSummary {
    let counts = value_counts(series);
    let mode = mode_of(&counts);
    CategoricalSummary { counts, mode }
}

/// Statistics for an already-loaded series, chosen by its declared type.
pub fn summarize_series(series: &ColumnSeries) -> StoreResult<ColumnSummary> {
    Ok(match series.datatype {
        ColumnType::Integer | ColumnType::Real => {
            ColumnSummary::Numeric(summarize_numeric(series)?)
        }
        ColumnType::Timestamp => ColumnSummary::Temporal(summarize_temporal(series)),
        ColumnType::Text => ColumnSummary::Categorical(summarize_categorical(series)),
    })
}

pub fn summarize_column(store: &Store, table: &str, column: &str) -> StoreResult<ColumnSummary> {
    summarize_series(&read_column(store, table, column)?)
}

/// Both columns' statistics, plus Pearson correlation when both are numeric.
pub fn summarize_pair(
    store: &Store,
    table: &str,
    first: &str,
    second: &str,
) -> StoreResult<PairSummary> {
    let left = read_column(store, table, first)?;
    let right = read_column(store, table, second)?;
    let columns = vec![
        (left.name.clone(), summarize_series(&left)?),
        (right.name.clone(), summarize_series(&right)?),
    ];
    let (correlation, p_value) = if left.datatype.is_numeric() && right.datatype.is_numeric() {
        let result = pearson_pairwise(&optional_numbers(&left), &optional_numbers(&right));
        (Some(result.coefficient), Some(result.p_value))
    } else {
        (None, None)
    };
    Ok(PairSummary {
        columns,
        correlation,
        p_value,
    })
}

/// Every column's statistics plus correlation and p-value matrices over all
/// columns except the synthetic row index.
pub fn summarize_table(store: &Store, table: &str) -> StoreResult<TableSummary> {
    let series = read_table(store, table)?;
    let columns = series
        .iter()
        .map(|s| Ok((s.name.clone(), summarize_series(s)?)))
        .collect::<StoreResult<Vec<_>>>()?;
    let inputs = series
        .iter()
        .filter(|s| !s.is_row_index())
        .map(|s| (s.name.clone(), numeric_or_none(s)))
        .collect::<Vec<_>>();
    let (correlations, p_values) = correlation_matrices(&inputs);
    info!(
        "Computed summary for {} column(s) of table '{table}'",
        columns.len()
    );
    Ok(TableSummary {
        columns,
        correlations,
        p_values,
    })
}

/// Missing counts per column and the positions of rows with any gap.
pub fn null_report(store: &Store, table: &str) -> StoreResult<NullReport> {
    Ok(null_report_of(&read_table(store, table)?))
}

pub fn null_report_of(series: &[ColumnSeries]) -> NullReport {
    let missing_per_column = series
        .iter()
        .map(|s| (s.name.clone(), s.missing_count()))
        .collect();
    let rows = series.iter().map(ColumnSeries::len).max().unwrap_or(0);
    let rows_with_missing = (0..rows)
        .filter(|row| {
            series
                .iter()
                .any(|s| s.values.get(*row).is_none_or(Option::is_none))
        })
        .collect();
    NullReport {
        missing_per_column,
        rows_with_missing,
    }
}

fn optional_numbers(series: &ColumnSeries) -> Vec<Option<f64>> {
    series
        .values
        .iter()
        .map(|v| v.as_ref().and_then(Value::as_f64))
        .collect()
}

fn numeric_or_none(series: &ColumnSeries) -> Option<Vec<Option<f64>>> {
    numeric_values(series).ok()?;
    Some(optional_numbers(series))
}
