//! SQLite-backed table store.
//!
//! Every caller-supplied table or column name is turned into an
//! [`Identifier`] before it reaches SQL text; values are always bound.
//!
//! SQLite cannot rename and retype columns in place, so
//! [`Store::rename_retype_columns`] swaps in a new schema through a shadow
//! table inside a single transaction:
//!
//! 1. create `_new_<table>` with the new names and types,
//! 2. copy every row positionally,
//! 3. drop the original table,
//! 4. rename the shadow table to the original name.
//!
//! A failure at any step rolls the whole swap back. An existing table that
//! already holds the shadow name is never touched; the swap refuses to run.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, info, warn};
use rusqlite::{
    Connection, Transaction, params, params_from_iter,
    types::{ToSql, ToSqlOutput, ValueRef},
};

use crate::{
    data::{Dataset, Value, format_timestamp, parse_typed_value},
    error::{StoreError, StoreResult},
    identifier::{Identifier, check_name},
    schema::{ColumnSpec, ColumnType},
};

/// Synthetic 0-based row position added to every ingested table.
pub const ROW_INDEX_COLUMN: &str = "index";

pub const DEFAULT_DB_PATH: &str = "data/tablestat.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

/// A column as stored, before any type coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredColumn {
    pub spec: ColumnSpec,
    pub values: Vec<Option<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetypeStep {
    ShadowCreated,
    RowsCopied,
    OriginalDropped,
    ShadowRenamed,
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Timestamp(dt) => ToSqlOutput::from(format_timestamp(dt)),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Option<Value> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(Value::Integer(i)),
        ValueRef::Real(f) => Some(Value::Real(f)),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(Value::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (creating if needed) the database at `config.path`. A missing
    /// parent directory is created and the open retried exactly once.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let conn = match Connection::open(&config.path) {
            Ok(conn) => conn,
            Err(err) => {
                let Some(parent) = missing_parent(&config.path) else {
                    return Err(err.into());
                };
                warn!(
                    "Database directory {parent:?} is missing; creating it and retrying ({err})"
                );
                fs::create_dir_all(parent)?;
                Connection::open(&config.path)?
            }
        };
        conn.busy_timeout(config.busy_timeout)?;
        debug!("Opened store at {:?}", config.path);
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn list_tables(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    pub fn table_exists(&self, table: &str) -> StoreResult<bool> {
        let ident = check_name(table)?;
        self.exists(&ident)
    }

    fn exists(&self, ident: &Identifier) -> StoreResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![ident.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn require_table(&self, table: &str) -> StoreResult<Identifier> {
        let ident = check_name(table)?;
        if self.exists(&ident)? {
            Ok(ident)
        } else {
            Err(StoreError::TableNotFound {
                table: table.to_string(),
            })
        }
    }

    pub fn column_types(&self, table: &str) -> StoreResult<Vec<ColumnSpec>> {
        let ident = self.require_table(table)?;
        self.specs_of(&ident)
    }

    fn specs_of(&self, ident: &Identifier) -> StoreResult<Vec<ColumnSpec>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
        let specs = stmt
            .query_map(params![ident.as_str()], |row| {
                let name: String = row.get(0)?;
                let declared: String = row.get(1)?;
                Ok(ColumnSpec::new(name, ColumnType::from_declared(&declared)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(specs)
    }

    pub fn column_names(&self, table: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .column_types(table)?
            .into_iter()
            .map(|spec| spec.name)
            .collect())
    }

    pub fn row_count(&self, table: &str) -> StoreResult<usize> {
        let ident = self.require_table(table)?;
        let sql = format!("SELECT COUNT(*) FROM {}", ident.quoted());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Rows in insertion order, `limit` rows starting at `offset`.
    pub fn fetch_rows(
        &self,
        table: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Vec<Option<Value>>>> {
        let ident = self.require_table(table)?;
        let width = self.specs_of(&ident)?.len();
        let sql = format!(
            "SELECT * FROM {} ORDER BY rowid LIMIT ?1 OFFSET ?2",
            ident.quoted()
        );
        debug!("{sql}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                (0..width)
                    .map(|idx| row.get_ref(idx).map(value_from_ref))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Raw values of one column, in row order.
    pub fn fetch_column(&self, table: &str, column: &str) -> StoreResult<StoredColumn> {
        let column_ident = check_name(column)?;
        let ident = self.require_table(table)?;
        let spec = self
            .specs_of(&ident)?
            .into_iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(column_ident.as_str()))
            .ok_or_else(|| StoreError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            })?;
        let mut columns = self.select_columns(&ident, vec![spec])?;
        Ok(columns.remove(0))
    }

    /// Raw values of every column, in ordinal order.
    pub fn fetch_all_columns(&self, table: &str) -> StoreResult<Vec<StoredColumn>> {
        let ident = self.require_table(table)?;
        let specs = self.specs_of(&ident)?;
        self.select_columns(&ident, specs)
    }

    fn select_columns(
        &self,
        table: &Identifier,
        specs: Vec<ColumnSpec>,
    ) -> StoreResult<Vec<StoredColumn>> {
        let idents = specs
            .iter()
            .map(|spec| check_name(&spec.name))
            .collect::<StoreResult<Vec<_>>>()?;
        if idents.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            quoted_list(&idents),
            table.quoted()
        );
        debug!("{sql}");
        let mut columns = specs
            .into_iter()
            .map(|spec| StoredColumn {
                spec,
                values: Vec::new(),
            })
            .collect::<Vec<_>>();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (idx, column) in columns.iter_mut().enumerate() {
                column.values.push(value_from_ref(row.get_ref(idx)?));
            }
        }
        Ok(columns)
    }

    pub fn drop_table(&mut self, table: &str) -> StoreResult<()> {
        let ident = self.require_table(table)?;
        self.conn
            .execute_batch(&format!("DROP TABLE {}", ident.quoted()))?;
        info!("Dropped table '{ident}'");
        Ok(())
    }

    /// Persists `dataset` as `table`, prefixed by the synthetic
    /// [`ROW_INDEX_COLUMN`]. Columns without a type hint are stored as TEXT.
    /// Cells that do not parse under their column's hint are kept as text.
    pub fn create_table_from_dataset(
        &mut self,
        table: &str,
        dataset: &Dataset,
        replace: bool,
    ) -> StoreResult<usize> {
        let ident = check_name(table)?;
        let mut specs = vec![ColumnSpec::new(ROW_INDEX_COLUMN, ColumnType::Integer)];
        specs.extend(dataset.columns.iter().map(|column| {
            ColumnSpec::new(
                column.name.clone(),
                column.type_hint.unwrap_or(ColumnType::Text),
            )
        }));
        let idents = validate_specs(&specs)?;

        let exists = self.exists(&ident)?;
        if exists && !replace {
            return Err(StoreError::TableExists {
                table: table.to_string(),
            });
        }

        let row_count = dataset.row_count();
        let tx = self.conn.transaction()?;
        if exists {
            tx.execute_batch(&format!("DROP TABLE {}", ident.quoted()))?;
        }
        let create = create_statement(&ident, &idents, &specs);
        debug!("{create}");
        tx.execute_batch(&create)?;
        {
            let placeholders = (1..=specs.len())
                .map(|idx| format!("?{idx}"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({placeholders})",
                ident.quoted()
            ))?;
            for row_idx in 0..row_count {
                let mut row = Vec::with_capacity(specs.len());
                row.push(Some(Value::Integer(row_idx as i64)));
                for column in &dataset.columns {
                    let ty = column.type_hint.unwrap_or(ColumnType::Text);
                    let cell = column.values.get(row_idx).cloned().flatten();
                    row.push(cell.and_then(|raw| {
                        parse_typed_value(&raw, ty)
                            .unwrap_or_else(|_| Some(Value::Text(raw.clone())))
                    }));
                }
                insert.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        info!(
            "Stored {row_count} row(s) across {} column(s) in table '{ident}'",
            dataset.columns.len()
        );
        Ok(row_count)
    }

    /// Renames and retypes every column of `table`. `new_specs` lines up
    /// positionally with the current columns, synthetic index included.
    pub fn rename_retype_columns(
        &mut self,
        table: &str,
        new_specs: &[ColumnSpec],
    ) -> StoreResult<()> {
        self.rename_retype_with(table, new_specs, |_| Ok(()))
    }

    fn rename_retype_with<F>(
        &mut self,
        table: &str,
        new_specs: &[ColumnSpec],
        checkpoint: F,
    ) -> StoreResult<()>
    where
        F: FnMut(RetypeStep) -> StoreResult<()>,
    {
        let ident = check_name(table)?;
        let new_idents = validate_specs(new_specs)?;
        if !self.exists(&ident)? {
            return Err(StoreError::TableNotFound {
                table: table.to_string(),
            });
        }
        let current = self.specs_of(&ident)?;
        if current.len() != new_specs.len() {
            return Err(StoreError::ColumnCountMismatch {
                table: table.to_string(),
                expected: current.len(),
                found: new_specs.len(),
            });
        }
        check_row_index(table, &current, new_specs)?;
        let old_idents = current
            .iter()
            .map(|spec| check_name(&spec.name))
            .collect::<StoreResult<Vec<_>>>()?;
        let shadow = ident.shadow();
        if self.exists(&shadow)? {
            return Err(StoreError::TableExists {
                table: shadow.into_string(),
            });
        }

        let tx = self.conn.transaction()?;
        apply_retype(&tx, &ident, &old_idents, &new_idents, new_specs, checkpoint)?;
        tx.commit()?;
        info!(
            "Rewrote schema of table '{ident}' ({} column(s))",
            new_specs.len()
        );
        Ok(())
    }
}

fn apply_retype<F>(
    tx: &Transaction<'_>,
    table: &Identifier,
    old_columns: &[Identifier],
    new_columns: &[Identifier],
    new_specs: &[ColumnSpec],
    mut checkpoint: F,
) -> StoreResult<()>
where
    F: FnMut(RetypeStep) -> StoreResult<()>,
{
    let shadow = table.shadow();
    let create = create_statement(&shadow, new_columns, new_specs);
    debug!("{create}");
    tx.execute_batch(&create)?;
    checkpoint(RetypeStep::ShadowCreated)?;

    let copy = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {} ORDER BY rowid",
        shadow.quoted(),
        quoted_list(new_columns),
        quoted_list(old_columns),
        table.quoted()
    );
    debug!("{copy}");
    tx.execute_batch(&copy)?;
    checkpoint(RetypeStep::RowsCopied)?;

    tx.execute_batch(&format!("DROP TABLE {}", table.quoted()))?;
    checkpoint(RetypeStep::OriginalDropped)?;

    tx.execute_batch(&format!(
        "ALTER TABLE {} RENAME TO {}",
        shadow.quoted(),
        table.quoted()
    ))?;
    checkpoint(RetypeStep::ShadowRenamed)?;
    Ok(())
}

/// The synthetic row index must keep its name, type and leading position, and
/// no other column may take its name.
fn check_row_index(
    table: &str,
    current: &[ColumnSpec],
    new_specs: &[ColumnSpec],
) -> StoreResult<()> {
    let is_index = |spec: &ColumnSpec| spec.name.eq_ignore_ascii_case(ROW_INDEX_COLUMN);
    let moved = new_specs.iter().skip(1).any(is_index);
    let renamed = match current.first() {
        Some(spec) if is_index(spec) => !new_specs
            .first()
            .is_some_and(|spec| is_index(spec) && spec.datatype == ColumnType::Integer),
        _ => new_specs.first().is_some_and(is_index),
    };
    if moved || renamed {
        return Err(StoreError::RowIndexMoved {
            table: table.to_string(),
            column: ROW_INDEX_COLUMN.to_string(),
        });
    }
    Ok(())
}

fn validate_specs(specs: &[ColumnSpec]) -> StoreResult<Vec<Identifier>> {
    let idents = specs
        .iter()
        .map(|spec| check_name(&spec.name))
        .collect::<StoreResult<Vec<_>>>()?;
    let mut seen = HashSet::new();
    for ident in &idents {
        // SQLite folds ASCII case only when comparing names.
        if !seen.insert(ident.as_str().to_ascii_lowercase()) {
            return Err(StoreError::DuplicateColumn {
                name: ident.to_string(),
            });
        }
    }
    Ok(idents)
}

fn quoted_list(idents: &[Identifier]) -> String {
    idents
        .iter()
        .map(Identifier::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_statement(table: &Identifier, columns: &[Identifier], specs: &[ColumnSpec]) -> String {
    let definitions = columns
        .iter()
        .zip(specs)
        .map(|(ident, spec)| format!("{} {}", ident.quoted(), spec.datatype.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({definitions})", table.quoted())
}

fn missing_parent(path: &Path) -> Option<&Path> {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty() && !parent.exists())
}
