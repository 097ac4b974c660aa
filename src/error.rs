//! Error taxonomy shared by the store, reader, and summary engine.
//!
//! Domain errors (`InvalidIdentifier`, `ColumnNotFound`, `NonNumericOperation`)
//! carry fixed, user-facing messages and are never retried. The command layer
//! wraps them in `anyhow` context before printing.

use thiserror::Error;

pub const INVALID_IDENTIFIER_MESSAGE: &str = "Nombre no válido: use solo letras, números y guiones bajos / Invalid name: use only letters, digits and underscores";

pub const NON_NUMERIC_MESSAGE: &str = "Operación no numérica: la columna contiene valores no numéricos / Non-numeric operation: the column contains non-numeric values";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{INVALID_IDENTIFIER_MESSAGE} ('{name}')")]
    InvalidIdentifier { name: String },

    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Table '{table}' not found")]
    TableNotFound { table: String },

    #[error("Table '{table}' already exists")]
    TableExists { table: String },

    #[error("{NON_NUMERIC_MESSAGE} ('{column}')")]
    NonNumericOperation { column: String },

    #[error("Table '{table}' has {expected} column(s) but {found} column spec(s) were supplied")]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        found: usize,
    },

    #[error("Column name '{name}' appears more than once")]
    DuplicateColumn { name: String },

    #[error("The row index of table '{table}' must stay first as '{column}' INTEGER")]
    RowIndexMoved { table: String, column: String },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_identifier_message_is_fixed() {
        let err = StoreError::InvalidIdentifier {
            name: "bad;name".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.starts_with(INVALID_IDENTIFIER_MESSAGE));
        assert!(rendered.contains("bad;name"));
    }

    #[test]
    fn non_numeric_message_names_column() {
        let err = StoreError::NonNumericOperation {
            column: "ciudad".to_string(),
        };
        assert!(err.to_string().contains(NON_NUMERIC_MESSAGE));
        assert!(err.to_string().contains("ciudad"));
    }
}
