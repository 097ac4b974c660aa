mod common;

use common::{TestWorkspace, personas};
use tablestat::{
    data::Value,
    error::StoreError,
    ingest::ingest_dataset,
    schema::{ColumnSpec, ColumnType},
    store::{Store, StoreConfig},
};

#[test]
fn ingest_persists_across_reopen() {
    let workspace = TestWorkspace::new();
    {
        assert!(!workspace.db_path().parent().unwrap().exists());
        let mut store = workspace.open_store();
        assert!(workspace.db_path().exists());
        let report = ingest_dataset(&mut store, "personas", personas()).expect("ingest");
        assert_eq!(report.rows, 3);
        assert!(report.renamed.is_empty());
    }
    let store = Store::open(&StoreConfig::new(workspace.db_path())).expect("reopen");
    assert_eq!(store.list_tables().unwrap(), vec!["personas".to_string()]);
    assert_eq!(
        store.column_types("personas").unwrap(),
        vec![
            ColumnSpec::new("index", ColumnType::Integer),
            ColumnSpec::new("edad", ColumnType::Integer),
            ColumnSpec::new("ciudad", ColumnType::Text),
        ]
    );
    assert_eq!(store.row_count("personas").unwrap(), 3);
}

#[test]
fn reingest_replaces_table_wholesale() {
    let workspace = TestWorkspace::new();
    let mut store = workspace.open_store();
    ingest_dataset(&mut store, "personas", personas()).unwrap();
    let smaller = tablestat::data::Dataset::new(vec![common::column("altura", &["1.7"])]);
    ingest_dataset(&mut store, "personas", smaller).unwrap();
    assert_eq!(
        store.column_names("personas").unwrap(),
        vec!["index".to_string(), "altura".to_string()]
    );
    assert_eq!(store.row_count("personas").unwrap(), 1);
}

#[test]
fn bad_column_name_leaves_table_unchanged() {
    let workspace = TestWorkspace::new();
    let mut store = workspace.open_store();
    ingest_dataset(&mut store, "t", personas()).unwrap();
    let columns_before = store.column_types("t").unwrap();
    let rows_before = store.fetch_rows("t", 100, 0).unwrap();

    let specs = vec![
        ColumnSpec::new("index", ColumnType::Integer),
        ColumnSpec::new("bad;name", ColumnType::Integer),
        ColumnSpec::new("ciudad", ColumnType::Text),
    ];
    let err = store.rename_retype_columns("t", &specs).unwrap_err();
    assert!(matches!(err, StoreError::InvalidIdentifier { ref name } if name == "bad;name"));

    assert_eq!(store.column_types("t").unwrap(), columns_before);
    assert_eq!(store.row_count("t").unwrap(), 3);
    assert_eq!(store.fetch_rows("t", 100, 0).unwrap(), rows_before);
    assert_eq!(store.list_tables().unwrap(), vec!["t".to_string()]);
}

#[test]
fn retype_reinterprets_values_under_new_types() {
    let workspace = TestWorkspace::new();
    let mut store = workspace.open_store();
    ingest_dataset(&mut store, "t", personas()).unwrap();
    let specs = vec![
        ColumnSpec::new("index", ColumnType::Integer),
        ColumnSpec::new("edad_texto", ColumnType::Text),
        ColumnSpec::new("ciudad", ColumnType::Text),
    ];
    store.rename_retype_columns("t", &specs).unwrap();
    let rows = store.fetch_rows("t", 1, 0).unwrap();
    assert_eq!(rows[0][1], Some(Value::Text("20".to_string())));
    assert!(!store.table_exists("_new_t").unwrap());
}

#[test]
fn names_are_validated_on_every_entry_point() {
    let workspace = TestWorkspace::new();
    let mut store = workspace.open_store();
    ingest_dataset(&mut store, "t", personas()).unwrap();
    let hostile = "t; DROP TABLE t";
    assert!(matches!(
        store.row_count(hostile),
        Err(StoreError::InvalidIdentifier { .. })
    ));
    assert!(matches!(
        store.fetch_rows(hostile, 1, 0),
        Err(StoreError::InvalidIdentifier { .. })
    ));
    assert!(matches!(
        store.fetch_column("t", "edad\" FROM t --"),
        Err(StoreError::InvalidIdentifier { .. })
    ));
    assert!(matches!(
        store.drop_table(hostile),
        Err(StoreError::InvalidIdentifier { .. })
    ));
    assert!(store.table_exists("t").unwrap());
}

#[test]
fn drop_table_removes_it() {
    let workspace = TestWorkspace::new();
    let mut store = workspace.open_store();
    ingest_dataset(&mut store, "t", personas()).unwrap();
    store.drop_table("t").unwrap();
    assert!(!store.table_exists("t").unwrap());
    assert!(matches!(
        store.column_types("t"),
        Err(StoreError::TableNotFound { .. })
    ));
}

#[test]
fn reingest_under_other_case_replaces_table() {
    let workspace = TestWorkspace::new();
    let mut store = workspace.open_store();
    ingest_dataset(&mut store, "personas", personas()).unwrap();
    let report = ingest_dataset(&mut store, "Personas", personas()).expect("replace");
    assert_eq!(report.rows, 3);
    assert_eq!(store.list_tables().unwrap(), vec!["Personas".to_string()]);
    assert_eq!(store.row_count("personas").unwrap(), 3);
}

#[test]
fn retype_never_touches_a_table_named_like_its_shadow() {
    let workspace = TestWorkspace::new();
    let mut store = workspace.open_store();
    ingest_dataset(&mut store, "t", personas()).unwrap();
    ingest_dataset(&mut store, "_new_t", personas()).unwrap();
    let rows_before = store.fetch_rows("_new_t", 100, 0).unwrap();

    let specs = vec![
        ColumnSpec::new("index", ColumnType::Integer),
        ColumnSpec::new("anios", ColumnType::Real),
        ColumnSpec::new("ciudad", ColumnType::Text),
    ];
    let err = store.rename_retype_columns("t", &specs).unwrap_err();
    assert!(matches!(err, StoreError::TableExists { ref table } if table == "_new_t"));

    assert_eq!(
        store.list_tables().unwrap(),
        vec!["_new_t".to_string(), "t".to_string()]
    );
    assert_eq!(store.fetch_rows("_new_t", 100, 0).unwrap(), rows_before);
    assert_eq!(store.column_names("t").unwrap()[1], "edad");
}
