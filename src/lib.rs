pub mod cli;
pub mod correlation;
pub mod data;
pub mod error;
pub mod identifier;
pub mod ingest;
pub mod io_utils;
pub mod reader;
pub mod schema;
pub mod store;
pub mod summary;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde::Serialize;

use crate::{
    cli::{Cli, Commands},
    store::{Store, StoreConfig},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("tablestat", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = StoreConfig::new(&cli.db);
    match cli.command {
        Commands::Ingest(args) => handle_ingest(&config, &args),
        Commands::Tables => handle_tables(&config),
        Commands::Columns(args) => handle_columns(&config, &args.table),
        Commands::Preview(args) => handle_preview(&config, &args),
        Commands::Retype(args) => handle_retype(&config, &args),
        Commands::Drop(args) => handle_drop(&config, &args.table),
        Commands::Summary(args) => handle_summary(&config, &args),
        Commands::Nulls(args) => handle_nulls(&config, &args.table),
    }
}

fn open_store(config: &StoreConfig) -> Result<Store> {
    Store::open(config).with_context(|| format!("Opening database {:?}", config.path))
}

fn handle_ingest(config: &StoreConfig, args: &cli::IngestArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Loading '{}' with delimiter '{}' into table '{}'",
        args.input.display(),
        printable_delimiter(delimiter),
        args.table
    );
    let dataset = io_utils::load_dataset(&args.input, delimiter, encoding)?;
    let mut store = open_store(config)?;
    let report = ingest::ingest_dataset(&mut store, &args.table, dataset)
        .with_context(|| format!("Ingesting {:?} into table '{}'", args.input, args.table))?;
    info!(
        "Table '{}' now holds {} row(s) across {} column(s)",
        report.table,
        report.rows,
        report.columns.len()
    );
    print_column_specs(&report.columns);
    Ok(())
}

fn handle_tables(config: &StoreConfig) -> Result<()> {
    let store = open_store(config)?;
    for table in store.list_tables()? {
        println!("{table}");
    }
    Ok(())
}

fn handle_columns(config: &StoreConfig, table: &str) -> Result<()> {
    let store = open_store(config)?;
    let specs = store
        .column_types(table)
        .with_context(|| format!("Reading columns of table '{table}'"))?;
    print_column_specs(&specs);
    Ok(())
}

fn handle_preview(config: &StoreConfig, args: &cli::PreviewArgs) -> Result<()> {
    let store = open_store(config)?;
    let headers = store.column_names(&args.table)?;
    let rows = store
        .fetch_rows(&args.table, args.limit, args.offset)
        .with_context(|| format!("Reading rows of table '{}'", args.table))?;
    print!("{}", table::render_rows(&headers, &rows));
    info!(
        "Displayed {} of {} row(s) from '{}'",
        rows.len(),
        store.row_count(&args.table)?,
        args.table
    );
    Ok(())
}

fn handle_retype(config: &StoreConfig, args: &cli::RetypeArgs) -> Result<()> {
    let mut store = open_store(config)?;
    debug!("Retype specs: {:?}", args.columns);
    store
        .rename_retype_columns(&args.table, &args.columns)
        .with_context(|| format!("Changing columns of table '{}'", args.table))?;
    print_column_specs(&store.column_types(&args.table)?);
    Ok(())
}

fn handle_drop(config: &StoreConfig, table: &str) -> Result<()> {
    let mut store = open_store(config)?;
    store
        .drop_table(table)
        .with_context(|| format!("Dropping table '{table}'"))?;
    Ok(())
}

fn handle_summary(config: &StoreConfig, args: &cli::SummaryArgs) -> Result<()> {
    let store = open_store(config)?;
    let table = args.table.as_str();
    let context = || format!("Summarizing table '{table}'");
    match args.columns.as_slice() {
        [] => print_json(&summary::summarize_table(&store, table).with_context(context)?, args.compact),
        [column] => print_json(
            &summary::summarize_column(&store, table, column).with_context(context)?,
            args.compact,
        ),
        [first, second] => print_json(
            &summary::summarize_pair(&store, table, first, second).with_context(context)?,
            args.compact,
        ),
        more => bail!("At most two columns can be summarized together (got {})", more.len()),
    }
}

fn handle_nulls(config: &StoreConfig, table: &str) -> Result<()> {
    let store = open_store(config)?;
    let report = summary::null_report(&store, table)
        .with_context(|| format!("Counting missing values in table '{table}'"))?;
    print_json(&report, false)
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{rendered}");
    Ok(())
}

fn print_column_specs(specs: &[schema::ColumnSpec]) {
    let headers = vec!["column".to_string(), "type".to_string()];
    let rows = specs
        .iter()
        .map(|spec| vec![spec.name.clone(), spec.datatype.to_string()])
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
