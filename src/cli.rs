use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{schema::ColumnSpec, store::DEFAULT_DB_PATH};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load tabular files into SQLite and describe their columns",
    long_about = None
)]
pub struct Cli {
    /// SQLite database file (its directory is created when missing)
    #[arg(long, global = true, env = "TABLESTAT_DB", default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a CSV/TSV file into a table, replacing any table of the same name
    Ingest(IngestArgs),
    /// List stored tables
    Tables,
    /// Show the columns and declared types of a table
    Columns(TableArgs),
    /// Show a page of rows from a table
    Preview(PreviewArgs),
    /// Rename and retype every column of a table
    Retype(RetypeArgs),
    /// Delete a table
    Drop(TableArgs),
    /// Summarize a table, one column, or a pair of columns as JSON
    Summary(SummaryArgs),
    /// Report missing values per column and the rows that contain them
    Nulls(TableArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Input file to load ('-' reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination table name
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// Field delimiter (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct TableArgs {
    /// Table name
    #[arg(short = 't', long = "table")]
    pub table: String,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Table name
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
    /// Number of rows to skip
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

#[derive(Debug, Args)]
pub struct RetypeArgs {
    /// Table name
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// New `name:TYPE` for each column, in column order (index included)
    #[arg(long = "column", required = true, action = clap::ArgAction::Append)]
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Table name
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// Zero, one or two columns to summarize
    #[arg(short = 'c', long = "column", action = clap::ArgAction::Append, num_args = 1)]
    pub columns: Vec<String>,
    /// Print compact JSON on one line
    #[arg(long)]
    pub compact: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    #[test]
    fn parses_retype_columns() {
        let cli = Cli::try_parse_from([
            "tablestat",
            "retype",
            "-t",
            "personas",
            "--column",
            "index:integer",
            "--column",
            "anios:real",
        ])
        .unwrap();
        let Commands::Retype(args) = cli.command else {
            panic!("expected retype");
        };
        assert_eq!(args.columns[1], ColumnSpec::new("anios", ColumnType::Real));
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(
            Cli::try_parse_from(["tablestat", "retype", "-t", "t", "--column", "a:blob"]).is_err()
        );
    }

    #[test]
    fn delimiter_aliases() {
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
        assert_eq!(parse_delimiter(";").unwrap(), b';');
        assert!(parse_delimiter("ab").is_err());
    }
}
