use clap::{Parser, Subcommand};
use mysqlite::errors;
use mysqlite::storage::row::{Row, Value};
use mysqlite::storage::schema::{FieldType, Schema};
use mysqlite::storage::table::Table;
use once_cell::sync::Lazy;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Schema a fresh data file is created with. An existing file keeps
/// whatever schema its anchor already carries.
static DEFAULT_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![("id", FieldType::Int, 8), ("value", FieldType::Text, 256)], 0)
        .expect("default schema is well-formed")
});

#[derive(Parser)]
#[command(name = "mysqlite", version = VERSION, about = "Single-file disk-backed storage engine core.")]
struct Cli {
    /// Path to the table's backing file.
    #[arg(long, env = "MYSQLITE_DATA_FILE", default_value = "mysqlite.db")]
    data_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inserts a row keyed by `id`, storing `value` as its TEXT column.
    Insert { id: i64, value: String },
    /// Looks up a row by primary key.
    Get { id: u32 },
    /// Prints every row in key order.
    Scan,
    /// Removes a row by primary key.
    Delete { id: u32 },
}

fn main() {
    let log_file = dirs::data_local_dir()
        .map(|dir| dir.join("mysqlite.log"))
        .unwrap_or_else(|| PathBuf::from("mysqlite.log"));

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_file)
        .expect("failed to open log file");

    tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), errors::Error> {
    let mut table = Table::open(&cli.data_file, DEFAULT_SCHEMA.clone())?;

    match cli.command {
        Command::Insert { id, value } => {
            table.insert(Row::new(vec![Value::Int(id), Value::Text(value)]))?;
        }
        Command::Get { id } => match table.find(id)? {
            Some(row) => println!("{}", row),
            None => println!("(not found)"),
        },
        Command::Scan => {
            for row in table.scan()? {
                println!("{}", row);
            }
        }
        Command::Delete { id } => table.delete(id)?,
    }

    table.close()
}
