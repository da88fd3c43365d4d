use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufWriter, Write};
use std::sync::Arc;
use tracing::info;

use storebridge::accessor::{InputData, ReadAccessor, ReadOutcome, StoreAccessor, WriteAccessor};
use storebridge::config::Config;
use storebridge::session::ConnectionManager;
use storebridge::store::SqliteConnector;
use storebridge::types::Row;

#[derive(Parser, Debug)]
#[command(name = "storebridge")]
#[command(about = "Read and write rows of a SQL-capable store through the federation connector", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream rows out of a table as JSON arrays, one per line
    Read {
        #[arg(long)]
        table: String,

        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        #[arg(long, help = "SQL boolean expression pushed down as the WHERE clause")]
        filter: Option<String>,
    },
    /// Insert rows given as JSON arrays on stdin, one per line
    Write {
        #[arg(long)]
        table: String,

        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only rows
    tracing_subscriber::fmt()
        .with_env_filter(cli.config.log_level.clone())
        .with_writer(std::io::stderr)
        .init();

    info!("storebridge v{}", env!("CARGO_PKG_VERSION"));

    let manager = Arc::new(ConnectionManager::new(Arc::new(SqliteConnector::new())));
    let properties = cli.config.to_user_properties();

    match cli.command {
        Command::Read { table, columns, filter } => {
            let mut input = InputData::new(table, Vec::new())
                .with_columns(&columns)
                .with_user_properties(properties);
            if let Some(filter) = filter {
                input = input.with_filter(filter);
            }
            let mut accessor = StoreAccessor::new(input, manager)?;
            run_read(&mut accessor)
        }
        Command::Write { table, columns } => {
            let input = InputData::new(table, Vec::new())
                .with_columns(&columns)
                .with_user_properties(properties);
            let mut accessor = StoreAccessor::new(input, manager)?;
            run_write(&mut accessor)
        }
    }
}

fn run_read(accessor: &mut StoreAccessor) -> Result<()> {
    accessor.open_for_read()?;

    let streamed = (|| -> Result<u64> {
        let stdout = std::io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        let mut count = 0;
        while let ReadOutcome::Row(row) = accessor.read_next_object()? {
            serde_json::to_writer(&mut out, &row)?;
            out.write_all(b"\n")?;
            count += 1;
        }
        out.flush()?;
        Ok(count)
    })();

    let closed = accessor.close_for_read();
    let count = streamed?;
    closed?;
    info!("Read {} rows", count);
    Ok(())
}

fn run_write(accessor: &mut StoreAccessor) -> Result<()> {
    accessor.open_for_write()?;

    let fed = (|| -> Result<()> {
        let stdin = std::io::stdin();
        for (number, line) in stdin.lock().lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row: Row = serde_json::from_str(&line)
                .with_context(|| format!("Line {} is not a JSON array of values", number + 1))?;
            accessor.write_next_object(row)?;
        }
        Ok(())
    })();

    let closed = accessor.close_for_write();
    fed?;
    closed?;
    info!("Wrote {} rows", accessor.rows_written());
    Ok(())
}
