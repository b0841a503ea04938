use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use transactions_bff::import::load_csv;
use transactions_bff::store::sqlite::{count_transactions, insert_transactions, remove_duplicate_transactions};
use transactions_bff::{init_tracing, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "transactions-bff")]
#[command(version)]
#[command(about = "Admin tasks for a local transactions store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load transactions from a CSV file into a SQLite store
    Import {
        csv: PathBuf,
        /// SQLite database file (created if missing)
        #[arg(long, default_value = "transactions.db")]
        db: PathBuf,
    },
    /// Delete transactions sharing NSU and tax id with an older row
    Dedupe {
        #[arg(long, default_value = "transactions.db")]
        db: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Import { csv, db } => run_import(&csv, &db),
        Command::Dedupe { db } => run_dedupe(&db),
    }
}

fn run_import(csv: &Path, db: &Path) -> Result<()> {
    let transactions = load_csv(csv)?;
    info!("loaded {} transactions from {}", transactions.len(), csv.display());

    let store = SqliteStore::open(db).with_context(|| format!("Failed to open {}", db.display()))?;
    let (inserted, total) = store.with_connection(|conn| {
        let inserted = insert_transactions(conn, &transactions)?;
        Ok((inserted, count_transactions(conn)?))
    })?;

    println!("Inserted {} transactions ({} in store)", inserted, total);
    Ok(())
}

fn run_dedupe(db: &Path) -> Result<()> {
    let store = SqliteStore::open(db).with_context(|| format!("Failed to open {}", db.display()))?;
    let removed = store.with_connection(remove_duplicate_transactions)?;

    println!("{} duplicate transactions removed", removed);
    Ok(())
}
