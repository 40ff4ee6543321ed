use clap::Parser;
use miette::{IntoDiagnostic, Result};
use petcare_settlement::application::engine::SettlementEngine;
use petcare_settlement::config::SettlementConfig;
use petcare_settlement::domain::ports::Stores;
use petcare_settlement::infrastructure::gateway::{GatewayBehavior, SimulatedGateway};
use petcare_settlement::infrastructure::in_memory;
#[cfg(feature = "storage-rocksdb")]
use petcare_settlement::infrastructure::rocksdb::RocksDBStore;
use petcare_settlement::interfaces::csv::account_writer::{AccountWriter, account_rows};
use petcare_settlement::interfaces::csv::command_reader::CommandReader;
use petcare_settlement::interfaces::csv::runner::ScriptRunner;
use petcare_settlement::logging;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settlement commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Settings file (TOML, JSON or YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// How the simulated payment provider answers status queries
    #[arg(long, value_enum, default_value_t = GatewayBehavior::Pending)]
    gateway_outcome: GatewayBehavior,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SettlementConfig::load(cli.config.as_deref()).into_diagnostic()?;
    logging::init(&config.logging);

    let stores = open_stores(cli.db_path.as_deref())?;
    let gateway = SimulatedGateway::new(cli.gateway_outcome);
    let engine = SettlementEngine::new(
        stores,
        Box::new(gateway),
        config.allocator().into_diagnostic()?,
    );

    let file = File::open(&cli.input).into_diagnostic()?;
    let mut runner = ScriptRunner::new(&engine, config.poll());
    let summary = runner.run(CommandReader::new(file)).await;
    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        "script finished"
    );

    let ledger = engine.ledger();
    let rows = account_rows(
        ledger.all_points_accounts().await.into_diagnostic()?,
        ledger.all_card_accounts().await.into_diagnostic()?,
    );

    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(rows).into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    match db_path {
        Some(path) => Ok(RocksDBStore::open(path).into_diagnostic()?.stores()),
        None => Ok(in_memory::stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    if db_path.is_some() {
        tracing::warn!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory::stores())
}
