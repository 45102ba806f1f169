use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vending_machine::application::machine::VendingMachine;
use vending_machine::config::Settings;
use vending_machine::domain::ports::Stores;
use vending_machine::infrastructure::in_memory::in_memory_stores;
use vending_machine::infrastructure::jwt::JwtTokenIssuer;
use vending_machine::interfaces::csv::report_writer::write_report;
use vending_machine::interfaces::jsonl::console::Console;
use vending_machine::interfaces::jsonl::response_writer::ResponseWriter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Request script, one JSON request per line
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Settings file (TOML, YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to write users.csv and products.csv into after the run
    #[arg(long)]
    report_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vending_machine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let settings =
        Settings::load(cli.config.as_deref(), cli.db_path.as_deref()).into_diagnostic()?;

    let stores = open_stores(settings.db_path.as_deref())?;
    let machine = VendingMachine::new(
        stores,
        settings.ledger().into_diagnostic()?,
        Arc::new(settings.hasher().into_diagnostic()?),
        Arc::new(JwtTokenIssuer::new(&settings.secret, settings.token_ttl())),
    )
    .with_session_retention(settings.session_retention());
    machine.sessions().prune_inactive().await.into_diagnostic()?;

    let file = File::open(&cli.input).into_diagnostic()?;
    let mut console = Console::new(machine);
    let stdout = io::stdout();
    let mut sink = ResponseWriter::new(stdout.lock());
    let summary = console
        .run(BufReader::new(file), &mut sink)
        .await
        .into_diagnostic()?;
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "script processed"
    );

    if let Some(dir) = cli.report_dir {
        write_report(console.machine(), &dir).await.into_diagnostic()?;
        info!(dir = %dir.display(), "report written");
    }

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    use vending_machine::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            info!(path = %path.display(), "using persistent storage");
            Ok(store.stores())
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    if db_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }
    Ok(in_memory_stores())
}
