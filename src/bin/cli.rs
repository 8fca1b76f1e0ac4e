//! txlog CLI
//!
//! Offline inspection of a transaction log.

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use txlog::backend::{self, FileBackend};
use txlog::engine::replay_into;
use txlog::{BackendConfig, KvStore, SyncPolicy, TableParams, TransactionLogger};

/// txlog CLI
#[derive(Parser, Debug)]
#[command(name = "txlog-cli")]
#[command(about = "Inspect txlog transaction logs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every event in order
    Dump(Source),

    /// Replay the log and report whether it is intact
    Verify(Source),
}

#[derive(Args, Debug)]
struct Source {
    /// Transaction log file
    #[arg(default_value = "transaction.log")]
    log_file: PathBuf,

    /// Read the PostgreSQL table configured by POSTGRES_* instead
    #[arg(long)]
    table: bool,
}

impl Source {
    fn open(&self) -> txlog::Result<TransactionLogger> {
        if self.table {
            let params = TableParams::from_env()?;
            return TransactionLogger::open(&BackendConfig::Table(params));
        }

        if !self.log_file.exists() {
            return Err(txlog::TxLogError::Config(format!(
                "no such log file: {}",
                self.log_file.display()
            )));
        }
        let file = FileBackend::open(&self.log_file, SyncPolicy::Never)?;
        Ok(TransactionLogger::new(Box::new(file) as Box<dyn backend::Backend>))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Dump(source) => dump(&source),
        Commands::Verify(source) => verify(&source),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn dump(source: &Source) -> txlog::Result<()> {
    let mut logger = source.open()?;

    for event in logger.read_events()? {
        let event = event?;
        println!(
            "{}\t{:?}\t{}\t{}",
            event.sequence, event.kind, event.key, event.value
        );
    }

    logger.shutdown()
}

fn verify(source: &Source) -> txlog::Result<()> {
    let mut logger = source.open()?;
    let store = KvStore::new();

    let stats = replay_into(&mut logger, &store)?;
    println!(
        "ok: {} events ({} puts, {} deletes), last sequence {}, {} live keys",
        stats.events_replayed,
        stats.puts,
        stats.deletes,
        stats.last_sequence,
        store.len()
    );

    logger.shutdown()
}
