//! x402-rag server binary.

mod cli;

use clap::Parser;
use cli::Cli;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use x402_rag::payment::InstantLedger;
use x402_rag::store::MemoryStore;
use x402_rag::VERSION;

#[tokio::main]
async fn main() -> x402_rag::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_config()?;

    init_tracing(&config.log_level);
    info!("x402-rag-server v{VERSION} starting");
    config.validate()?;

    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(InstantLedger::new());
    x402_rag::server::run(config, store, ledger).await
}

fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
