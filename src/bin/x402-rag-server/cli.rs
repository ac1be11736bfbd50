//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use x402_rag::config::{NetworkId, ServerConfig, SettlementMode};

/// Pay-per-chunk content retrieval server speaking the x402 protocol.
#[derive(Parser, Debug)]
#[command(name = "x402-rag-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, default_value = "127.0.0.1", env = "X402_RAG_HOST")]
    pub host: String,

    /// Listening port (0 for auto-select).
    #[arg(long, short, default_value = "8402", env = "X402_RAG_PORT")]
    pub port: u16,

    /// Recipient wallet address for payments.
    #[arg(long, env = "X402_RAG_PAY_TO")]
    pub pay_to: Option<String>,

    /// Payment network to issue challenges for.
    #[arg(long, value_enum, default_value = "solana-devnet", env = "X402_RAG_NETWORK")]
    pub network: CliNetwork,

    /// Payment asset identifier (token mint address).
    #[arg(long, env = "X402_RAG_ASSET")]
    pub asset: Option<String>,

    /// Disable payment enforcement (all retrieval is free).
    #[arg(long)]
    pub disable_payments: bool,

    /// When to release content relative to ledger settlement.
    #[arg(long, value_enum, default_value = "optimistic", env = "X402_RAG_SETTLEMENT")]
    pub settlement: CliSettlementMode,

    /// Challenge validity window in seconds.
    #[arg(long, default_value = "60", env = "X402_RAG_CHALLENGE_TTL")]
    pub challenge_ttl: u64,

    /// Target chunk size in characters.
    #[arg(long, default_value = "1200", env = "X402_RAG_CHUNK_SIZE")]
    pub chunk_size: usize,

    /// Overlap in characters between adjacent hard-split chunks.
    #[arg(long, default_value = "150", env = "X402_RAG_CHUNK_OVERLAP")]
    pub chunk_overlap: usize,

    /// Log level.
    #[arg(long, value_enum, default_value = "info", env = "RUST_LOG")]
    pub log_level: CliLogLevel,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Payment network CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum CliNetwork {
    /// Solana mainnet.
    Solana,
    /// Solana devnet.
    #[default]
    #[value(name = "solana-devnet")]
    SolanaDevnet,
}

/// Settlement mode CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum CliSettlementMode {
    /// Release content once the payment is broadcast.
    #[default]
    Optimistic,
    /// Release content only after ledger confirmation.
    Confirmed,
}

/// Log level CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum CliLogLevel {
    /// Error messages only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational messages (default).
    #[default]
    Info,
    /// Debug messages.
    Debug,
    /// Trace messages (verbose).
    Trace,
}

impl Cli {
    /// Convert CLI arguments into a `ServerConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> x402_rag::Result<ServerConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            ServerConfig::from_file(path)?
        } else {
            ServerConfig::default()
        };

        // Override with CLI arguments
        config.host = self.host;
        config.port = self.port;
        config.chunk_size = self.chunk_size;
        config.chunk_overlap = self.chunk_overlap;
        config.log_level = self.log_level.into();

        config.x402.enabled = !self.disable_payments;
        config.x402.network = self.network.into();
        config.x402.settlement = self.settlement.into();
        config.x402.challenge_ttl_secs = self.challenge_ttl;
        if let Some(pay_to) = self.pay_to {
            config.x402.pay_to = Some(pay_to);
        }
        if let Some(asset) = self.asset {
            config.x402.asset = asset;
        }

        Ok(config)
    }
}

impl From<CliNetwork> for NetworkId {
    fn from(n: CliNetwork) -> Self {
        match n {
            CliNetwork::Solana => Self::Solana,
            CliNetwork::SolanaDevnet => Self::SolanaDevnet,
        }
    }
}

impl From<CliSettlementMode> for SettlementMode {
    fn from(m: CliSettlementMode) -> Self {
        match m {
            CliSettlementMode::Optimistic => Self::Optimistic,
            CliSettlementMode::Confirmed => Self::Confirmed,
        }
    }
}

impl From<CliLogLevel> for String {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => "error".to_string(),
            CliLogLevel::Warn => "warn".to_string(),
            CliLogLevel::Info => "info".to_string(),
            CliLogLevel::Debug => "debug".to_string(),
            CliLogLevel::Trace => "trace".to_string(),
        }
    }
}
