//! Configuration for x402-rag.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Payment network identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkId {
    /// Solana mainnet.
    Solana,
    /// Solana devnet.
    #[default]
    SolanaDevnet,
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solana => write!(f, "solana"),
            Self::SolanaDevnet => write!(f, "solana-devnet"),
        }
    }
}

impl FromStr for NetworkId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "solana" => Ok(Self::Solana),
            "solana-devnet" => Ok(Self::SolanaDevnet),
            other => Err(crate::Error::UnsupportedNetwork(other.to_string())),
        }
    }
}

/// When the server releases gated content relative to ledger settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// Release once the payment is broadcast with a valid signature.
    /// Lower latency, carries settlement risk until the ledger confirms.
    #[default]
    Optimistic,
    /// Release only after the ledger confirms the payment.
    Confirmed,
}

/// x402 payment protocol configuration shared by server components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct X402Config {
    /// Enable payment enforcement. When disabled, all retrieval is free
    /// and no challenges are ever issued.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Payment network challenges are issued for.
    #[serde(default)]
    pub network: NetworkId,

    /// Payment asset identifier (e.g. a USDC mint address).
    #[serde(default = "default_asset")]
    pub asset: String,

    /// Decimal places of the payment asset (base units per whole unit).
    #[serde(default = "default_asset_decimals")]
    pub asset_decimals: u8,

    /// Recipient address for payments. Required when `enabled` is true.
    #[serde(default)]
    pub pay_to: Option<String>,

    /// Challenge validity window in seconds.
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,

    /// When gated content is released relative to settlement.
    #[serde(default)]
    pub settlement: SettlementMode,

    /// Timeout in seconds for ledger settlement calls.
    #[serde(default = "default_settlement_timeout")]
    pub settlement_timeout_secs: u64,

    /// Maximum age in seconds of an authentication message.
    #[serde(default = "default_auth_max_ttl")]
    pub auth_max_ttl_secs: u64,

    /// Allowed clock skew in seconds when validating authentication messages.
    #[serde(default = "default_auth_clock_skew")]
    pub auth_clock_skew_secs: u64,
}

impl Default for X402Config {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            network: NetworkId::default(),
            asset: default_asset(),
            asset_decimals: default_asset_decimals(),
            pay_to: None,
            challenge_ttl_secs: default_challenge_ttl(),
            settlement: SettlementMode::default(),
            settlement_timeout_secs: default_settlement_timeout(),
            auth_max_ttl_secs: default_auth_max_ttl(),
            auth_clock_skew_secs: default_auth_clock_skew(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port (0 for auto-select).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Target chunk size in characters for the text splitter.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap in characters between adjacent hard-split chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Upper bound on chunks returned by a single retrieval request.
    #[serde(default = "default_max_retrieved_chunks")]
    pub max_retrieved_chunks: usize,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// x402 payment configuration.
    #[serde(default)]
    pub x402: X402Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_retrieved_chunks: default_max_retrieved_chunks(),
            log_level: default_log_level(),
            x402: X402Config::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate that payment enforcement has the fields it needs.
    ///
    /// # Errors
    ///
    /// Returns an error if payments are enabled without a recipient address.
    pub fn validate(&self) -> crate::Result<()> {
        if self.x402.enabled && self.x402.pay_to.is_none() {
            return Err(crate::Error::Config(
                "x402.pay_to is required when payments are enabled".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(crate::Error::Config("chunk_size must be non-zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(crate::Error::Config(
                "chunk_overlap must be smaller than chunk_size".to_string(),
            ));
        }
        Ok(())
    }
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the x402-rag server (e.g. `http://localhost:8402`).
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_client_timeout")]
    pub timeout_secs: u64,

    /// Hex-encoded ed25519 secret key (32-byte seed). Used for both request
    /// authentication and payment signing. When absent, the client can only
    /// access free content.
    #[serde(default)]
    pub identity_hex: Option<String>,

    /// RPC endpoint per payment network. A challenge naming a network with
    /// no entry here fails with `UnsupportedNetwork`.
    #[serde(default = "default_rpc_by_network")]
    pub rpc_by_network: HashMap<NetworkId, String>,

    /// Asset identifiers the client is willing to pay in.
    /// Empty means any asset is accepted.
    #[serde(default)]
    pub allowed_assets: Vec<String>,

    /// Decimal places assumed for payment assets.
    #[serde(default = "default_asset_decimals")]
    pub asset_decimals: u8,
}

impl ClientConfig {
    /// Create a configuration with defaults for the given server URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_client_timeout(),
            identity_hex: None,
            rpc_by_network: default_rpc_by_network(),
            allowed_assets: Vec::new(),
            asset_decimals: default_asset_decimals(),
        }
    }
}

/// Default data directory for server state (keys, config).
#[must_use]
pub fn default_root_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "x402-rag").map_or_else(
        || PathBuf::from(".x402-rag"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8402
}

const fn default_enabled() -> bool {
    true
}

fn default_asset() -> String {
    // USDC mint on Solana devnet.
    "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU".to_string()
}

const fn default_asset_decimals() -> u8 {
    6
}

const fn default_challenge_ttl() -> u64 {
    60
}

const fn default_settlement_timeout() -> u64 {
    30
}

const fn default_auth_max_ttl() -> u64 {
    300
}

const fn default_auth_clock_skew() -> u64 {
    120
}

const fn default_chunk_size() -> usize {
    1200
}

const fn default_chunk_overlap() -> usize {
    150
}

const fn default_max_retrieved_chunks() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_client_timeout() -> u64 {
    30
}

fn default_rpc_by_network() -> HashMap<NetworkId, String> {
    HashMap::from([
        (
            NetworkId::Solana,
            "https://api.mainnet-beta.solana.com".to_string(),
        ),
        (
            NetworkId::SolanaDevnet,
            "https://api.devnet.solana.com".to_string(),
        ),
    ])
}
