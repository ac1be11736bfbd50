//! ed25519 identity management utility for x402-rag.
//!
//! The same keypair authenticates requests and signs payment proofs.
//!
//! Usage:
//!   x402-rag-keygen generate [--output <file>]   Generate a new identity
//!   x402-rag-keygen show --key <file>            Print the wallet address

// This is a standalone CLI tool that exits on any error, so expect/unwrap is acceptable
#![allow(clippy::unwrap_used, clippy::expect_used)]

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process;
use x402_rag::config::default_root_dir;
use x402_rag::Identity;

#[derive(Parser)]
#[command(name = "x402-rag-keygen")]
#[command(about = "ed25519 identity management for x402-rag")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new identity
    Generate {
        /// File to write the hex-encoded secret seed to (defaults to
        /// identity.secret in the data directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the wallet address of an existing identity
    Show {
        /// Path to the secret seed file
        #[arg(short, long)]
        key: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { output } => generate(output),
        Commands::Show { key } => show(&key),
    }
}

fn generate(output: Option<PathBuf>) {
    let output = output.unwrap_or_else(|| default_root_dir().join("identity.secret"));
    if output.exists() {
        eprintln!("Refusing to overwrite existing key file {}", output.display());
        process::exit(1);
    }
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).expect("Failed to create output directory");
    }

    let identity = Identity::generate();
    fs::write(&output, identity.secret_hex()).expect("Failed to write secret key");

    println!("Secret key saved to: {}", output.display());
    println!("  WARNING: Keep this file secure! It signs payments from your wallet.");
    println!("Wallet address: {}", identity.address());
}

fn show(key: &PathBuf) {
    let secret = fs::read_to_string(key).expect("Failed to read secret key");
    let identity = Identity::from_hex(&secret).expect("Invalid secret key");
    println!("Wallet address: {}", identity.address());
}
