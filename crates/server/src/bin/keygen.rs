//! One-shot tool: generates a random API key, stores its SHA-256 hash in
//! the config document, and prints the plaintext key exactly once. There is
//! no way to recover the plaintext afterward — only the hash is persisted.

use std::path::PathBuf;

use clap::Parser;
use rand::RngCore;
use sha2::{Digest, Sha256};

use claude_history_core::paths;
use claude_history_server::config::ConfigService;

/// `claude-history-keygen` command line arguments.
#[derive(Parser, Debug)]
#[command(name = "claude-history-keygen")]
#[command(about = "Generates a new API key for claude-history-server")]
struct Args {
    /// Directory holding config.json
    #[arg(long, value_name = "PATH")]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut key_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key_bytes);
    let key = hex::encode(key_bytes);
    let hash = hex::encode(Sha256::digest(key.as_bytes()));

    let config_path = match args.config_dir {
        Some(dir) => dir.join("config.json"),
        None => paths::default_config_path()?,
    };
    let config = ConfigService::load(config_path.clone()).await?;
    config.set_api_key_hash(hash).await?;

    println!("New API key (shown once, store it now):");
    println!("{key}");
    println!("Written to {}", config_path.display());
    Ok(())
}
