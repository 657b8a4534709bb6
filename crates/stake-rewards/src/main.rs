//! Stake Rewards Exporter
//!
//! Finds every stake account withdrawable by a wallet, walks its inflation
//! rewards epoch by epoch and exports them as CSV reports (one per stake
//! account plus one for the whole wallet).

mod config;
mod constants;
mod reports;
mod rewards;
mod rpc;
mod stake;

use anyhow::{Context, Result};
use clap::Parser;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use config::Config;
use reports::ReportWriter;

#[derive(Parser, Debug)]
#[command(name = "stake-rewards")]
#[command(about = "Export Solana stake account inflation rewards to CSV")]
struct Args {
    /// Output directory for generated CSV reports
    #[arg(short, long, default_value = constants::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// RPC URL (overrides SOLANA_RPC_URL)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Verbose output (log every epoch queried)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    // Variables already exported take precedence over .env
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        error!("failed with {:?}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

async fn run(args: Args) -> Result<()> {
    // Configuration errors are fatal before any network activity
    let config = Config::from_env(args.rpc_url)?;
    info!("Using RPC: {}", config.masked_rpc_url());

    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            args.output_dir.display()
        )
    })?;

    let client =
        RpcClient::new_with_commitment(config.rpc_url.clone(), CommitmentConfig::confirmed());
    let mut writer = ReportWriter::new(&args.output_dir);

    let exported = rewards::export_wallet_rewards(&client, &config.wallet, &mut writer).await;

    // Flush whatever was scheduled, even if the run failed part way
    let written = writer.finish().await;
    let summary = exported?;

    info!(
        "Done: {} stake accounts ({} skipped), {} rewards, {} reports written, {} failed",
        summary.accounts_found,
        summary.accounts_skipped,
        summary.rows,
        written.written,
        written.failed
    );

    Ok(())
}
