use anyhow::{Context, Result};
use clap::Parser;
use segsend_sdk::{SendConfig, SendPipeline};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "segsend", about = "Send one segwit v0 payment and broadcast it")]
struct Args {
    /// Path to the JSON send config
    #[arg(long = "config", env = "SEGSEND_CONFIG")]
    config: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = SendConfig::from_json_file(&args.config)
        .with_context(|| format!("load {}", args.config.display()))?;
    config.validate().context("validate config")?;
    info!(network = %config.network, esplora = %config.esplora_url, "config loaded");

    let mut pipeline = SendPipeline::with_esplora(config).context("init esplora client")?;

    let report = match pipeline.run() {
        Ok(report) => report,
        Err(err) => {
            error!(code = err.error_code(), "{}", err);
            return Err(err.into());
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
