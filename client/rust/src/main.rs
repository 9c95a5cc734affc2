/// duochat - Main entry point
///
/// A command-line client for the two-party messaging directory
use anyhow::Context;
use clap::Parser;
use duochat_client::config::{ClientConfig, DEFAULT_SERVER_URL};
use duochat_client::preferences::PreferenceStore;
use duochat_client::{cli, DirectoryClient};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "duochat")]
#[command(about = "duochat - two-party messaging directory client")]
struct Args {
    /// Server URL (default: http://localhost:4000)
    #[arg(long, default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Principal to act as
    #[arg(long)]
    principal: String,

    /// Config directory for preferences (default: ~/.duochat)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging (DEBUG level)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    let config = ClientConfig::new(&args.server, &args.principal, args.config)
        .context("invalid client configuration")?;

    info!("Starting duochat");
    info!("Server: {}", config.server_url);
    info!("Principal: {}", config.principal);
    info!("Config directory: {}", config.config_dir.display());

    let client = DirectoryClient::connect(&config).context("failed to create directory client")?;
    let preferences = PreferenceStore::new(&config.config_dir);

    cli::run_client_loop(&client, &preferences).await?;

    Ok(())
}
