use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use rome_automation::config::Config;
use rome_automation::logging;
use rome_automation::orchestrator::{Orchestrator, RunOptions};

#[derive(Parser)]
#[command(name = "rome-automation")]
#[command(about = "Rome Protocol testnet automation: wallets, faucet, bridge, contracts and activity", version)]
struct Cli {
    /// Number of wallet pairs to create
    #[arg(short, long)]
    wallets: Option<usize>,

    /// Contracts to deploy per wallet (0 skips deployment)
    #[arg(short, long)]
    contracts: Option<usize>,

    /// Skip background mass activity
    #[arg(long)]
    no_activity: bool,

    /// Skip reward form submission
    #[arg(long)]
    no_forms: bool,

    /// Load configuration from a TOML file instead of the environment
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a default configuration file and exit
    #[arg(long, value_name = "PATH")]
    init_config: Option<PathBuf>,

    /// Run connectivity checks and exit
    #[arg(long)]
    health_check: bool,

    /// Restore stats and deployed contracts from a progress snapshot first
    #[arg(long, value_name = "SNAPSHOT")]
    resume: Option<PathBuf>,
}

impl Cli {
    fn run_options(&self, config: &Config) -> RunOptions {
        let defaults = RunOptions::from_config(config);
        RunOptions {
            wallets: self.wallets.unwrap_or(defaults.wallets),
            contracts: self.contracts.unwrap_or(defaults.contracts),
            activity: !self.no_activity,
            forms: !self.no_forms,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Some(output) = &cli.init_config {
        Config::default().save(output)?;
        println!("Configuration file created at: {}", output.display());
        return Ok(());
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    let _log_guard = logging::init(&config.log_level, &config.logs_dir())?;
    let options = cli.run_options(&config);
    let mut orchestrator = Orchestrator::from_config(config)?;

    if cli.health_check {
        let report = orchestrator.health_check().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(snapshot) = &cli.resume {
        orchestrator.load_progress(snapshot).await?;
    }

    info!("Run {} starting", orchestrator.run_id());
    match orchestrator.run(&options).await {
        Ok(stats) => {
            println!("{}", stats.summary());
            Ok(())
        }
        Err(e) => {
            error!("Automation failed: {:#}", e);
            println!("{}", orchestrator.stats().await.summary());
            std::process::exit(1);
        }
    }
}
