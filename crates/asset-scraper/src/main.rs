// Copyright 2026 Asset Scraper Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use asset_scraper::asset::AssetType;
use asset_scraper::config::Settings;
use asset_scraper::{cli, telemetry};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(
    name = "asset-scraper",
    about = "Scrape FII and stock indicators and serve them over HTTP",
    version,
    after_help = "Configuration is read from the environment (PORT, API_TOKEN, REDIS_URL, ...).\nRun with no command to serve the API."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Listen on this port instead of PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Scrape one asset and print it as JSON, bypassing the cache
    Scrape {
        /// Asset type (fii or stock)
        asset: AssetType,
        /// Ticker, e.g. MXRF11 or PETR4
        code: String,
    },
    /// Refresh near-expiry cache entries once and exit
    Sweep,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve { port: None });

    if let Commands::Completions { shell } = command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "asset-scraper", &mut std::io::stdout());
        return Ok(());
    }

    let settings = Settings::from_env();
    let filter = if cli.verbose {
        "asset_scraper=debug,tower_http=debug"
    } else {
        telemetry::DEFAULT_FILTER
    };
    telemetry::init(settings.log_format, filter);

    match command {
        Commands::Serve { port } => cli::serve::run(&settings, port).await,
        Commands::Scrape { asset, code } => cli::scrape_cmd::run(&settings, asset, &code).await,
        Commands::Sweep => cli::sweep_cmd::run(&settings).await,
        Commands::Completions { .. } => Ok(()),
    }
}
