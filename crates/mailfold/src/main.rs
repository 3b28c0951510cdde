//! mailfold - files incoming mail into folders chosen by a classification model.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailfold_core::Config;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let dotenv = dotenvy::dotenv();
    init_tracing(cli.verbose);
    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e).context("Failed to read .env file"),
    }

    let config = Config::from_env().context("Invalid configuration")?;
    debug!(?config, "Loaded configuration");
    info!("Starting mailfold");

    match cli.command {
        Command::Run(args) => commands::run(&config, args).await,
        Command::Reset(args) => commands::reset(&config, args).await,
        Command::Diagnose => commands::diagnose(&config).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "mailfold=debug,mailfold_core=debug"
    } else {
        "mailfold=info,mailfold_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
