//! Command-line interface definition.

use clap::{Args, Parser, Subcommand};

/// Files incoming mail into folders chosen by a classification model.
#[derive(Debug, Parser)]
#[command(name = "mailfold", version, about, long_about = None)]
pub struct Cli {
    /// Log protocol-level detail.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Triage the source folder, then keep polling.
    Run(RunArgs),
    /// Move every managed message back to the source folder and delete the folders.
    Reset(ResetArgs),
    /// List available models and mailbox folders.
    Diagnose,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Run a single triage pass and exit.
    #[arg(long)]
    pub once: bool,

    /// Seconds between passes (overrides `MAILFOLD_INTERVAL_SECS`).
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Print each run report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// Skip the confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,

    /// Print the reset report as JSON.
    #[arg(long)]
    pub json: bool,
}
