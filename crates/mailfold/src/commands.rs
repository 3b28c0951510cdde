//! Subcommand implementations.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use mailfold_core::{
    Classifier, Config, Confirmation, Disposition, GeminiOracle, ImapMailbox, Mailbox, Oracle,
    Poller, ResetPlan, ResetReport, RunReport, Triage,
};

use crate::cli::{ResetArgs, RunArgs};

/// `mailfold run`
pub async fn run(config: &Config, args: RunArgs) -> Result<()> {
    let oracle = GeminiOracle::new(config.require_oracle()?.clone())
        .context("Failed to build oracle client")?;

    let mut triage_config = config.triage.clone();
    if let Some(secs) = args.interval {
        if secs == 0 {
            bail!("--interval must be positive");
        }
        triage_config.interval = Duration::from_secs(secs);
    }
    let interval = triage_config.interval;
    let triage = Triage::new(Classifier::new(oracle, &triage_config.root), triage_config);

    if args.once {
        return cycle(config, &triage, args.json).await;
    }

    info!(?interval, "Polling; press Ctrl-C to stop");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    Poller::new(interval)
        .run_until(shutdown, || cycle(config, &triage, args.json))
        .await;
    Ok(())
}

async fn cycle<O: Oracle>(config: &Config, triage: &Triage<O>, json: bool) -> Result<()> {
    let mut mailbox = ImapMailbox::connect(&config.imap)
        .await
        .context("Failed to connect to mailbox")?;

    let result = triage.run(&mut mailbox).await;
    if let Err(e) = mailbox.logout().await {
        warn!(error = %e, "Logout failed");
    }

    let report = result.context("Triage run aborted")?;
    print_run_report(&report, json)
}

fn print_run_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for message in &report.messages {
        let uid = message.uid.map_or_else(|| "-".to_string(), |u| u.to_string());
        let outcome = match &message.disposition {
            Disposition::Moved { destination, .. } => format!("moved to {destination}"),
            Disposition::Skipped { reason } => format!("skipped ({reason})"),
            Disposition::Failed { reason, .. } => format!("left in place ({reason})"),
        };
        println!("[{uid}] {} - {outcome}", message.subject);
    }
    println!("{}", report.summary());
    Ok(())
}

/// `mailfold reset`
pub async fn reset(config: &Config, args: ResetArgs) -> Result<()> {
    let root = &config.triage.root;
    let source_folder = &config.triage.source_folder;
    let mut mailbox = ImapMailbox::connect(&config.imap)
        .await
        .context("Failed to connect to mailbox")?;

    let plan = ResetPlan::discover(&mut mailbox, root)
        .await
        .context("Failed to list folders")?;
    if plan.is_empty() {
        println!("No folders under {root}; nothing to reset.");
        logout(&mut mailbox).await;
        return Ok(());
    }

    println!(
        "Found {} folders to process: {}",
        plan.len(),
        plan.folders().collect::<Vec<_>>().join(", ")
    );

    let confirmation = if args.yes {
        Confirmation::assumed()
    } else {
        let question = format!(
            "This will move ALL messages under '{root}' back to {source_folder} and delete those folders. \
             Are you sure? (y/n): "
        );
        match ask(&question).await? {
            Some(confirmation) => confirmation,
            None => {
                println!("Reset cancelled.");
                logout(&mut mailbox).await;
                return Ok(());
            }
        }
    };

    let result = plan.execute(&mut mailbox, source_folder, confirmation).await;
    logout(&mut mailbox).await;
    let report = result.context("Reset aborted")?;
    print_reset_report(&report, args.json)
}

async fn ask(question: &str) -> Result<Option<Confirmation>> {
    print!("{question}");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await
        .context("Failed to read answer")?;
    Ok(Confirmation::from_answer(&answer))
}

fn print_reset_report(report: &ResetReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for folder in &report.folders {
        match &folder.error {
            None => println!("{}: {} messages moved, deleted", folder.name, folder.moved),
            Some(error) => println!(
                "{}: {} messages moved, not fully reset ({error})",
                folder.name, folder.moved
            ),
        }
    }
    println!("{}", report.summary());
    Ok(())
}

/// `mailfold diagnose`
pub async fn diagnose(config: &Config) -> Result<()> {
    println!("--- Models ---");
    match &config.oracle {
        None => println!("GEMINI_API_KEY is not set; skipping model listing."),
        Some(oracle_config) => {
            let oracle = GeminiOracle::new(oracle_config.clone())
                .context("Failed to build oracle client")?;
            match oracle.list_models().await {
                Ok(models) => {
                    let configured = oracle.model().trim_start_matches("models/");
                    for model in models {
                        let marker = if model.name.trim_start_matches("models/") == configured {
                            " (configured)"
                        } else {
                            ""
                        };
                        println!("{}{marker}", model.name);
                    }
                }
                Err(e) => println!("Error listing models: {e}"),
            }
        }
    }

    println!();
    println!("--- Mailbox folders ---");
    match ImapMailbox::connect(&config.imap).await {
        Ok(mut mailbox) => {
            match mailbox.list_folders().await {
                Ok(folders) => {
                    for folder in folders {
                        println!(
                            "{} (Delimiter: {}, Flags: {})",
                            folder.name,
                            folder.delimiter.as_deref().unwrap_or("NIL"),
                            folder.attributes.join(" ")
                        );
                    }
                }
                Err(e) => println!("Error listing folders: {e}"),
            }
            logout(&mut mailbox).await;
        }
        Err(e) => println!("Error connecting to mailbox: {e}"),
    }
    Ok(())
}

async fn logout(mailbox: &mut ImapMailbox) {
    if let Err(e) = mailbox.logout().await {
        warn!(error = %e, "Logout failed");
    }
}
