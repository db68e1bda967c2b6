//! Syncstore CLI Binary
//!
//! Command-line interface for versioned record channels.

use anyhow::Context;
use clap::Parser;
use std::process;
use syncstore::logging::init_logging;
use syncstore::tooling::cli::{load_config, Cli, CliContext};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<String> {
    let config = load_config(&cli.root, cli.config.as_deref())
        .context("Failed to load configuration")?;
    init_logging(Some(&cli.logging_config(&config.logging)))
        .context("Failed to initialize logging")?;

    let context = CliContext::from_config(cli.root.clone(), config)
        .with_context(|| format!("Failed to open store at {}", cli.root.display()))?;
    let output = context
        .execute(&cli.command, cli.user.as_deref(), cli.node.as_deref())
        .await?;
    context.core().flush().await?;
    Ok(output)
}
