use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ledger_bridge::cli::{Cli, Command};
use ledger_bridge::commands;

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
		)
		.init();

	let cli = Cli::parse();

	match &cli.command {
		Command::Unlock => commands::unlock::run(&cli).await,
		Command::Accounts { from, to } => commands::accounts::run(&cli, *from, *to).await,
		Command::Sign { tx_hex, index } => commands::sign::run(&cli, tx_hex, *index).await,
		Command::Authorize => commands::authorize::run(&cli).await,
		Command::Config { command } => commands::config::run(command).await,
	}
}
