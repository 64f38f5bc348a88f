use anyhow::Result;

use crate::cli::Cli;
use crate::commands::{resolve_bridge, solana_keyring};
use crate::config::Config;

pub async fn run(cli: &Cli, from: i32, to: i32) -> Result<()> {
	let config = Config::load()?;
	let rig = resolve_bridge(cli, &config, None)?;
	let keyring = solana_keyring(&rig)?;

	let accounts = keyring
		.get_accounts(from, to)
		.await
		.map_err(|error| anyhow::anyhow!("account discovery failed: {error}"))?;

	if accounts.is_empty() {
		println!("No accounts in range {from}..={to}.");
		return Ok(());
	}

	if let Some(first) = accounts.first() {
		println!("Device:  {}", first.device_id);
	}
	for account in &accounts {
		println!(
			"  {}  {}",
			account.derivation_path,
			hex::encode(&account.address_bytes)
		);
	}
	Ok(())
}
