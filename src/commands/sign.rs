use anyhow::{Context, Result};

use crate::cli::Cli;
use crate::commands::{resolve_bridge, solana_keyring};
use crate::config::Config;
use crate::keyring::sol;

pub async fn run(cli: &Cli, tx_hex: &str, index: i32) -> Result<()> {
	let raw_tx = hex::decode(tx_hex.trim_start_matches("0x"))
		.context("transaction bytes must be hex")?;

	let config = Config::load()?;
	let rig = resolve_bridge(cli, &config, None)?;
	let keyring = solana_keyring(&rig)?;

	let path = sol::derivation_path(index);
	let signature = keyring
		.sign_transaction(&path, &raw_tx)
		.await
		.map_err(|error| anyhow::anyhow!("signing failed: {error}"))?;

	println!("Path:       {path}");
	println!("Signature:  {}", hex::encode(signature));
	Ok(())
}
