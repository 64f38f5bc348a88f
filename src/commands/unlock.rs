use anyhow::Result;

use crate::cli::Cli;
use crate::commands::{resolve_bridge, solana_keyring};
use crate::config::Config;

pub async fn run(cli: &Cli) -> Result<()> {
	let config = Config::load()?;
	let rig = resolve_bridge(cli, &config, None)?;
	let keyring = solana_keyring(&rig)?;

	match keyring.unlock().await {
		Ok(()) => {
			println!("Device unlocked.");
			println!("Devices:  {}", rig.sim.device_count());
			println!("Frame:    {}", rig.keyring.frame_id());
			Ok(())
		}
		Err(error) => anyhow::bail!("unlock failed: {error}"),
	}
}
