use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::cli::Cli;
use crate::commands::{resolve_bridge, solana_keyring};
use crate::config::Config;
use crate::locale::get_locale;
use crate::transport::trusted::AuthorizationListener;

pub async fn run(cli: &Cli) -> Result<()> {
	let config = Config::load()?;
	let on_authorized: AuthorizationListener = Arc::new(|show_prompt| {
		if !show_prompt {
			println!("Wallet:  authorization confirmed, hiding the prompt.");
		}
	});
	let rig = resolve_bridge(cli, &config, Some(on_authorized))?;
	let keyring = solana_keyring(&rig)?;

	// The simulated user approves the device chooser once it comes up.
	rig.sim.set_grant_on_prompt(true);

	if keyring.unlock().await.is_ok() {
		println!("Device already authorized.");
		return Ok(());
	}
	println!("Wallet:  {}", get_locale("bridgeAuthorizationRequired"));
	println!("Running the grant flow in the bridge frame.");

	let untrusted = rig
		.host
		.untrusted(rig.keyring.frame_id())
		.await
		.ok_or_else(|| anyhow::anyhow!("bridge frame is not attached"))?;

	untrusted.notify_authorization_required();
	untrusted
		.authorize()
		.await
		.map_err(|error| anyhow::anyhow!("authorization flow failed: {error}"))?;

	// The success notice travels through the wallet window's listener task.
	tokio::time::sleep(Duration::from_millis(50)).await;

	match keyring.unlock().await {
		Ok(()) => {
			println!("Device unlocked.");
			Ok(())
		}
		Err(error) => anyhow::bail!("device still unreachable after authorization: {error}"),
	}
}
