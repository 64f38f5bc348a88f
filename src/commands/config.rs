use anyhow::Result;

use crate::cli::ConfigCommand;
use crate::config::Config;

pub async fn run(cmd: &ConfigCommand) -> Result<()> {
	match cmd {
		ConfigCommand::Show => show(),
		ConfigCommand::Init => init(),
	}
}

fn show() -> Result<()> {
	let config = Config::load()?;
	println!("Bridge");
	println!("  Trusted URL:  {}", config.bridge.trusted_url);
	println!("  Bridge URL:   {}", config.bridge.bridge_url);
	println!("  Deadline:     {} ms", config.bridge.response_deadline_ms);
	println!("Simulator");
	println!("  Devices:      {}", config.simulator.devices);
	println!("  Op delay:     {} ms", config.simulator.op_delay_ms);
	Ok(())
}

fn init() -> Result<()> {
	let config = Config::load()?;
	config.save()?;
	println!("Config written to {}", Config::path().display());
	Ok(())
}
