use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	pub bridge: BridgeConfig,
	pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
	/// Origin the wallet side runs at.
	pub trusted_url: String,
	/// Origin the isolated frame is loaded from.
	pub bridge_url: String,
	/// How long a command waits for the frame before giving up.
	pub response_deadline_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
	/// Simulated devices already authorized at startup.
	pub devices: usize,
	/// Artificial latency per device operation.
	pub op_delay_ms: u64,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			bridge: BridgeConfig {
				trusted_url: "chrome://wallet".into(),
				bridge_url: "chrome-untrusted://ledger-bridge".into(),
				response_deadline_ms: 60_000,
			},
			simulator: SimulatorConfig {
				devices: 1,
				op_delay_ms: 0,
			},
		}
	}
}

impl Config {
	/// Directory where CLI state is stored (~/.ledger-bridge/).
	pub fn dir() -> PathBuf {
		dirs::home_dir()
			.expect("could not determine home directory")
			.join(".ledger-bridge")
	}

	/// Path to the config file.
	pub fn path() -> PathBuf {
		Self::dir().join("config.toml")
	}

	/// Load config from disk, falling back to defaults if no file exists.
	pub fn load() -> anyhow::Result<Self> {
		let path = Self::path();
		if path.exists() {
			let content = std::fs::read_to_string(&path)?;
			Ok(toml::from_str(&content)?)
		} else {
			Ok(Self::default())
		}
	}

	/// Persist the current config to disk, creating the directory if needed.
	pub fn save(&self) -> anyhow::Result<()> {
		let path = Self::path();
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(&path, toml::to_string_pretty(self)?)?;
		Ok(())
	}

	/// The response deadline as a duration.
	pub fn deadline(&self) -> Duration {
		Duration::from_millis(self.bridge.response_deadline_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::window::Origin;

	#[test]
	fn defaults_are_sensible() {
		let c = Config::default();
		assert_eq!(c.bridge.trusted_url, "chrome://wallet");
		assert_eq!(c.bridge.bridge_url, "chrome-untrusted://ledger-bridge");
		assert_eq!(c.bridge.response_deadline_ms, 60_000);
		assert_eq!(c.simulator.devices, 1);
		assert_eq!(c.simulator.op_delay_ms, 0);
	}

	#[test]
	fn default_urls_are_valid_origins() {
		let c = Config::default();
		assert!(Origin::parse(&c.bridge.trusted_url).is_ok());
		assert!(Origin::parse(&c.bridge.bridge_url).is_ok());
	}

	#[test]
	fn toml_roundtrip() {
		let mut c = Config::default();
		c.bridge.response_deadline_ms = 5_000;
		c.simulator.devices = 0;

		let serialized = toml::to_string_pretty(&c).unwrap();
		let parsed: Config = toml::from_str(&serialized).unwrap();

		assert_eq!(parsed.bridge.response_deadline_ms, 5_000);
		assert_eq!(parsed.simulator.devices, 0);
		assert_eq!(parsed.bridge.trusted_url, "chrome://wallet");
	}

	#[test]
	fn deadline_is_in_milliseconds() {
		let mut c = Config::default();
		c.bridge.response_deadline_ms = 250;
		assert_eq!(c.deadline(), Duration::from_millis(250));
	}
}
