pub mod sim;

use crate::messages::ErrorPayload;

// -- Devices --

/// Identifying details of one enumerated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
	pub product_name: String,
}

/// Access to the vendor device stack from inside the isolated frame.  The
/// real implementation wraps the HID libraries; tests and the demo binary
/// use [`sim::SimulatedLedger`].
#[async_trait::async_trait]
pub trait HardwareTransport: Send + Sync {
	/// Devices this frame is currently authorized to talk to.  Never
	/// prompts the user.
	async fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

	/// Open a session with the first available device.  When no device is
	/// authorized yet, opening is what raises the platform pairing prompt.
	async fn open(&self) -> Result<Box<dyn DeviceSession>, DeviceError>;
}

/// A live device session.  One session serves exactly one operation, and
/// every exit path must close it.
#[async_trait::async_trait]
pub trait DeviceSession: Send {
	async fn get_address(&mut self, path: &str) -> Result<Vec<u8>, DeviceError>;

	async fn sign_transaction(&mut self, path: &str, raw_tx: &[u8]) -> Result<Vec<u8>, DeviceError>;

	async fn close(&mut self) -> Result<(), DeviceError>;
}

// -- Errors --

/// Everything a device operation can fail with.  The wire carries the
/// untyped [`ErrorPayload`] bag; this closed enum is what the rest of the
/// code matches on, so new failure modes must be added here rather than
/// smuggled through as strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
	#[error("device is unavailable or disconnected")]
	DeviceUnavailable,
	#[error("no device has been authorized")]
	Unauthorized,
	#[error("user rejected the request on the device")]
	UserRejected,
	#[error("device returned status {0:#06x}")]
	StatusCode(u16),
	#[error("{0}")]
	Unknown(String),
}

/// Status word Ledger devices return when the user presses reject.
const STATUS_USER_REJECTED: u16 = 0x6985;

/// Library error names that all mean the device went away.
const DISCONNECT_NAMES: [&str; 4] = [
	"DisconnectedDevice",
	"DisconnectedDeviceDuringOperation",
	"NoDevice",
	"CantOpenDevice",
];

impl DeviceError {
	/// Encode for the wire.
	pub fn to_payload(&self) -> ErrorPayload {
		match self {
			DeviceError::DeviceUnavailable => ErrorPayload {
				message: Some(self.to_string()),
				name: Some("DisconnectedDevice".into()),
				..ErrorPayload::default()
			},
			DeviceError::Unauthorized => ErrorPayload::unauthorized(),
			DeviceError::UserRejected => ErrorPayload {
				message: Some(self.to_string()),
				status_code: Some(STATUS_USER_REJECTED),
				name: Some("TransportStatusError".into()),
				..ErrorPayload::default()
			},
			DeviceError::StatusCode(code) => ErrorPayload {
				message: Some(self.to_string()),
				status_code: Some(*code),
				name: Some("TransportStatusError".into()),
				..ErrorPayload::default()
			},
			DeviceError::Unknown(message) => ErrorPayload::new(message.clone()),
		}
	}

	/// Decode a wire error bag.  Precedence: the explicit unauthorized
	/// marker, then disconnect-flavored library names, then the status
	/// word, then whatever message text is left.
	pub fn from_payload(payload: &ErrorPayload) -> Self {
		if payload.id.as_deref() == Some("unauthorized") {
			return DeviceError::Unauthorized;
		}
		if let Some(name) = payload.name.as_deref() {
			if DISCONNECT_NAMES.contains(&name) {
				return DeviceError::DeviceUnavailable;
			}
		}
		match payload.status_code {
			Some(STATUS_USER_REJECTED) => DeviceError::UserRejected,
			Some(code) => DeviceError::StatusCode(code),
			None => match payload.message.as_deref() {
				Some(message) => DeviceError::Unknown(message.to_string()),
				None => DeviceError::Unknown("unknown device error".into()),
			},
		}
	}
}
