use serde::de::DeserializeOwned;
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::window::Origin;

// -- Command kinds --

/// Every message kind that crosses the bridge channel, tagged on the wire
/// by its string form.  The authorization kinds only ever travel from the
/// frame to the parent context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
	#[serde(rename = "ledger-unlock")]
	Unlock,
	#[serde(rename = "ledger-get-accounts")]
	GetAccount,
	#[serde(rename = "ledger-sign-transaction")]
	SignTransaction,
	#[serde(rename = "authorization-required")]
	AuthorizationRequired,
	#[serde(rename = "authorization-success")]
	AuthorizationSuccess,
}

impl CommandKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			CommandKind::Unlock => "ledger-unlock",
			CommandKind::GetAccount => "ledger-get-accounts",
			CommandKind::SignTransaction => "ledger-sign-transaction",
			CommandKind::AuthorizationRequired => "authorization-required",
			CommandKind::AuthorizationSuccess => "authorization-success",
		}
	}
}

impl std::fmt::Display for CommandKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Requests and responses are correlated by command kind, not by a unique
/// request id.  All requests of one kind share a single key, which is what
/// limits the channel to one in-flight request per kind: a second sender
/// finds the key taken and fails fast instead of queueing behind a device
/// operation.  Messages still carry the key in their `id` field on the wire.
pub type CorrelationKey = CommandKind;

// -- Transport status codes --

/// Failures raised by the messaging layer itself.  These never cross the
/// channel; they are returned directly to the caller in place of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
	#[error("bridge is not ready")]
	BridgeNotReady,
	#[error("a command of this kind is already in flight")]
	CommandInProgress,
	#[error("timed out waiting for the bridge to respond")]
	Timeout,
}

impl TransportError {
	/// Stable numeric code, kept for parity with the wire protocol's
	/// out-of-band error codes.
	pub fn code(&self) -> u8 {
		match self {
			TransportError::BridgeNotReady => 0,
			TransportError::CommandInProgress => 1,
			TransportError::Timeout => 2,
		}
	}
}

// -- Command envelopes --

/// Ask the frame whether a device is paired and reachable.  Never opens a
/// device session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockCommand {
	pub id: CorrelationKey,
	pub origin: Origin,
}

/// Ask the frame for the address at one derivation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetAccountCommand {
	pub id: CorrelationKey,
	pub origin: Origin,
	pub path: String,
}

/// Ask the frame to sign a serialized transaction with the key at `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignTransactionCommand {
	pub id: CorrelationKey,
	pub origin: Origin,
	pub path: String,
	#[serde(rename = "rawTxBytes")]
	pub raw_tx_bytes: Vec<u8>,
}

/// Envelope shared by the two frame-to-parent authorization notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCommand {
	pub id: CorrelationKey,
	pub origin: Origin,
}

/// A command message, tagged on the wire by its `command` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum BridgeCommand {
	#[serde(rename = "ledger-unlock")]
	Unlock(UnlockCommand),
	#[serde(rename = "ledger-get-accounts")]
	GetAccount(GetAccountCommand),
	#[serde(rename = "ledger-sign-transaction")]
	SignTransaction(SignTransactionCommand),
	#[serde(rename = "authorization-required")]
	AuthorizationRequired(AuthorizationCommand),
	#[serde(rename = "authorization-success")]
	AuthorizationSuccess(AuthorizationCommand),
}

impl BridgeCommand {
	pub fn unlock(origin: Origin) -> Self {
		BridgeCommand::Unlock(UnlockCommand { id: CommandKind::Unlock, origin })
	}

	pub fn get_account(origin: Origin, path: impl Into<String>) -> Self {
		BridgeCommand::GetAccount(GetAccountCommand {
			id: CommandKind::GetAccount,
			origin,
			path: path.into(),
		})
	}

	pub fn sign_transaction(origin: Origin, path: impl Into<String>, raw_tx_bytes: Vec<u8>) -> Self {
		BridgeCommand::SignTransaction(SignTransactionCommand {
			id: CommandKind::SignTransaction,
			origin,
			path: path.into(),
			raw_tx_bytes,
		})
	}

	pub fn authorization_required(origin: Origin) -> Self {
		BridgeCommand::AuthorizationRequired(AuthorizationCommand {
			id: CommandKind::AuthorizationRequired,
			origin,
		})
	}

	pub fn authorization_success(origin: Origin) -> Self {
		BridgeCommand::AuthorizationSuccess(AuthorizationCommand {
			id: CommandKind::AuthorizationSuccess,
			origin,
		})
	}

	pub fn kind(&self) -> CommandKind {
		match self {
			BridgeCommand::Unlock(_) => CommandKind::Unlock,
			BridgeCommand::GetAccount(_) => CommandKind::GetAccount,
			BridgeCommand::SignTransaction(_) => CommandKind::SignTransaction,
			BridgeCommand::AuthorizationRequired(_) => CommandKind::AuthorizationRequired,
			BridgeCommand::AuthorizationSuccess(_) => CommandKind::AuthorizationSuccess,
		}
	}

	pub fn id(&self) -> CorrelationKey {
		match self {
			BridgeCommand::Unlock(c) => c.id,
			BridgeCommand::GetAccount(c) => c.id,
			BridgeCommand::SignTransaction(c) => c.id,
			BridgeCommand::AuthorizationRequired(c) => c.id,
			BridgeCommand::AuthorizationSuccess(c) => c.id,
		}
	}

	pub fn origin(&self) -> &Origin {
		match self {
			BridgeCommand::Unlock(c) => &c.origin,
			BridgeCommand::GetAccount(c) => &c.origin,
			BridgeCommand::SignTransaction(c) => &c.origin,
			BridgeCommand::AuthorizationRequired(c) => &c.origin,
			BridgeCommand::AuthorizationSuccess(c) => &c.origin,
		}
	}
}

// -- Response payloads --

/// Success payload of an unlock: nothing but the flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockAck {
	pub success: bool,
}

impl UnlockAck {
	pub fn ok() -> Self {
		UnlockAck { success: true }
	}
}

/// Success payload of a get-account: raw address bytes from the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPayload {
	pub success: bool,
	pub address: Vec<u8>,
}

impl AddressPayload {
	pub fn new(address: Vec<u8>) -> Self {
		AddressPayload { success: true, address }
	}
}

/// Success payload of a sign-transaction: raw signature bytes, unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignaturePayload {
	pub success: bool,
	pub signature: Vec<u8>,
}

impl SignaturePayload {
	pub fn new(signature: Vec<u8>) -> Self {
		SignaturePayload { success: true, signature }
	}
}

/// The untyped error bag that crosses the channel when a frame-side
/// operation fails.  Which optional fields are present depends on what the
/// device library threw; the keyring decodes the bag into a closed error
/// enum at the boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
	pub status_code: Option<u16>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

impl ErrorPayload {
	pub fn new(message: impl Into<String>) -> Self {
		ErrorPayload { message: Some(message.into()), ..ErrorPayload::default() }
	}

	/// The error the frame reports when no device has been authorized for it.
	pub fn unauthorized() -> Self {
		ErrorPayload {
			message: Some("unauthorized".into()),
			id: Some("unauthorized".into()),
			..ErrorPayload::default()
		}
	}
}

/// Either a success payload or an [`ErrorPayload`], discriminated on the
/// wire by the `success` boolean both carry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload<T> {
	Success(T),
	Failure(ErrorPayload),
}

impl<T> ResponsePayload<T> {
	pub fn is_success(&self) -> bool {
		matches!(self, ResponsePayload::Success(_))
	}

	pub fn into_result(self) -> Result<T, ErrorPayload> {
		match self {
			ResponsePayload::Success(payload) => Ok(payload),
			ResponsePayload::Failure(error) => Err(error),
		}
	}
}

// Success and error payloads share field names, so an untagged derive would
// be ambiguous.  Dispatch on the `success` flag instead.
impl<'de, T> Deserialize<'de> for ResponsePayload<T>
where
	T: DeserializeOwned,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = serde_json::Value::deserialize(deserializer)?;
		let success = value
			.get("success")
			.and_then(serde_json::Value::as_bool)
			.ok_or_else(|| de::Error::missing_field("success"))?;
		if success {
			serde_json::from_value(value).map(ResponsePayload::Success).map_err(de::Error::custom)
		} else {
			serde_json::from_value(value).map(ResponsePayload::Failure).map_err(de::Error::custom)
		}
	}
}

// -- Response envelopes --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockResponse {
	pub id: CorrelationKey,
	pub origin: Origin,
	pub payload: ResponsePayload<UnlockAck>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetAccountResponse {
	pub id: CorrelationKey,
	pub origin: Origin,
	pub payload: ResponsePayload<AddressPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignTransactionResponse {
	pub id: CorrelationKey,
	pub origin: Origin,
	pub payload: ResponsePayload<SignaturePayload>,
}

/// A response message.  Responses echo the `id` and `origin` of the command
/// they answer, so the sender's transport can match and consume the pending
/// entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum BridgeResponse {
	#[serde(rename = "ledger-unlock")]
	Unlock(UnlockResponse),
	#[serde(rename = "ledger-get-accounts")]
	GetAccount(GetAccountResponse),
	#[serde(rename = "ledger-sign-transaction")]
	SignTransaction(SignTransactionResponse),
}

impl BridgeResponse {
	pub fn unlock_ok(command: &UnlockCommand) -> Self {
		BridgeResponse::Unlock(UnlockResponse {
			id: command.id,
			origin: command.origin.clone(),
			payload: ResponsePayload::Success(UnlockAck::ok()),
		})
	}

	pub fn unlock_err(command: &UnlockCommand, error: ErrorPayload) -> Self {
		BridgeResponse::Unlock(UnlockResponse {
			id: command.id,
			origin: command.origin.clone(),
			payload: ResponsePayload::Failure(error),
		})
	}

	pub fn account_ok(command: &GetAccountCommand, address: Vec<u8>) -> Self {
		BridgeResponse::GetAccount(GetAccountResponse {
			id: command.id,
			origin: command.origin.clone(),
			payload: ResponsePayload::Success(AddressPayload::new(address)),
		})
	}

	pub fn account_err(command: &GetAccountCommand, error: ErrorPayload) -> Self {
		BridgeResponse::GetAccount(GetAccountResponse {
			id: command.id,
			origin: command.origin.clone(),
			payload: ResponsePayload::Failure(error),
		})
	}

	pub fn signature_ok(command: &SignTransactionCommand, signature: Vec<u8>) -> Self {
		BridgeResponse::SignTransaction(SignTransactionResponse {
			id: command.id,
			origin: command.origin.clone(),
			payload: ResponsePayload::Success(SignaturePayload::new(signature)),
		})
	}

	pub fn signature_err(command: &SignTransactionCommand, error: ErrorPayload) -> Self {
		BridgeResponse::SignTransaction(SignTransactionResponse {
			id: command.id,
			origin: command.origin.clone(),
			payload: ResponsePayload::Failure(error),
		})
	}

	pub fn kind(&self) -> CommandKind {
		match self {
			BridgeResponse::Unlock(_) => CommandKind::Unlock,
			BridgeResponse::GetAccount(_) => CommandKind::GetAccount,
			BridgeResponse::SignTransaction(_) => CommandKind::SignTransaction,
		}
	}

	pub fn id(&self) -> CorrelationKey {
		match self {
			BridgeResponse::Unlock(r) => r.id,
			BridgeResponse::GetAccount(r) => r.id,
			BridgeResponse::SignTransaction(r) => r.id,
		}
	}

	pub fn origin(&self) -> &Origin {
		match self {
			BridgeResponse::Unlock(r) => &r.origin,
			BridgeResponse::GetAccount(r) => &r.origin,
			BridgeResponse::SignTransaction(r) => &r.origin,
		}
	}
}

// -- Message union --

/// Anything that can arrive on the channel.  Commands never carry a
/// `payload` field and responses always do, which is what lets the untagged
/// deserialization tell them apart; the `Response` arm must stay first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BridgeMessage {
	Response(BridgeResponse),
	Command(BridgeCommand),
}

impl BridgeMessage {
	pub fn kind(&self) -> CommandKind {
		match self {
			BridgeMessage::Response(r) => r.kind(),
			BridgeMessage::Command(c) => c.kind(),
		}
	}

	pub fn id(&self) -> CorrelationKey {
		match self {
			BridgeMessage::Response(r) => r.id(),
			BridgeMessage::Command(c) => c.id(),
		}
	}

	pub fn origin(&self) -> &Origin {
		match self {
			BridgeMessage::Response(r) => r.origin(),
			BridgeMessage::Command(c) => c.origin(),
		}
	}
}

impl From<BridgeCommand> for BridgeMessage {
	fn from(command: BridgeCommand) -> Self {
		BridgeMessage::Command(command)
	}
}

impl From<BridgeResponse> for BridgeMessage {
	fn from(response: BridgeResponse) -> Self {
		BridgeMessage::Response(response)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn wallet() -> Origin {
		Origin::parse("chrome://wallet").unwrap()
	}

	#[test]
	fn unlock_command_wire_shape() {
		let cmd = BridgeCommand::unlock(wallet());
		let value = serde_json::to_value(&cmd).unwrap();
		assert_eq!(
			value,
			json!({
				"command": "ledger-unlock",
				"id": "ledger-unlock",
				"origin": "chrome://wallet",
			})
		);
	}

	#[test]
	fn sign_command_keeps_wire_field_names() {
		let cmd = BridgeCommand::sign_transaction(wallet(), "44'/501'/1'/0'", vec![1, 2, 3]);
		let value = serde_json::to_value(&cmd).unwrap();
		assert_eq!(
			value,
			json!({
				"command": "ledger-sign-transaction",
				"id": "ledger-sign-transaction",
				"origin": "chrome://wallet",
				"path": "44'/501'/1'/0'",
				"rawTxBytes": [1, 2, 3],
			})
		);
	}

	#[test]
	fn response_payload_discriminates_on_success_flag() {
		let ok: ResponsePayload<AddressPayload> =
			serde_json::from_value(json!({ "success": true, "address": [7, 7] })).unwrap();
		assert_eq!(ok, ResponsePayload::Success(AddressPayload::new(vec![7, 7])));

		let err: ResponsePayload<AddressPayload> = serde_json::from_value(json!({
			"success": false,
			"statusCode": 0x6985,
		}))
		.unwrap();
		let payload = match err {
			ResponsePayload::Failure(e) => e,
			other => panic!("expected failure, got {other:?}"),
		};
		assert_eq!(payload.status_code, Some(0x6985));
	}

	#[test]
	fn response_payload_requires_success_field() {
		let result: Result<ResponsePayload<UnlockAck>, _> =
			serde_json::from_value(json!({ "address": [1] }));
		assert!(result.is_err());
	}

	#[test]
	fn message_union_separates_responses_from_commands() {
		let response = json!({
			"command": "ledger-unlock",
			"id": "ledger-unlock",
			"origin": "chrome://wallet",
			"payload": { "success": true },
		});
		let parsed: BridgeMessage = serde_json::from_value(response).unwrap();
		assert!(matches!(parsed, BridgeMessage::Response(_)));

		let command = json!({
			"command": "ledger-get-accounts",
			"id": "ledger-get-accounts",
			"origin": "chrome://wallet",
			"path": "44'/501'/0'/0'",
		});
		let parsed: BridgeMessage = serde_json::from_value(command).unwrap();
		assert!(matches!(parsed, BridgeMessage::Command(BridgeCommand::GetAccount(_))));
	}

	#[test]
	fn error_payload_skips_absent_fields() {
		let value = serde_json::to_value(ErrorPayload::unauthorized()).unwrap();
		assert_eq!(
			value,
			json!({
				"success": false,
				"message": "unauthorized",
				"id": "unauthorized",
			})
		);
	}

	#[test]
	fn error_payload_reads_wire_status_code() {
		let payload: ErrorPayload = serde_json::from_value(json!({
			"success": false,
			"name": "TransportStatusError",
			"statusCode": 0x6985,
		}))
		.unwrap();
		assert_eq!(payload.status_code, Some(0x6985));
		assert_eq!(payload.name.as_deref(), Some("TransportStatusError"));
	}

	#[test]
	fn transport_error_codes_are_stable() {
		assert_eq!(TransportError::BridgeNotReady.code(), 0);
		assert_eq!(TransportError::CommandInProgress.code(), 1);
		assert_eq!(TransportError::Timeout.code(), 2);
	}

	#[test]
	fn command_kind_round_trips_through_wire_strings() {
		for kind in [
			CommandKind::Unlock,
			CommandKind::GetAccount,
			CommandKind::SignTransaction,
			CommandKind::AuthorizationRequired,
			CommandKind::AuthorizationSuccess,
		] {
			let s = serde_json::to_string(&kind).unwrap();
			assert_eq!(s, format!("\"{}\"", kind.as_str()));
			let back: CommandKind = serde_json::from_str(&s).unwrap();
			assert_eq!(back, kind);
		}
	}
}
