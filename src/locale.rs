/// User-facing strings for the bridge, keyed the way the wallet front end
/// names them: the transport-level failure codes plus the authorization
/// prompt.  Device errors render their own messages.
static STRINGS: &[(&str, &str)] = &[
	(
		"bridgeNotReady",
		"The hardware wallet bridge is not ready. Reconnect the device and try again.",
	),
	(
		"bridgeCommandInProgress",
		"A hardware wallet operation is already in progress. Wait for it to finish.",
	),
	(
		"bridgeResponseTimeout",
		"The hardware wallet bridge did not respond in time.",
	),
	(
		"bridgeAuthorizationRequired",
		"Authorize your hardware wallet to continue.",
	),
];

/// Look up a locale string, falling back to the key itself so a missing
/// entry degrades to something greppable instead of a blank message.
pub fn get_locale(key: &'static str) -> &'static str {
	STRINGS
		.iter()
		.find(|(name, _)| *name == key)
		.map(|(_, text)| *text)
		.unwrap_or(key)
}
