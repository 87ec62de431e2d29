use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Structured data attached to a [`LogRecord`].
pub type Payload = Map<String, Value>;

/// Storage key suffix holding records waiting to be sent.
pub const QUEUED_KEY_SUFFIX: &str = "queued";
/// Storage key suffix holding records currently in flight.
pub const SENDING_KEY_SUFFIX: &str = "sending";
/// Storage key suffix holding the instance's last-active time in ms.
pub const LAST_ACTIVE_KEY_SUFFIX: &str = "lastActive";

/// Returns the storage key prefix used by the instance `id` of shipper `name`.
pub fn make_key_prefix(name: &str, id: &str) -> String {
	format!("{}.{}.", name, id)
}

/// A single structured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
	/// Milliseconds since the epoch at which the record was logged.
	pub time: i64,
	/// Case-insensitive severity tag, e.g. `INFO`.
	pub severity: String,
	/// Identifies the kind of event, e.g. `load_app`.
	pub code: String,
	/// Bearer credential of the acting user at log time.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token: Option<String>,
	#[serde(default)]
	pub payload: Payload,
}

impl LogRecord {
	pub fn new(
		time: i64,
		severity: impl Into<String>,
		code: impl Into<String>,
		payload: Payload,
		token: Option<&str>,
	) -> Self {
		Self {
			time,
			severity: severity.into(),
			code: code.into(),
			token: token.filter(|t| !t.is_empty()).map(str::to_owned),
			payload,
		}
	}
}

/// The argument handed to a [`LogSink`](crate::LogSink) on each send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogBatch {
	pub records: Vec<LogRecord>,
	/// Time at which the send was started.
	pub now: i64,
}

/// Severity levels used by the convenience logging methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
	Debug,
	Info,
	Warning,
	Error,
}

impl Severity {
	pub fn as_str(&self) -> &'static str {
		match self {
			Severity::Debug => "DEBUG",
			Severity::Info => "INFO",
			Severity::Warning => "WARNING",
			Severity::Error => "ERROR",
		}
	}
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Decodes a stored JSON array of records.
pub(crate) fn decode_records(s: &str) -> serde_json::Result<Vec<LogRecord>> {
	serde_json::from_str(s)
}

pub(crate) fn encode_records(records: &[LogRecord]) -> serde_json::Result<String> {
	serde_json::to_string(records)
}
