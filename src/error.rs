use thiserror::Error;

/// Errors produced by storage backends, sinks and configuration loading.
///
/// The shipper itself never hands these to callers of `log()`; it records them
/// through `tracing` and keeps going.
#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("storage error: {0}")]
	Storage(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("TOML error: {0}")]
	Toml(#[from] toml_edit::TomlError),

	#[error("failed sending log records: {0}")]
	Send(String),

	#[error("log sink unavailable: {0}")]
	SinkUnavailable(String),

	#[error("no async runtime: {0}")]
	Runtime(String),
}

pub type Result<T> = std::result::Result<T, Error>;
