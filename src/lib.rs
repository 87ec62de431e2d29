mod config;
#[cfg(not(target_arch = "wasm32"))]
mod directory;
mod error;
mod memory;
mod network;
mod record;
mod runtime;
mod shipper;
mod sink;

#[cfg(feature = "web")]
mod web;

pub use config::{ShipperConfig, DEFAULT_INTERVAL_MS};
#[cfg(not(target_arch = "wasm32"))]
pub use directory::{DirectoryConfig, DirectoryStorage};
pub use error::{Error, Result};
pub use memory::MemoryStorage;
pub use network::{AlwaysOnline, NetworkFlag, NetworkStatus, OnlineCallback, Subscription};
pub use record::{
	make_key_prefix, LogBatch, LogRecord, Payload, Severity, LAST_ACTIVE_KEY_SUFFIX,
	QUEUED_KEY_SUFFIX, SENDING_KEY_SUFFIX,
};
pub use shipper::{wall_clock_ms, Clock, LogShipper, ShipperOptions};
pub use sink::{DiscardSink, LogSink, SinkSource, TracingSink};

#[cfg(feature = "web")]
pub use web::{BrowserNetwork, LocalStorage};

/// Synchronous string key-value storage shared by every shipper instance on
/// the same partition, modelled on the browser's `localStorage`.
///
/// Methods take `&self`: implementations use interior mutability, since
/// several shippers may hold the same storage at once.
pub trait Storage {
	/// Returns the value stored under `key`, if any.
	fn get_item(&self, key: &str) -> Result<Option<String>>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set_item(&self, key: &str, value: &str) -> Result<()>;

	/// Removes `key`. Removing a missing key is not an error.
	fn remove_item(&self, key: &str) -> Result<()>;

	/// Lists every key currently set.
	fn keys(&self) -> Result<Vec<String>>;
}
