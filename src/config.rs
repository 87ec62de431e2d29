use crate::{Error, Result};
use toml_edit::{DocumentMut, Item, Table};

/// Default minimum interval between sends.
pub const DEFAULT_INTERVAL_MS: u64 = 10_000;

/// Configuration for a [`LogShipper`](crate::LogShipper).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipperConfig {
	/// Identifies the shipper in storage keys. Should stay constant across
	/// runs of the application so that a restarted instance can claim what a
	/// previous one left behind.
	pub name: String,
	/// Minimum time between two sends, in milliseconds.
	pub interval_ms: u64,
	/// How long another instance must have been idle before its records are
	/// claimed. Defaults to twice `interval_ms`.
	pub stale_after_ms: Option<u64>,
}

impl ShipperConfig {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			interval_ms: DEFAULT_INTERVAL_MS,
			stale_after_ms: None,
		}
	}

	pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
		self.interval_ms = interval_ms;
		self
	}

	pub fn with_stale_after_ms(mut self, stale_after_ms: u64) -> Self {
		self.stale_after_ms = Some(stale_after_ms);
		self
	}

	pub fn stale_threshold_ms(&self) -> u64 {
		self.stale_after_ms
			.unwrap_or_else(|| self.interval_ms.saturating_mul(2))
	}

	/// Checks that `name` can be embedded in a `<name>.<id>.` key prefix.
	pub fn validate(&self) -> Result<()> {
		if self.name.is_empty() {
			return Err(Error::Config("name must not be empty".into()));
		}
		if self.name.contains('.') {
			return Err(Error::Config(format!(
				"name {:?} must not contain '.'",
				self.name
			)));
		}
		Ok(())
	}

	/// Parses a configuration from TOML.
	///
	/// Keys are read from a `[log_shipper]` table when present, otherwise from
	/// the top level:
	///
	/// ```
	/// use logshipper::ShipperConfig;
	///
	/// let config = ShipperConfig::from_toml_str(
	///     "[log_shipper]\nname = \"log\"\ninterval_ms = 5000\n",
	/// )
	/// .unwrap();
	/// assert_eq!(config.name, "log");
	/// assert_eq!(config.stale_threshold_ms(), 10_000);
	/// ```
	pub fn from_toml_str(s: &str) -> Result<Self> {
		let doc: DocumentMut = s.parse()?;
		let table = match doc.get("log_shipper") {
			Some(Item::Table(t)) => t,
			Some(_) => return Err(Error::Config("log_shipper must be a table".into())),
			None => doc.as_table(),
		};

		let name = match table.get("name") {
			Some(item) => item
				.as_str()
				.ok_or_else(|| Error::Config("name must be a string".into()))?,
			None => return Err(Error::Config("missing name".into())),
		};

		let mut config = ShipperConfig::new(name);
		if let Some(ms) = read_millis(table, "interval_ms")? {
			config.interval_ms = ms;
		}
		config.stale_after_ms = read_millis(table, "stale_after_ms")?;
		config.validate()?;
		Ok(config)
	}
}

fn read_millis(table: &Table, key: &str) -> Result<Option<u64>> {
	let Some(item) = table.get(key) else {
		return Ok(None);
	};
	match item.as_integer() {
		Some(v) if v >= 0 => Ok(Some(v as u64)),
		_ => Err(Error::Config(format!(
			"{} must be a non-negative integer",
			key
		))),
	}
}
