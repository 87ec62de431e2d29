use crate::network::{AlwaysOnline, NetworkStatus, Subscription};
use crate::record::{
	decode_records, encode_records, make_key_prefix, LAST_ACTIVE_KEY_SUFFIX, QUEUED_KEY_SUFFIX,
	SENDING_KEY_SUFFIX,
};
use crate::{
	runtime, Error, LogBatch, LogRecord, LogSink, Payload, Result, Severity, ShipperConfig,
	SinkSource, Storage,
};
use futures::channel::mpsc;
use futures::future::{select, Either, FutureExt, LocalBoxFuture};
use futures::StreamExt;
use rand::Rng;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Returns the current time as milliseconds since the epoch.
pub type Clock = Rc<dyn Fn() -> i64>;

/// Reads the wall clock.
pub fn wall_clock_ms() -> i64 {
	chrono::Utc::now().timestamp_millis()
}

/// Optional collaborators of a [`LogShipper`].
#[derive(Clone)]
pub struct ShipperOptions {
	pub clock: Clock,
	pub network: Rc<dyn NetworkStatus>,
}

impl ShipperOptions {
	pub fn with_clock(mut self, clock: impl Fn() -> i64 + 'static) -> Self {
		self.clock = Rc::new(clock);
		self
	}

	pub fn with_network(mut self, network: impl NetworkStatus + 'static) -> Self {
		self.network = Rc::new(network);
		self
	}
}

impl Default for ShipperOptions {
	fn default() -> Self {
		Self {
			clock: Rc::new(wall_clock_ms),
			network: Rc::new(AlwaysOnline),
		}
	}
}

/// Durably queues log records and ships them in rate-limited batches.
///
/// Records are written to [`Storage`] under keys prefixed with
/// `<name>.<id>.`, where `id` is random per instance, so several instances
/// (e.g. browser tabs) can share one storage partition. Records left behind by
/// an instance that stopped updating its last-active time are claimed and
/// resent by whichever instance notices first.
///
/// The shipper is single-threaded. Its send timer runs in a task spawned at
/// construction, so on native targets it has to be created inside a
/// `tokio::task::LocalSet`. [`log`](Self::log) only stores the record and
/// signals that task, so it can be called from anywhere on the thread, even
/// after the `LocalSet` stops being polled. Cloning yields another handle to
/// the same instance.
///
/// # Examples
/// ```
/// use logshipper::{LogShipper, MemoryStorage, Payload, ShipperConfig, SinkSource, TracingSink};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// # tokio::task::LocalSet::new().run_until(async {
/// let shipper = LogShipper::new(
///     ShipperConfig::new("log").with_interval_ms(1000),
///     MemoryStorage::new(),
///     SinkSource::ready(TracingSink),
/// )
/// .unwrap();
///
/// shipper.log("INFO", "load_app", Payload::new(), None);
/// assert!(shipper.is_send_scheduled());
/// # }).await;
/// # }
/// ```
#[derive(Clone)]
pub struct LogShipper {
	inner: Rc<Inner>,
}

struct Inner {
	config: ShipperConfig,
	prefix: String,
	storage: Rc<dyn Storage>,
	clock: Clock,
	network: Rc<dyn NetworkStatus>,
	sink: RefCell<Option<Rc<dyn LogSink>>>,
	/// Time at which the last send started.
	last_send_time: Cell<Option<i64>>,
	in_flight: Cell<bool>,
	/// Set while the driver holds an armed send timer.
	scheduled: Cell<bool>,
	commands: mpsc::UnboundedSender<Command>,
	subscription: RefCell<Option<Subscription>>,
}

/// Requests from shipper handles to the driver task.
enum Command {
	/// Send queued records after the given number of ms.
	Arm(u64),
	Cancel,
}

enum Wake {
	Command(Command),
	TimerFired,
	Closed,
}

impl LogShipper {
	/// Creates a shipper using the wall clock and assuming it is always online.
	pub fn new(
		config: ShipperConfig,
		storage: impl Storage + 'static,
		sink: SinkSource,
	) -> Result<Self> {
		Self::with_options(config, storage, sink, ShipperOptions::default())
	}

	/// Creates a shipper and immediately claims records abandoned by other
	/// instances sharing `storage`.
	///
	/// Fails if `config` is invalid or, on native targets, if there is no tokio
	/// runtime to drive the send timer.
	///
	/// # Panics
	///
	/// On native targets, panics when called inside a tokio runtime but outside
	/// a `tokio::task::LocalSet`.
	pub fn with_options(
		config: ShipperConfig,
		storage: impl Storage + 'static,
		sink: SinkSource,
		options: ShipperOptions,
	) -> Result<Self> {
		config.validate()?;

		let id = format!("{:08}", rand::thread_rng().gen_range(0..100_000_000u32));
		let prefix = make_key_prefix(&config.name, &id);

		let (ready, deferred) = match sink {
			SinkSource::Ready(sink) => (Some(sink), None),
			SinkSource::Deferred(future) => (None, Some(future)),
		};
		let (commands, receiver) = mpsc::unbounded();

		let inner = Rc::new(Inner {
			config,
			prefix,
			storage: Rc::new(storage),
			clock: options.clock,
			network: options.network,
			sink: RefCell::new(ready),
			last_send_time: Cell::new(None),
			in_flight: Cell::new(false),
			scheduled: Cell::new(false),
			commands,
			subscription: RefCell::new(None),
		});

		runtime::spawn_local(drive(Rc::downgrade(&inner), receiver, deferred))?;

		inner.claim_abandoned_records();
		inner.schedule_send();

		// Sending is held off while offline, so retry when coming back online.
		let weak = Rc::downgrade(&inner);
		let subscription = inner.network.on_online(Rc::new(move || {
			if let Some(inner) = weak.upgrade() {
				inner.schedule_send();
			}
		}));
		*inner.subscription.borrow_mut() = Some(subscription);

		tracing::debug!(prefix = %inner.prefix, "log shipper started");
		Ok(Self { inner })
	}

	/// Queues a record for sending.
	///
	/// `severity` is a case-insensitive level such as `INFO`, `code` identifies
	/// the kind of event and `payload` describes it. `token` optionally carries
	/// an auth token identifying the current user.
	///
	/// Never fails or panics: this is called from error handlers, so problems
	/// are only reported through `tracing`. If the task driving sends is gone,
	/// the record still lands in storage for a later instance to claim.
	pub fn log(&self, severity: &str, code: &str, payload: Payload, token: Option<&str>) {
		let inner = &self.inner;
		let now = (inner.clock)();
		let record = LogRecord::new(now, severity, code, payload, token);

		inner.update_last_active(now);
		inner.enqueue_records(vec![record]);
		inner.schedule_send();
	}

	pub fn log_debug(&self, code: &str, payload: Payload) {
		self.log(Severity::Debug.as_str(), code, payload, None);
	}

	pub fn log_info(&self, code: &str, payload: Payload) {
		self.log(Severity::Info.as_str(), code, payload, None);
	}

	pub fn log_error(&self, code: &str, payload: Payload) {
		self.log(Severity::Error.as_str(), code, payload, None);
	}

	/// Logs `err` with ERROR severity, recording its message and the messages
	/// of its source chain.
	pub fn log_error_value(&self, code: &str, err: &(dyn std::error::Error + 'static)) {
		let mut payload = Payload::new();
		payload.insert("message".into(), Value::String(err.to_string()));
		let sources: Vec<Value> = std::iter::successors(err.source(), |e| e.source())
			.map(|e| Value::String(e.to_string()))
			.collect();
		if !sources.is_empty() {
			payload.insert("sources".into(), Value::Array(sources));
		}
		tracing::error!(code, error = %err, "error logged");
		self.log(Severity::Error.as_str(), code, payload, None);
	}

	/// Returns true if a send timer is armed.
	pub fn is_send_scheduled(&self) -> bool {
		self.inner.is_send_scheduled()
	}

	/// Returns the `<name>.<id>.` prefix of this instance's storage keys.
	pub fn storage_prefix(&self) -> &str {
		&self.inner.prefix
	}

	pub fn config(&self) -> &ShipperConfig {
		&self.inner.config
	}

	/// Stops reacting to connectivity changes and cancels any armed timer.
	///
	/// Stored records are left in place for a later instance to claim.
	pub fn destroy(&self) {
		let subscription = self.inner.subscription.borrow_mut().take();
		if let Some(subscription) = subscription {
			subscription.cancel();
		}
		if self.inner.scheduled.replace(false) {
			if let Err(e) = self.inner.commands.unbounded_send(Command::Cancel) {
				tracing::debug!(error = %e, "send timer already gone");
			}
		}
	}
}

/// Owns the send timer: waits for the deferred sink, then arms, cancels and
/// fires sends as handles ask. Ends once every handle is dropped.
async fn drive(
	weak: Weak<Inner>,
	mut commands: mpsc::UnboundedReceiver<Command>,
	deferred: Option<LocalBoxFuture<'static, Result<Rc<dyn LogSink>>>>,
) {
	if let Some(future) = deferred {
		match future.await {
			Ok(sink) => {
				if let Some(inner) = weak.upgrade() {
					*inner.sink.borrow_mut() = Some(sink);
					inner.schedule_send();
				}
			}
			Err(e) => tracing::error!(error = %e, "failed to get log sink"),
		}
	}

	let mut timer: Option<LocalBoxFuture<'static, ()>> = None;
	loop {
		let wake = match timer.as_mut() {
			// Commands win ties so a cancel beats a timer that is already due.
			Some(sleep) => match select(commands.next(), sleep).await {
				Either::Left((Some(command), _)) => Wake::Command(command),
				Either::Left((None, _)) => Wake::Closed,
				Either::Right(_) => Wake::TimerFired,
			},
			None => match commands.next().await {
				Some(command) => Wake::Command(command),
				None => Wake::Closed,
			},
		};

		match wake {
			Wake::Command(Command::Arm(delay_ms)) => {
				timer = Some(runtime::sleep_ms(delay_ms).boxed_local());
			}
			Wake::Command(Command::Cancel) => timer = None,
			Wake::TimerFired => {
				timer = None;
				Inner::send_queued(&weak).await;
			}
			Wake::Closed => break,
		}
	}
}

impl Inner {
	fn read_records(&self, prefix: &str, suffix: &str) -> Vec<LogRecord> {
		let key = format!("{}{}", prefix, suffix);
		match self.storage.get_item(&key) {
			Ok(Some(s)) => decode_records(&s).unwrap_or_else(|e| {
				tracing::warn!(%key, error = %e, "failed to parse stored log records");
				Vec::new()
			}),
			Ok(None) => Vec::new(),
			Err(e) => {
				tracing::warn!(%key, error = %e, "failed to read stored log records");
				Vec::new()
			}
		}
	}

	fn write_records(&self, prefix: &str, suffix: &str, records: &[LogRecord]) {
		let key = format!("{}{}", prefix, suffix);
		let res = encode_records(records)
			.map_err(Error::from)
			.and_then(|s| self.storage.set_item(&key, &s));
		if let Err(e) = res {
			tracing::error!(%key, error = %e, "failed to store log records");
		}
	}

	/// Appends `records` to the end of the queue.
	fn enqueue_records(&self, records: Vec<LogRecord>) {
		if records.is_empty() {
			return;
		}
		let mut queued = self.read_records(&self.prefix, QUEUED_KEY_SUFFIX);
		queued.extend(records);
		self.write_records(&self.prefix, QUEUED_KEY_SUFFIX, &queued);
	}

	/// Puts `records` back in front of whatever was queued meanwhile.
	fn requeue_records(&self, mut records: Vec<LogRecord>) {
		records.extend(self.read_records(&self.prefix, QUEUED_KEY_SUFFIX));
		self.write_records(&self.prefix, QUEUED_KEY_SUFFIX, &records);
	}

	fn update_last_active(&self, now: i64) {
		let key = format!("{}{}", self.prefix, LAST_ACTIVE_KEY_SUFFIX);
		if let Err(e) = self.storage.set_item(&key, &now.to_string()) {
			tracing::warn!(%key, error = %e, "failed to store last-active time");
		}
	}

	fn is_send_scheduled(&self) -> bool {
		self.scheduled.get()
	}

	fn currently_sending(&self) -> bool {
		self.in_flight.get() || !self.read_records(&self.prefix, SENDING_KEY_SUFFIX).is_empty()
	}

	fn schedule_send(&self) {
		if self.is_send_scheduled() || self.currently_sending() {
			return;
		}
		if !self.network.is_online() {
			return;
		}
		if self.sink.borrow().is_none() {
			return;
		}
		if self.read_records(&self.prefix, QUEUED_KEY_SUFFIX).is_empty() {
			return;
		}

		let delay_ms = match self.last_send_time.get() {
			Some(last) => {
				let interval = i64::try_from(self.config.interval_ms).unwrap_or(i64::MAX);
				let elapsed = (self.clock)().saturating_sub(last);
				interval.saturating_sub(elapsed).max(0) as u64
			}
			None => 0,
		};

		self.scheduled.set(true);
		if let Err(e) = self.commands.unbounded_send(Command::Arm(delay_ms)) {
			self.scheduled.set(false);
			tracing::warn!(error = %e, "log shipper is not running, records stay queued");
		}
	}

	/// Sends everything queued and reschedules itself once the send settles.
	async fn send_queued(weak: &Weak<Self>) {
		let Some((sink, records, now)) = weak.upgrade().and_then(|inner| inner.begin_send())
		else {
			return;
		};

		let result = sink
			.send(LogBatch {
				records: records.clone(),
				now,
			})
			.await;

		// If the shipper went away mid-send, the records stay in the sending
		// state until another instance claims them.
		if let Some(inner) = weak.upgrade() {
			inner.finish_send(records, result);
		}
	}

	/// Moves queued records into the sending state and returns what to send.
	fn begin_send(&self) -> Option<(Rc<dyn LogSink>, Vec<LogRecord>, i64)> {
		self.scheduled.set(false);

		// These ought to be assertions, but this code runs in response to
		// errors and must not panic.
		if self.currently_sending() {
			tracing::error!(prefix = %self.prefix, "already sending log records");
			return None;
		}
		let Some(sink) = self.sink.borrow().clone() else {
			tracing::error!(prefix = %self.prefix, "no log sink");
			return None;
		};

		let now = (self.clock)();
		self.last_send_time.set(Some(now));
		self.update_last_active(now);

		// Periodically move stale instances' records into the queue.
		self.claim_abandoned_records();

		let records = self.read_records(&self.prefix, QUEUED_KEY_SUFFIX);
		if records.is_empty() {
			return None;
		}
		self.write_records(&self.prefix, SENDING_KEY_SUFFIX, &records);
		self.write_records(&self.prefix, QUEUED_KEY_SUFFIX, &[]);
		self.in_flight.set(true);

		Some((sink, records, now))
	}

	fn finish_send(&self, records: Vec<LogRecord>, result: Result<Value>) {
		match result {
			Ok(_) => tracing::debug!(count = records.len(), "sent log records"),
			Err(e) => {
				tracing::warn!(count = records.len(), error = %e, "failed sending log records");
				self.requeue_records(records);
			}
		}
		self.write_records(&self.prefix, SENDING_KEY_SUFFIX, &[]);
		self.in_flight.set(false);
		self.schedule_send();
	}

	/// Claims records left by other instances with the same name that have
	/// been idle for at least the stale threshold.
	fn claim_abandoned_records(&self) {
		let keys = match self.storage.keys() {
			Ok(keys) => keys,
			Err(e) => {
				tracing::warn!(error = %e, "failed to list storage keys");
				return;
			}
		};

		let name_prefix = format!("{}.", self.config.name);
		let last_active_suffix = format!(".{}", LAST_ACTIVE_KEY_SUFFIX);
		let threshold = i64::try_from(self.config.stale_threshold_ms()).unwrap_or(i64::MAX);
		let now = (self.clock)();

		for key in keys {
			let Some(id) = key
				.strip_prefix(&name_prefix)
				.and_then(|rest| rest.strip_suffix(&last_active_suffix))
			else {
				continue;
			};
			if id.is_empty() || id.contains('.') || key.starts_with(&self.prefix) {
				continue;
			}

			let last_active = match self.storage.get_item(&key) {
				Ok(value) => value.and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0),
				Err(e) => {
					tracing::warn!(%key, error = %e, "failed to read last-active time");
					continue;
				}
			};
			// Leave recently active instances alone.
			if last_active == 0 || now.saturating_sub(last_active) < threshold {
				continue;
			}

			let prefix = make_key_prefix(&self.config.name, id);
			let mut claimed = self.read_records(&prefix, SENDING_KEY_SUFFIX);
			let in_flight = claimed.len();
			claimed.extend(self.read_records(&prefix, QUEUED_KEY_SUFFIX));
			let queued = claimed.len() - in_flight;
			self.enqueue_records(claimed);

			for suffix in [SENDING_KEY_SUFFIX, QUEUED_KEY_SUFFIX, LAST_ACTIVE_KEY_SUFFIX] {
				let stale_key = format!("{}{}", prefix, suffix);
				if let Err(e) = self.storage.remove_item(&stale_key) {
					tracing::warn!(key = %stale_key, error = %e, "failed to remove abandoned key");
				}
			}

			if in_flight + queued > 0 {
				tracing::info!(
					%prefix,
					in_flight,
					queued,
					"claimed abandoned log records"
				);
			}
		}
	}
}

