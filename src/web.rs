//! Browser collaborators for [`LogShipper`](crate::LogShipper)
//!
//! - [`LocalStorage`] persists queues in `window.localStorage`, which every tab
//!   of the same origin shares.
//! - [`BrowserNetwork`] reads `navigator.onLine` and listens for the window's
//!   `online` event.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  tab A: LogShipper ──► "log.<idA>.queued" ─┐         │
//! │                                            ├─► localStorage
//! │  tab B: LogShipper ──► "log.<idB>.queued" ─┘         │
//! │                                                      │
//! │  tab A closed: tab B claims "log.<idA>.*" once stale │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::network::{NetworkStatus, OnlineCallback, Subscription};
use crate::{Error, Result, Storage};
use wasm_bindgen::prelude::*;

const ONLINE_EVENT: &str = "online";

fn js_error(context: &str, e: JsValue) -> Error {
	Error::Storage(format!("{}: {:?}", context, e))
}

fn window() -> Result<web_sys::Window> {
	web_sys::window().ok_or_else(|| Error::Storage("No window object".into()))
}

/// `window.localStorage` as a [`Storage`] backend.
///
/// Writes can fail when the origin's quota is exhausted; the shipper logs
/// those failures and keeps the records it still holds in memory for the
/// current send.
#[derive(Clone, Debug)]
pub struct LocalStorage {
	storage: web_sys::Storage,
}

impl LocalStorage {
	/// Opens the window's local storage.
	///
	/// Fails when there is no window (e.g. in a worker) or when storage is
	/// blocked, as happens in some third-party contexts.
	pub fn new() -> Result<Self> {
		let storage = window()?
			.local_storage()
			.map_err(|e| js_error("localStorage error", e))?
			.ok_or_else(|| Error::Storage("localStorage not available".into()))?;
		Ok(Self { storage })
	}

	/// Removes every key of the origin, not only the shipper's.
	pub fn clear(&self) -> Result<()> {
		self.storage
			.clear()
			.map_err(|e| js_error("Clear error", e))
	}
}

impl Storage for LocalStorage {
	fn get_item(&self, key: &str) -> Result<Option<String>> {
		self.storage
			.get_item(key)
			.map_err(|e| js_error("Get error", e))
	}

	fn set_item(&self, key: &str, value: &str) -> Result<()> {
		self.storage
			.set_item(key, value)
			.map_err(|e| js_error("Set error", e))
	}

	fn remove_item(&self, key: &str) -> Result<()> {
		self.storage
			.remove_item(key)
			.map_err(|e| js_error("Remove error", e))
	}

	fn keys(&self) -> Result<Vec<String>> {
		let len = self
			.storage
			.length()
			.map_err(|e| js_error("Length error", e))?;
		let mut keys = Vec::with_capacity(len as usize);
		for i in 0..len {
			if let Some(key) = self.storage.key(i).map_err(|e| js_error("Key error", e))? {
				keys.push(key);
			}
		}
		Ok(keys)
	}
}

/// Connectivity as reported by the browser.
#[derive(Clone, Debug)]
pub struct BrowserNetwork {
	window: web_sys::Window,
}

impl BrowserNetwork {
	pub fn new() -> Result<Self> {
		Ok(Self { window: window()? })
	}
}

impl NetworkStatus for BrowserNetwork {
	fn is_online(&self) -> bool {
		self.window.navigator().on_line()
	}

	fn on_online(&self, callback: OnlineCallback) -> Subscription {
		let closure = Closure::<dyn FnMut()>::new(move || callback());
		if let Err(e) = self
			.window
			.add_event_listener_with_callback(ONLINE_EVENT, closure.as_ref().unchecked_ref())
		{
			tracing::warn!(error = ?e, "failed to listen for online events");
			return Subscription::noop();
		}

		let window = self.window.clone();
		Subscription::new(move || {
			if let Err(e) = window
				.remove_event_listener_with_callback(ONLINE_EVENT, closure.as_ref().unchecked_ref())
			{
				tracing::warn!(error = ?e, "failed to stop listening for online events");
			}
		})
	}
}
