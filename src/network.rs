use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Callback invoked when connectivity comes back.
pub type OnlineCallback = Rc<dyn Fn()>;

/// Reports connectivity and notifies when it is restored.
pub trait NetworkStatus {
	/// Returns the current connectivity state.
	fn is_online(&self) -> bool;

	/// Registers `callback` to run whenever the network goes from offline to
	/// online. The registration lasts until the returned [`Subscription`] is
	/// cancelled or dropped.
	fn on_online(&self, callback: OnlineCallback) -> Subscription;
}

/// Handle to a registered [`NetworkStatus`] callback.
pub struct Subscription {
	unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
	pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
		Self {
			unsubscribe: Some(Box::new(unsubscribe)),
		}
	}

	/// A subscription with nothing to undo.
	pub fn noop() -> Self {
		Self { unsubscribe: None }
	}

	pub fn cancel(mut self) {
		self.run();
	}

	fn run(&mut self) {
		if let Some(unsubscribe) = self.unsubscribe.take() {
			unsubscribe();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.run();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("active", &self.unsubscribe.is_some())
			.finish()
	}
}

/// A network that is never offline.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysOnline;

impl NetworkStatus for AlwaysOnline {
	fn is_online(&self) -> bool {
		true
	}

	fn on_online(&self, _callback: OnlineCallback) -> Subscription {
		Subscription::noop()
	}
}

#[derive(Default)]
struct FlagState {
	online: bool,
	next_id: u64,
	listeners: Vec<(u64, OnlineCallback)>,
}

/// A connectivity flag driven by the host.
///
/// Clones share state. Useful on native hosts that learn about connectivity
/// from their own transport, and in tests.
#[derive(Clone)]
pub struct NetworkFlag {
	state: Rc<RefCell<FlagState>>,
}

impl NetworkFlag {
	pub fn new(online: bool) -> Self {
		Self {
			state: Rc::new(RefCell::new(FlagState {
				online,
				..FlagState::default()
			})),
		}
	}

	/// Updates the flag. Going from offline to online runs every registered
	/// callback.
	pub fn set_online(&self, online: bool) {
		let listeners: Vec<OnlineCallback> = {
			let mut state = self.state.borrow_mut();
			let came_online = online && !state.online;
			state.online = online;
			if !came_online {
				return;
			}
			state.listeners.iter().map(|(_, cb)| cb.clone()).collect()
		};
		for listener in listeners {
			listener();
		}
	}

	pub fn listener_count(&self) -> usize {
		self.state.borrow().listeners.len()
	}
}

impl Default for NetworkFlag {
	fn default() -> Self {
		Self::new(true)
	}
}

impl fmt::Debug for NetworkFlag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.borrow();
		f.debug_struct("NetworkFlag")
			.field("online", &state.online)
			.field("listeners", &state.listeners.len())
			.finish()
	}
}

impl NetworkStatus for NetworkFlag {
	fn is_online(&self) -> bool {
		self.state.borrow().online
	}

	fn on_online(&self, callback: OnlineCallback) -> Subscription {
		let id = {
			let mut state = self.state.borrow_mut();
			let id = state.next_id;
			state.next_id += 1;
			state.listeners.push((id, callback));
			id
		};
		let state = Rc::downgrade(&self.state);
		Subscription::new(move || {
			if let Some(state) = state.upgrade() {
				state.borrow_mut().listeners.retain(|(i, _)| *i != id);
			}
		})
	}
}
