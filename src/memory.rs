use crate::{Result, Storage};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An in-process key-value store.
///
/// Clones share the same contents, so several shippers handed clones of one
/// `MemoryStorage` behave like browser tabs sharing one `localStorage`.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
	items: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Removes every key.
	pub fn clear(&self) {
		self.lock().clear();
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
		self.items.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl Storage for MemoryStorage {
	fn get_item(&self, key: &str) -> Result<Option<String>> {
		Ok(self.lock().get(key).cloned())
	}

	fn set_item(&self, key: &str, value: &str) -> Result<()> {
		self.lock().insert(key.to_owned(), value.to_owned());
		Ok(())
	}

	fn remove_item(&self, key: &str) -> Result<()> {
		self.lock().remove(key);
		Ok(())
	}

	fn keys(&self) -> Result<Vec<String>> {
		Ok(self.lock().keys().cloned().collect())
	}
}
