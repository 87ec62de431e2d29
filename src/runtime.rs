// Task spawning and timers for the current target.
//
// Native builds run on tokio, and spawned tasks need a `tokio::task::LocalSet`
// to be polled; wasm builds run on the browser event loop.

use crate::Result;
use std::future::Future;

/// Spawns `future` on the current thread.
///
/// # Panics
///
/// On native targets, panics when called inside a tokio runtime but outside a
/// `LocalSet`. Without any runtime it returns an error instead.
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn spawn_local<F>(future: F) -> Result<()>
where
	F: Future<Output = ()> + 'static,
{
	if let Err(e) = tokio::runtime::Handle::try_current() {
		return Err(crate::Error::Runtime(e.to_string()));
	}
	drop(tokio::task::spawn_local(future));
	Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) async fn sleep_ms(ms: u64) {
	tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn spawn_local<F>(future: F) -> Result<()>
where
	F: Future<Output = ()> + 'static,
{
	wasm_bindgen_futures::spawn_local(future);
	Ok(())
}

#[cfg(target_arch = "wasm32")]
pub(crate) async fn sleep_ms(ms: u64) {
	let ms = u32::try_from(ms).unwrap_or(u32::MAX);
	gloo_timers::future::TimeoutFuture::new(ms).await;
}
