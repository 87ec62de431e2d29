use crate::{LogBatch, Result};
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;
use std::future::Future;
use std::rc::Rc;

/// Delivers a batch of records to the remote logging endpoint.
///
/// The returned future resolves to an opaque response on success. A
/// [`LogShipper`](crate::LogShipper) never calls `send` again before the
/// previous future has completed.
pub trait LogSink {
	fn send(&self, batch: LogBatch) -> LocalBoxFuture<'static, Result<Value>>;
}

impl<F, Fut> LogSink for F
where
	F: Fn(LogBatch) -> Fut,
	Fut: Future<Output = Result<Value>> + 'static,
{
	fn send(&self, batch: LogBatch) -> LocalBoxFuture<'static, Result<Value>> {
		self(batch).boxed_local()
	}
}

/// A sink that is either available now or will be once a future resolves.
///
/// Deferred sinks cover endpoints that depend on code loaded later. Records
/// logged in the meantime are stored and sent once the sink arrives.
pub enum SinkSource {
	Ready(Rc<dyn LogSink>),
	Deferred(LocalBoxFuture<'static, Result<Rc<dyn LogSink>>>),
}

impl SinkSource {
	pub fn ready(sink: impl LogSink + 'static) -> Self {
		SinkSource::Ready(Rc::new(sink))
	}

	pub fn deferred<Fut, S>(future: Fut) -> Self
	where
		Fut: Future<Output = Result<S>> + 'static,
		S: LogSink + 'static,
	{
		SinkSource::Deferred(
			future
				.map(|res| res.map(|sink| Rc::new(sink) as Rc<dyn LogSink>))
				.boxed_local(),
		)
	}
}

/// Writes every record as a `tracing` event and reports success.
///
/// Handy during development, where records should show up locally right away.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
	fn send(&self, batch: LogBatch) -> LocalBoxFuture<'static, Result<Value>> {
		for rec in &batch.records {
			let payload = Value::Object(rec.payload.clone());
			tracing::info!(
				target: "logshipper::records",
				time = rec.time,
				severity = %rec.severity,
				code = %rec.code,
				%payload,
				"log record"
			);
		}
		futures::future::ready(Ok(Value::Null)).boxed_local()
	}
}

/// Drops every batch and reports success.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardSink;

impl LogSink for DiscardSink {
	fn send(&self, _batch: LogBatch) -> LocalBoxFuture<'static, Result<Value>> {
		futures::future::ready(Ok(Value::Null)).boxed_local()
	}
}
