// self
use crate::{_prelude::*, obs::Operation};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used by coordinator operations.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Creates a new span tagged with the provided operation + stage.
	pub fn new(op: Operation, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("auth_coordinator.op", op = op.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (op, stage);

			Self {}
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> OperationSpanGuard {
		#[cfg(feature = "tracing")]
		{
			OperationSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			OperationSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`OperationSpan::entered`].
pub struct OperationSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for OperationSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("OperationSpanGuard(..)")
	}
}

/// Emits a warning when the refresh window refuses a refresh.
pub(crate) fn warn_refresh_rejected(attempts: usize, max_attempts: u32) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(attempts, max_attempts, "refresh window exhausted, failing waiters");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempts, max_attempts);
	}
}

/// Emits a debug event once a refresh resolves and its waiters are about to be released.
pub(crate) fn debug_refresh_resolved(succeeded: bool, waiters: usize) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(succeeded, waiters, "refresh resolved");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (succeeded, waiters);
	}
}

/// Emits an error event for a registry contract violation right before it panics.
pub(crate) fn error_registry_violation(violation: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::error!(%violation, "request/task registry contract violated");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = violation;
	}
}
