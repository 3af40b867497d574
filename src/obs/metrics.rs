// self
use crate::obs::{Operation, Outcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_outcome(op: Operation, outcome: Outcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"auth_coordinator_operation_total",
			"op" => op.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (op, outcome);
	}
}

/// Records how many waiters one refresh released, successful or not.
pub fn record_waiters_released(waiters: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("auth_coordinator_refresh_waiters").record(waiters as f64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = waiters;
	}
}
