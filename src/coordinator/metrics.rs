// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, obs::Outcome};

/// Refresh counters shared by every clone of a coordinator, keyed by [`Outcome`].
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	counters: [AtomicU64; 4],
}
impl RefreshMetrics {
	/// Refreshes handed to the authenticator.
	pub fn attempts(&self) -> u64 {
		self.load(Outcome::Attempt)
	}

	/// Refreshes that produced a new credential.
	pub fn successes(&self) -> u64 {
		self.load(Outcome::Success)
	}

	/// Refreshes that failed or were abandoned.
	pub fn failures(&self) -> u64 {
		self.load(Outcome::Failure)
	}

	/// Refreshes the refresh window refused to start.
	pub fn rejections(&self) -> u64 {
		self.load(Outcome::Rejected)
	}

	/// Point-in-time copy of every counter.
	pub fn snapshot(&self) -> RefreshMetricsSnapshot {
		RefreshMetricsSnapshot {
			attempts: self.attempts(),
			successes: self.successes(),
			failures: self.failures(),
			rejections: self.rejections(),
		}
	}

	/// Refreshes still unresolved when the snapshot is taken.
	pub fn in_flight(&self) -> u64 {
		self.snapshot().in_flight()
	}

	pub(crate) fn record(&self, outcome: Outcome) {
		self.counters[Self::slot(outcome)].fetch_add(1, Ordering::Relaxed);
	}

	fn load(&self, outcome: Outcome) -> u64 {
		self.counters[Self::slot(outcome)].load(Ordering::Relaxed)
	}

	const fn slot(outcome: Outcome) -> usize {
		match outcome {
			Outcome::Attempt => 0,
			Outcome::Success => 1,
			Outcome::Failure => 2,
			Outcome::Rejected => 3,
		}
	}
}

/// Serializable copy of [`RefreshMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshMetricsSnapshot {
	/// Refreshes handed to the authenticator.
	pub attempts: u64,
	/// Refreshes that produced a new credential.
	pub successes: u64,
	/// Refreshes that failed or were abandoned.
	pub failures: u64,
	/// Refreshes the refresh window refused to start.
	pub rejections: u64,
}
impl RefreshMetricsSnapshot {
	/// Attempts that have not yet resolved either way.
	pub fn in_flight(&self) -> u64 {
		self.attempts.saturating_sub(self.successes + self.failures)
	}
}
