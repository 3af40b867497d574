//! Refresh-rate guard that rejects refresh churn inside a sliding window.

// self
use crate::{_prelude::*, error::ConfigError};

/// Sliding-window policy bounding how many refreshes may start per interval.
///
/// The window is stateless; the coordinator keeps the attempt history and asks the window to
/// evaluate it against the current instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RefreshWindowRepr", into = "RefreshWindowRepr")]
pub struct RefreshWindow {
	interval: Duration,
	max_attempts: u32,
}
impl RefreshWindow {
	/// Interval used by [`RefreshWindow::default`].
	pub const DEFAULT_INTERVAL: Duration = Duration::seconds(30);
	/// Attempt budget used by [`RefreshWindow::default`].
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

	/// Creates a window after validating that it admits at least one attempt.
	pub fn new(interval: Duration, max_attempts: u32) -> Result<Self, ConfigError> {
		if max_attempts == 0 {
			return Err(ConfigError::ZeroRefreshAttempts);
		}
		if !interval.is_positive() {
			return Err(ConfigError::NonPositiveRefreshInterval);
		}

		Ok(Self { interval, max_attempts })
	}

	/// Length of the sliding window.
	pub fn interval(&self) -> Duration {
		self.interval
	}

	/// Maximum refreshes allowed to start inside one window.
	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	/// Counts the attempts in `history` that fall within `[now - interval, now]`.
	pub fn attempts_within(&self, history: &[OffsetDateTime], now: OffsetDateTime) -> usize {
		let floor = now.checked_sub(self.interval);

		history
			.iter()
			.filter(|attempt| **attempt <= now && floor.is_none_or(|floor| **attempt >= floor))
			.count()
	}

	/// Returns `true` when starting another refresh at `now` would exceed the budget.
	pub fn is_exceeded(&self, history: &[OffsetDateTime], now: OffsetDateTime) -> bool {
		self.attempts_within(history, now) >= self.max_attempts as usize
	}
}
impl Default for RefreshWindow {
	fn default() -> Self {
		Self { interval: Self::DEFAULT_INTERVAL, max_attempts: Self::DEFAULT_MAX_ATTEMPTS }
	}
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct RefreshWindowRepr {
	interval_ms: u64,
	max_attempts: u32,
}
impl From<RefreshWindow> for RefreshWindowRepr {
	fn from(value: RefreshWindow) -> Self {
		Self {
			interval_ms: u64::try_from(value.interval.whole_milliseconds()).unwrap_or(u64::MAX),
			max_attempts: value.max_attempts,
		}
	}
}
impl TryFrom<RefreshWindowRepr> for RefreshWindow {
	type Error = ConfigError;

	fn try_from(value: RefreshWindowRepr) -> Result<Self, Self::Error> {
		let millis = i64::try_from(value.interval_ms).unwrap_or(i64::MAX);

		Self::new(Duration::milliseconds(millis), value.max_attempts)
	}
}
