// self
use crate::_prelude::*;

/// Outcome of [`AuthCoordinator::should_retry`](crate::coordinator::AuthCoordinator::should_retry).
#[derive(Clone, Debug)]
pub enum RetryDecision {
	/// Surface the original failure.
	DoNotRetry,
	/// Retry now; the request will be re-signed with the current credential.
	Retry,
	/// Retry after the provided delay.
	RetryWithDelay(Duration),
	/// Surface the provided error instead of the original failure.
	DoNotRetryWithError(Error),
}
impl RetryDecision {
	/// Returns `true` for [`RetryDecision::Retry`] and [`RetryDecision::RetryWithDelay`].
	pub fn is_retry(&self) -> bool {
		matches!(self, Self::Retry | Self::RetryWithDelay(_))
	}

	/// Delay to wait before retrying, if any.
	pub fn delay(&self) -> Option<Duration> {
		match self {
			Self::Retry => Some(Duration::ZERO),
			Self::RetryWithDelay(delay) => Some(*delay),
			Self::DoNotRetry | Self::DoNotRetryWithError(_) => None,
		}
	}

	/// Replacement error carried by [`RetryDecision::DoNotRetryWithError`].
	pub fn error(&self) -> Option<&Error> {
		match self {
			Self::DoNotRetryWithError(err) => Some(err),
			_ => None,
		}
	}
}
