//! Coordinator-level error types delivered to authorization and retry waiters.

// self
use crate::_prelude::*;

/// Coordinator-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Type-erased error produced by an authenticator's refresh call.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Borrowed form of the transport error handed to retry decisions.
pub type DynError = dyn StdError + Send + Sync + 'static;

/// Canonical coordinator error exposed to every waiter.
///
/// The type is `Clone` because a single refresh outcome fans out to every request that was
/// queued behind it.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// No credential was ever supplied, or it was cleared.
	#[error("No credential is available to authorize the request.")]
	MissingCredential,
	/// The refresh window rejected another refresh attempt.
	#[error("Credential refresh was attempted too many times within the refresh window.")]
	ExcessiveRefresh,
	/// The authenticator's refresh call failed.
	#[error("Credential refresh failed: {source}.")]
	RefreshFailed {
		/// Underlying authenticator failure, shared across waiters.
		#[source]
		source: Arc<DynError>,
	},
	/// The refresh task ended without producing an outcome (panic or runtime shutdown).
	#[error("Credential refresh was abandoned before it resolved.")]
	RefreshAbandoned,
}
impl Error {
	/// Wraps an authenticator failure inside [`Error::RefreshFailed`].
	pub fn refresh_failed(src: BoxError) -> Self {
		Self::RefreshFailed { source: Arc::from(src) }
	}

	/// Returns `true` when the error came out of a refresh attempt rather than a missing slot.
	pub fn is_refresh_error(&self) -> bool {
		matches!(self, Self::ExcessiveRefresh | Self::RefreshFailed { .. } | Self::RefreshAbandoned)
	}
}

/// Configuration and validation failures raised while building coordinator inputs.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// A refresh window must allow at least one attempt.
	#[error("Refresh window must allow at least one attempt.")]
	ZeroRefreshAttempts,
	/// A refresh window interval must be strictly positive.
	#[error("Refresh window interval must be positive.")]
	NonPositiveRefreshInterval,
}
