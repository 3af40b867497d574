//! Mutex-guarded coordinator record and its pure transitions.
//!
//! Every transition here runs with the coordinator lock held and only computes what should
//! happen next; the coordinator performs the returned side effects after releasing the lock.

// std
use std::mem;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::Authenticator,
	coordinator::{RefreshWindow, RetryDecision},
};

/// Reply channel for a queued retry decision.
pub(crate) type RetryReply = oneshot::Sender<RetryDecision>;

/// Authorization waiting for a refresh to resolve.
pub(crate) struct PendingAuthorization<A>
where
	A: Authenticator,
{
	pub(crate) request: A::Request,
	pub(crate) session: A::Session,
	pub(crate) reply: oneshot::Sender<Result<A::Request>>,
}

/// Waiters removed from the record in one atomic step.
pub(crate) struct Drained<A>
where
	A: Authenticator,
{
	pub(crate) authorizations: Vec<PendingAuthorization<A>>,
	pub(crate) retries: Vec<RetryReply>,
}
impl<A> Drained<A>
where
	A: Authenticator,
{
	pub(crate) fn len(&self) -> usize {
		self.authorizations.len() + self.retries.len()
	}
}

/// What to do after asking the record to begin a refresh.
pub(crate) enum RefreshStep<A>
where
	A: Authenticator,
{
	/// Spawn the authenticator's refresh with these inputs.
	Start { credential: A::Credential, session: A::Session },
	/// The refresh window refused; fail every drained waiter with `ExcessiveRefresh`.
	Reject { drained: Drained<A>, attempts: usize, max_attempts: u32 },
}

pub(crate) struct CoordinatorState<A>
where
	A: Authenticator,
{
	pub(crate) credential: Option<A::Credential>,
	/// Bumped every time `credential` is replaced.
	pub(crate) credential_generation: u64,
	pub(crate) is_refreshing: bool,
	pub(crate) refresh_timestamps: Vec<OffsetDateTime>,
	pub(crate) refresh_window: Option<RefreshWindow>,
	pub(crate) pending_authorizations: Vec<PendingAuthorization<A>>,
	pub(crate) pending_retry_decisions: Vec<RetryReply>,
}
impl<A> CoordinatorState<A>
where
	A: Authenticator,
{
	pub(crate) fn new(credential: Option<A::Credential>) -> Self {
		Self {
			credential,
			credential_generation: 0,
			is_refreshing: false,
			refresh_timestamps: Vec::new(),
			refresh_window: Some(RefreshWindow::default()),
			pending_authorizations: Vec::new(),
			pending_retry_decisions: Vec::new(),
		}
	}

	/// Installs `credential` and bumps the generation.
	pub(crate) fn replace_credential(&mut self, credential: Option<A::Credential>) {
		self.credential = credential;
		self.credential_generation = self.credential_generation.wrapping_add(1);
	}

	/// Takes both queues together, preserving arrival order.
	pub(crate) fn drain(&mut self) -> Drained<A> {
		Drained {
			authorizations: mem::take(&mut self.pending_authorizations),
			retries: mem::take(&mut self.pending_retry_decisions),
		}
	}

	/// Starts a refresh unless the refresh window is exhausted.
	///
	/// Callers must have checked that no refresh is running and must already have queued the
	/// waiter that triggered the refresh.
	pub(crate) fn begin_refresh(
		&mut self,
		credential: A::Credential,
		session: A::Session,
		now: OffsetDateTime,
	) -> RefreshStep<A> {
		debug_assert!(!self.is_refreshing, "a refresh is already in flight");

		let exhausted = self
			.refresh_window
			.filter(|window| window.is_exceeded(&self.refresh_timestamps, now));

		if let Some(window) = exhausted {
			let attempts = window.attempts_within(&self.refresh_timestamps, now);

			return RefreshStep::Reject {
				drained: self.drain(),
				attempts,
				max_attempts: window.max_attempts(),
			};
		}

		self.refresh_timestamps.push(now);
		self.is_refreshing = true;

		RefreshStep::Start { credential, session }
	}

	/// Ends the in-flight refresh, installing `refreshed` when it succeeded.
	pub(crate) fn resolve(&mut self, refreshed: Option<A::Credential>) -> Drained<A> {
		self.is_refreshing = false;

		if let Some(credential) = refreshed {
			self.replace_credential(Some(credential));
		}

		self.drain()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::_preludet::*;

	fn queued(state: &mut CoordinatorState<MockAuthenticator>, id: &str) {
		let (reply, _answer) = oneshot::channel();

		state.pending_authorizations.push(PendingAuthorization {
			request: MockRequest::new(id),
			session: (),
			reply,
		});
	}

	#[test]
	fn begin_refresh_records_the_attempt_and_flags_the_record() {
		let mut state = CoordinatorState::<MockAuthenticator>::new(Some(MockCredential::stale("a")));
		let now = macros::datetime!(2025-01-01 00:00 UTC);

		queued(&mut state, "r1");

		let step = state.begin_refresh(MockCredential::stale("a"), (), now);

		assert!(matches!(step, RefreshStep::Start { .. }));
		assert!(state.is_refreshing);
		assert_eq!(state.refresh_timestamps, vec![now]);
		assert_eq!(state.pending_authorizations.len(), 1);
	}

	#[test]
	fn exhausted_window_drains_without_flagging() {
		let mut state = CoordinatorState::<MockAuthenticator>::new(Some(MockCredential::stale("a")));
		let now = macros::datetime!(2025-01-01 00:00 UTC);

		state.refresh_window =
			Some(RefreshWindow::new(Duration::seconds(30), 1).expect("Window fixture should be valid."));
		state.refresh_timestamps.push(now - Duration::seconds(1));
		queued(&mut state, "r1");
		state.pending_retry_decisions.push(oneshot::channel().0);

		let RefreshStep::Reject { drained, attempts, max_attempts } =
			state.begin_refresh(MockCredential::stale("a"), (), now)
		else {
			panic!("An exhausted window should reject the refresh.");
		};

		assert_eq!(drained.len(), 2);
		assert_eq!((attempts, max_attempts), (1, 1));
		assert!(!state.is_refreshing);
		assert_eq!(state.refresh_timestamps.len(), 1);
		assert!(state.pending_authorizations.is_empty());
		assert!(state.pending_retry_decisions.is_empty());
	}

	#[test]
	fn resolve_keeps_the_credential_on_failure() {
		let mut state = CoordinatorState::<MockAuthenticator>::new(Some(MockCredential::stale("old")));

		state.is_refreshing = true;
		queued(&mut state, "r1");
		queued(&mut state, "r2");

		let drained = state.resolve(None);

		assert_eq!(drained.authorizations.len(), 2);
		assert_eq!(drained.authorizations[0].request.id, "r1");
		assert!(!state.is_refreshing);
		assert_eq!(state.credential.as_ref().map(|c| c.token.as_str()), Some("old"));

		state.is_refreshing = true;

		let drained = state.resolve(Some(MockCredential::fresh("new")));

		assert_eq!(drained.len(), 0);
		assert_eq!(state.credential.as_ref().map(|c| c.token.as_str()), Some("new"));
	}

	#[test]
	fn only_successful_resolutions_bump_the_generation() {
		let mut state = CoordinatorState::<MockAuthenticator>::new(Some(MockCredential::stale("old")));

		state.is_refreshing = true;
		state.resolve(None);

		assert_eq!(state.credential_generation, 0);

		state.is_refreshing = true;
		state.resolve(Some(MockCredential::fresh("new")));

		assert_eq!(state.credential_generation, 1);

		state.replace_credential(None);

		assert_eq!(state.credential_generation, 2);
		assert!(state.credential.is_none());
	}

	#[test]
	fn disabled_window_never_rejects() {
		let mut state = CoordinatorState::<MockAuthenticator>::new(Some(MockCredential::stale("a")));
		let now = macros::datetime!(2025-01-01 00:00 UTC);

		state.refresh_window = None;

		for _ in 0..50 {
			assert!(matches!(
				state.begin_refresh(MockCredential::stale("a"), (), now),
				RefreshStep::Start { .. }
			));

			state.resolve(None);
		}

		assert_eq!(state.refresh_timestamps.len(), 50);
	}
}
