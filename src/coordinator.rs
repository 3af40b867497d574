//! Credential-gated authorization with singleflight refresh and fan-out to every waiter.
//!
//! [`AuthCoordinator::authorize`] decides, for each outgoing request, whether it can be signed
//! right away, must wait for a refresh, or must fail. [`AuthCoordinator::should_retry`] decides
//! whether a request that failed authentication should be retried. Both entry points funnel
//! into a single `is_refreshing` gate, so concurrent triggers never start two refreshes. All
//! waiters are queued in arrival order and released together once the refresh resolves:
//! queued authorizations are re-evaluated against the new credential and queued retries are
//! answered with [`RetryDecision::Retry`], or every waiter receives the refresh error.
//!
//! State changes happen under one lock per call. Replies and the authenticator's refresh are
//! always dispatched after the lock is released, and the refresh itself runs on a dedicated
//! Tokio task, so reentrant calls from a reply or a synchronous authenticator cannot deadlock.
//! No authenticator method runs while the lock is held. A refresh task dropped before it
//! finishes, as happens on runtime shutdown, still releases its waiters with
//! [`Error::RefreshAbandoned`]. The coordinator must be driven from inside a Tokio runtime.

mod decision;
mod metrics;
mod state;
mod window;

pub use decision::RetryDecision;
pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};
pub use window::RefreshWindow;

// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{Authenticator, Credential, Exchange},
	error::DynError,
	obs::{self, Operation, OperationSpan, Outcome},
};
use state::{CoordinatorState, Drained, PendingAuthorization, RefreshStep};

/// Signs requests with a shared credential and coordinates its refresh.
///
/// Clones share the same credential slot, queues, and metrics.
pub struct AuthCoordinator<A>
where
	A: Authenticator,
{
	shared: Arc<Shared<A>>,
}
impl<A> AuthCoordinator<A>
where
	A: Authenticator,
{
	/// Creates a coordinator holding `credential`, guarded by [`RefreshWindow::default`].
	pub fn new(authenticator: impl Into<Arc<A>>, credential: Option<A::Credential>) -> Self {
		Self {
			shared: Arc::new(Shared {
				authenticator: authenticator.into(),
				state: Mutex::new(CoordinatorState::new(credential)),
				metrics: Default::default(),
			}),
		}
	}

	/// Replaces the refresh window; `None` disables refresh rate limiting.
	pub fn with_refresh_window(self, window: Option<RefreshWindow>) -> Self {
		self.shared.state.lock().refresh_window = window;

		self
	}

	/// Authenticator driven by this coordinator.
	pub fn authenticator(&self) -> &A {
		&self.shared.authenticator
	}

	/// Snapshot of the held credential.
	pub fn credential(&self) -> Option<A::Credential> {
		self.shared.state.lock().credential.clone()
	}

	/// Replaces the held credential without touching queued waiters.
	pub fn set_credential(&self, credential: Option<A::Credential>) {
		self.shared.state.lock().replace_credential(credential);
	}

	/// Returns `true` while a refresh is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.shared.state.lock().is_refreshing
	}

	/// Instants at which refreshes were started, oldest first.
	pub fn refresh_history(&self) -> Vec<OffsetDateTime> {
		self.shared.state.lock().refresh_timestamps.clone()
	}

	/// Refresh counters shared by every clone of this coordinator.
	pub fn metrics(&self) -> Arc<RefreshMetrics> {
		self.shared.metrics.clone()
	}

	/// Signs `request` with the current credential, waiting for a refresh when one is needed.
	///
	/// Fails with [`Error::MissingCredential`] when no credential is held, or with the refresh
	/// error when the refresh this call waited on failed.
	pub async fn authorize(&self, request: A::Request, session: &A::Session) -> Result<A::Request> {
		const OP: Operation = Operation::Authorize;

		let span = OperationSpan::new(OP, "authorize");

		obs::record_outcome(OP, Outcome::Attempt);

		let result = span
			.instrument(async move {
				let (reply, answer) = oneshot::channel();

				self.dispatch_authorization(PendingAuthorization {
					request,
					session: session.clone(),
					reply,
				});

				answer.await.unwrap_or(Err(Error::RefreshAbandoned))
			})
			.await;

		match &result {
			Ok(_) => obs::record_outcome(OP, Outcome::Success),
			Err(_) => obs::record_outcome(OP, Outcome::Failure),
		}

		result
	}

	/// Decides whether a failed request should be retried.
	///
	/// Requests that were never answered, or that failed for reasons the authenticator does not
	/// attribute to authentication, are not retried. Requests signed with a credential that has
	/// since been replaced are retried immediately. Otherwise the held credential is stale:
	/// the decision waits for a refresh (starting one if needed) and resolves to
	/// [`RetryDecision::Retry`] or to the refresh error.
	pub async fn should_retry<X>(
		&self,
		exchange: &X,
		session: &A::Session,
		cause: &DynError,
	) -> RetryDecision
	where
		X: ?Sized + Sync + Exchange<Request = A::Request, Response = A::Response>,
	{
		const OP: Operation = Operation::Retry;

		let span = OperationSpan::new(OP, "should_retry");

		obs::record_outcome(OP, Outcome::Attempt);

		let decision = span
			.instrument(async move {
				match self.enqueue_retry(exchange, session, cause) {
					Ok(answer) => answer
						.await
						.unwrap_or(RetryDecision::DoNotRetryWithError(Error::RefreshAbandoned)),
					Err(decision) => decision,
				}
			})
			.await;

		if decision.is_retry() {
			obs::record_outcome(OP, Outcome::Success);
		} else {
			obs::record_outcome(OP, Outcome::Failure);
		}

		decision
	}

	fn dispatch_authorization(&self, entry: PendingAuthorization<A>) {
		let step = {
			let mut state = self.shared.state.lock();

			if state.is_refreshing {
				state.pending_authorizations.push(entry);

				return;
			}

			match state.credential.clone() {
				None => AuthorizeStep::Fail(entry, Error::MissingCredential),
				Some(credential) if credential.requires_refresh() => {
					let session = entry.session.clone();

					state.pending_authorizations.push(entry);

					AuthorizeStep::Refresh(state.begin_refresh(
						credential,
						session,
						OffsetDateTime::now_utc(),
					))
				},
				Some(credential) => AuthorizeStep::Sign(credential, entry),
			}
		};

		match step {
			AuthorizeStep::Fail(entry, err) => {
				let _ = entry.reply.send(Err(err));
			},
			AuthorizeStep::Sign(credential, entry) => {
				let PendingAuthorization { mut request, reply, .. } = entry;

				self.shared.authenticator.apply(&credential, &mut request);

				let _ = reply.send(Ok(request));
			},
			AuthorizeStep::Refresh(step) => self.run_refresh_step(step),
		}
	}

	/// Returns either a receiver for a queued decision or an immediate decision.
	fn enqueue_retry<X>(
		&self,
		exchange: &X,
		session: &A::Session,
		cause: &DynError,
	) -> Result<oneshot::Receiver<RetryDecision>, RetryDecision>
	where
		X: ?Sized + Exchange<Request = A::Request, Response = A::Response>,
	{
		let (Some(request), Some(response)) = (exchange.request(), exchange.response()) else {
			return Err(RetryDecision::DoNotRetry);
		};
		let authenticator = &self.shared.authenticator;

		if !authenticator.did_request_fail_due_to_authentication(request, response, cause) {
			return Err(RetryDecision::DoNotRetry);
		}

		let (credential, generation) = {
			let state = self.shared.state.lock();
			let Some(credential) = state.credential.clone() else {
				return Err(RetryDecision::DoNotRetryWithError(Error::MissingCredential));
			};

			(credential, state.credential_generation)
		};

		if !authenticator.is_request_authenticated_with(request, &credential) {
			return Err(RetryDecision::Retry);
		}

		let (reply, answer) = oneshot::channel();
		let step = {
			let mut state = self.shared.state.lock();

			if state.credential.is_none() {
				return Err(RetryDecision::DoNotRetryWithError(Error::MissingCredential));
			}
			// Replaced while the signature was checked, so the request now carries an older one.
			if state.credential_generation != generation {
				return Err(RetryDecision::Retry);
			}

			state.pending_retry_decisions.push(reply);

			if state.is_refreshing {
				None
			} else {
				Some(state.begin_refresh(credential, session.clone(), OffsetDateTime::now_utc()))
			}
		};

		if let Some(step) = step {
			self.run_refresh_step(step);
		}

		Ok(answer)
	}

	fn run_refresh_step(&self, step: RefreshStep<A>) {
		match step {
			RefreshStep::Start { credential, session } => self.spawn_refresh(credential, session),
			RefreshStep::Reject { drained, attempts, max_attempts } => {
				obs::warn_refresh_rejected(attempts, max_attempts);
				self.note_refresh(Outcome::Rejected);
				Self::fail_waiters(drained, Error::ExcessiveRefresh);
			},
		}
	}

	fn spawn_refresh(&self, credential: A::Credential, session: A::Session) {
		let authenticator = self.shared.authenticator.clone();
		let guard = RefreshGuard::new(self.clone());

		self.note_refresh(Outcome::Attempt);

		tokio::spawn(async move {
			// A panicking authenticator must still release every waiter.
			let refreshed =
				tokio::spawn(async move { authenticator.refresh(&credential, &session).await })
					.await;
			let outcome = match refreshed {
				Ok(Ok(credential)) => Ok(credential),
				Ok(Err(err)) => Err(Error::refresh_failed(err)),
				Err(_) => Err(Error::RefreshAbandoned),
			};

			guard.finish(outcome);
		});
	}

	fn finish_refresh(&self, outcome: Result<A::Credential>) {
		let _span = OperationSpan::new(Operation::Refresh, "finish_refresh").entered();
		let drained = self.shared.state.lock().resolve(outcome.as_ref().ok().cloned());

		obs::debug_refresh_resolved(outcome.is_ok(), drained.len());
		obs::record_waiters_released(drained.len());

		match outcome {
			Ok(_) => {
				self.note_refresh(Outcome::Success);

				let Drained { authorizations, retries } = drained;

				for entry in authorizations {
					self.dispatch_authorization(entry);
				}
				for reply in retries {
					let _ = reply.send(RetryDecision::Retry);
				}
			},
			Err(err) => {
				self.note_refresh(Outcome::Failure);
				Self::fail_waiters(drained, err);
			},
		}
	}

	fn note_refresh(&self, outcome: Outcome) {
		obs::record_outcome(Operation::Refresh, outcome);
		self.shared.metrics.record(outcome);
	}

	fn fail_waiters(drained: Drained<A>, err: Error) {
		for entry in drained.authorizations {
			let _ = entry.reply.send(Err(err.clone()));
		}
		for reply in drained.retries {
			let _ = reply.send(RetryDecision::DoNotRetryWithError(err.clone()));
		}
	}
}
impl<A> Clone for AuthCoordinator<A>
where
	A: Authenticator,
{
	fn clone(&self) -> Self {
		Self { shared: self.shared.clone() }
	}
}
impl<A> Debug for AuthCoordinator<A>
where
	A: Authenticator,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.shared.state.lock();

		f.debug_struct("AuthCoordinator")
			.field("credential_set", &state.credential.is_some())
			.field("is_refreshing", &state.is_refreshing)
			.field("refresh_attempts", &state.refresh_timestamps.len())
			.field("refresh_window", &state.refresh_window)
			.field("pending_authorizations", &state.pending_authorizations.len())
			.field("pending_retry_decisions", &state.pending_retry_decisions.len())
			.finish()
	}
}

struct Shared<A>
where
	A: Authenticator,
{
	authenticator: Arc<A>,
	state: Mutex<CoordinatorState<A>>,
	metrics: Arc<RefreshMetrics>,
}

/// Resolves the in-flight refresh exactly once, as abandoned when its task is dropped before
/// finishing (for example on runtime shutdown).
struct RefreshGuard<A>
where
	A: Authenticator,
{
	coordinator: Option<AuthCoordinator<A>>,
}
impl<A> RefreshGuard<A>
where
	A: Authenticator,
{
	fn new(coordinator: AuthCoordinator<A>) -> Self {
		Self { coordinator: Some(coordinator) }
	}

	fn finish(mut self, outcome: Result<A::Credential>) {
		if let Some(coordinator) = self.coordinator.take() {
			coordinator.finish_refresh(outcome);
		}
	}
}
impl<A> Drop for RefreshGuard<A>
where
	A: Authenticator,
{
	fn drop(&mut self) {
		if let Some(coordinator) = self.coordinator.take() {
			coordinator.finish_refresh(Err(Error::RefreshAbandoned));
		}
	}
}

enum AuthorizeStep<A>
where
	A: Authenticator,
{
	Fail(PendingAuthorization<A>, Error),
	Sign(A::Credential, PendingAuthorization<A>),
	Refresh(RefreshStep<A>),
}
