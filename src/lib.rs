//! Credential-gated request authorization with singleflight refresh, rate-guarded retries, and a
//! consistent request/transport-task registry for HTTP client sessions.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod coordinator;
pub mod error;
pub mod obs;
pub mod registry;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// crates.io
	use tokio::sync::Semaphore;
	// self
	use crate::{
		auth::{Authenticator, BearerCredential, Credential, RefreshFuture},
		coordinator::AuthCoordinator,
		error::{BoxError, DynError},
	};

	/// Coordinator type alias used across tests.
	pub type MockCoordinator = AuthCoordinator<MockAuthenticator>;

	/// Credential fixture whose staleness is fixed at construction.
	#[derive(Clone, Debug, PartialEq, Eq)]
	pub struct MockCredential {
		/// Token value stamped onto requests.
		pub token: String,
		/// Whether the credential reports that it requires a refresh.
		pub stale: bool,
	}
	impl MockCredential {
		/// Credential that does not require a refresh.
		pub fn fresh(token: impl Into<String>) -> Self {
			Self { token: token.into(), stale: false }
		}

		/// Credential that requires a refresh.
		pub fn stale(token: impl Into<String>) -> Self {
			Self { token: token.into(), stale: true }
		}
	}
	impl Credential for MockCredential {
		fn requires_refresh(&self) -> bool {
			self.stale
		}
	}

	/// Hook run inside [`Authenticator::is_request_authenticated_with`].
	pub type SignatureHook = Box<dyn Fn() + Send + Sync>;

	/// Request fixture carrying an optional `Authorization` value.
	#[derive(Clone, Debug, PartialEq, Eq)]
	pub struct MockRequest {
		/// Caller-chosen identifier.
		pub id: String,
		/// Authorization header value stamped by the authenticator.
		pub authorization: Option<String>,
	}
	impl MockRequest {
		/// Unsigned request.
		pub fn new(id: impl Into<String>) -> Self {
			Self { id: id.into(), authorization: None }
		}

		/// Request already signed with `token`.
		pub fn signed(id: impl Into<String>, token: &str) -> Self {
			Self { id: id.into(), authorization: Some(format!("Bearer {token}")) }
		}
	}

	/// Response fixture carrying only a status code.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct MockResponse {
		/// HTTP status code.
		pub status: u16,
	}

	/// Transport error fixture handed to retry decisions.
	#[derive(Debug, ThisError)]
	#[error("{0}")]
	pub struct MockError(pub String);
	impl MockError {
		/// Borrowed form expected by [`AuthCoordinator::should_retry`].
		pub fn as_dyn(&self) -> &DynError {
			self
		}
	}

	/// Scripted outcome for one refresh call.
	#[derive(Clone, Debug)]
	pub enum RefreshScript {
		/// Resolve with this credential.
		Succeed(MockCredential),
		/// Fail with this message.
		Fail(String),
		/// Panic inside the refresh future.
		Panic,
	}

	/// Authenticator fixture with scripted refreshes and an optional release gate.
	///
	/// Unscripted refreshes resolve to `MockCredential::fresh("refreshed-N")`, where `N`
	/// counts refresh calls starting at 1.
	pub struct MockAuthenticator {
		script: Mutex<VecDeque<RefreshScript>>,
		seen: Mutex<Vec<String>>,
		calls: AtomicUsize,
		gate: Option<Semaphore>,
		signature_hook: Mutex<Option<SignatureHook>>,
	}
	impl MockAuthenticator {
		/// Authenticator whose refreshes resolve immediately.
		pub fn new() -> Self {
			Self {
				script: Mutex::new(VecDeque::new()),
				seen: Mutex::new(Vec::new()),
				calls: AtomicUsize::new(0),
				gate: None,
				signature_hook: Mutex::new(None),
			}
		}

		/// Queues scripted outcomes, consumed one per refresh call.
		pub fn with_script(self, script: impl IntoIterator<Item = RefreshScript>) -> Self {
			self.script.lock().extend(script);

			self
		}

		/// Holds every refresh until [`MockAuthenticator::release`] hands out a permit.
		pub fn held(mut self) -> Self {
			self.gate = Some(Semaphore::new(0));

			self
		}

		/// Lets `n` held refreshes resolve.
		pub fn release(&self, n: usize) {
			if let Some(gate) = &self.gate {
				gate.add_permits(n);
			}
		}

		/// Number of refresh calls observed.
		pub fn refresh_calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		/// Tokens of the credentials handed to each refresh call, in call order.
		pub fn refreshed_from(&self) -> Vec<String> {
			self.seen.lock().clone()
		}

		/// Runs `hook` every time the authenticator checks which credential signed a request.
		pub fn on_signature_check(&self, hook: impl Fn() + Send + Sync + 'static) {
			*self.signature_hook.lock() = Some(Box::new(hook));
		}
	}
	impl Default for MockAuthenticator {
		fn default() -> Self {
			Self::new()
		}
	}
	impl Authenticator for MockAuthenticator {
		type Credential = MockCredential;
		type Request = MockRequest;
		type Response = MockResponse;
		type Session = ();

		fn apply(&self, credential: &MockCredential, request: &mut MockRequest) {
			request.authorization = Some(format!("Bearer {}", credential.token));
		}

		fn refresh<'a>(
			&'a self,
			credential: &'a MockCredential,
			_session: &'a (),
		) -> RefreshFuture<'a, MockCredential> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

			self.seen.lock().push(credential.token.clone());

			Box::pin(async move {
				if let Some(gate) = &self.gate {
					let _ = gate.acquire().await.map(|permit| permit.forget());
				}

				let scripted = self.script.lock().pop_front();

				match scripted {
					Some(RefreshScript::Succeed(credential)) => Ok(credential),
					Some(RefreshScript::Fail(message)) => Err(Box::new(MockError(message)) as BoxError),
					Some(RefreshScript::Panic) => panic!("Scripted refresh panic."),
					None => Ok(MockCredential::fresh(format!("refreshed-{call}"))),
				}
			})
		}

		fn did_request_fail_due_to_authentication(
			&self,
			_request: &MockRequest,
			response: &MockResponse,
			_error: &DynError,
		) -> bool {
			response.status == 401
		}

		fn is_request_authenticated_with(
			&self,
			request: &MockRequest,
			credential: &MockCredential,
		) -> bool {
			if let Some(hook) = self.signature_hook.lock().as_ref() {
				hook();
			}

			request.authorization.as_deref() == Some(format!("Bearer {}", credential.token).as_str())
		}
	}
	impl Debug for MockAuthenticator {
		fn fmt(&self, f: &mut Formatter) -> FmtResult {
			f.debug_struct("MockAuthenticator")
				.field("script", &self.script)
				.field("seen", &self.seen)
				.field("calls", &self.calls)
				.field("gate", &self.gate)
				.field("signature_hook", &self.signature_hook.lock().is_some())
				.finish()
		}
	}

	/// Authenticator over [`BearerCredential`] that rotates access tokens with the refresh token.
	///
	/// Refresh `N` (starting at 1) mints access token `access-N`, keeps the refresh token, and
	/// expires after the configured lifetime.
	#[derive(Debug)]
	pub struct MockBearerAuthenticator {
		lifetime: Duration,
		calls: AtomicUsize,
		refresh_tokens: Mutex<Vec<String>>,
	}
	impl MockBearerAuthenticator {
		/// Authenticator minting credentials valid for `lifetime`.
		pub fn new(lifetime: Duration) -> Self {
			Self { lifetime, calls: AtomicUsize::new(0), refresh_tokens: Mutex::new(Vec::new()) }
		}

		/// Number of refresh calls observed.
		pub fn refresh_calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		/// Refresh tokens presented to each refresh call, in call order.
		pub fn refreshed_with(&self) -> Vec<String> {
			self.refresh_tokens.lock().clone()
		}
	}
	impl Authenticator for MockBearerAuthenticator {
		type Credential = BearerCredential;
		type Request = MockRequest;
		type Response = MockResponse;
		type Session = ();

		fn apply(&self, credential: &BearerCredential, request: &mut MockRequest) {
			request.authorization = Some(credential.access_token.bearer_header());
		}

		fn refresh<'a>(
			&'a self,
			credential: &'a BearerCredential,
			_session: &'a (),
		) -> RefreshFuture<'a, BearerCredential> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

			Box::pin(async move {
				let Some(refresh_token) = credential.refresh_token.as_ref() else {
					return Err(
						Box::new(MockError("Credential has no refresh token.".into())) as BoxError
					);
				};

				self.refresh_tokens.lock().push(refresh_token.expose().to_owned());

				BearerCredential::builder()
					.access_token(format!("access-{call}"))
					.refresh_token(refresh_token.expose())
					.expires_in(self.lifetime)
					.build()
					.map_err(|e| Box::new(e) as BoxError)
			})
		}

		fn did_request_fail_due_to_authentication(
			&self,
			_request: &MockRequest,
			response: &MockResponse,
			_error: &DynError,
		) -> bool {
			response.status == 401
		}

		fn is_request_authenticated_with(
			&self,
			request: &MockRequest,
			credential: &BearerCredential,
		) -> bool {
			request
				.authorization
				.as_deref()
				.is_some_and(|header| credential.access_token.matches_bearer_header(header))
		}
	}

	/// Bearer credential issued now, expiring after `expires_in`, with refresh token `rt-0`.
	pub fn bearer_credential(access_token: &str, expires_in: Duration) -> BearerCredential {
		BearerCredential::builder()
			.access_token(access_token)
			.refresh_token("rt-0")
			.expires_in(expires_in)
			.build()
			.expect("Bearer credential fixture should build.")
	}

	/// Polls `condition` every millisecond for up to two seconds, panicking on timeout.
	pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
		for _ in 0..2_000 {
			if condition() {
				return;
			}

			tokio::time::sleep(std::time::Duration::from_millis(1)).await;
		}

		panic!("Timed out waiting until {what}.");
	}

	/// Builds a coordinator around `authenticator` holding `credential`.
	pub fn build_mock_coordinator(
		authenticator: MockAuthenticator,
		credential: Option<MockCredential>,
	) -> MockCoordinator {
		AuthCoordinator::new(authenticator, credential)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}
