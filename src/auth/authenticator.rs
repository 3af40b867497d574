//! Authenticator contract that lets the coordinator sign, refresh, and classify requests
//! without depending on any HTTP client.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	error::{BoxError, DynError},
};

/// Boxed future returned by [`Authenticator::refresh`].
pub type RefreshFuture<'a, C> = Pin<Box<dyn Future<Output = Result<C, BoxError>> + 'a + Send>>;

/// Capability set the coordinator drives on behalf of the surrounding client.
///
/// The trait is generic over the request, response, and session types through associated
/// types so implementers can plug in any client stack (`http` parts, a bespoke SDK request, a
/// test double) while the coordinator stays free of those dependencies.
///
/// `refresh` runs on its own Tokio task. The other hooks are called synchronously and must
/// not call back into the coordinator; `is_request_authenticated_with` runs while the
/// coordinator's state lock is held.
pub trait Authenticator
where
	Self: 'static + Send + Sync,
{
	/// Credential type held by the coordinator.
	type Credential: Credential;
	/// Outbound request that gets signed.
	type Request: 'static + Send;
	/// Response received for a failed request.
	type Response;
	/// Opaque session handle passed through to refreshes.
	type Session: 'static + Clone + Send + Sync;

	/// Stamps the credential onto the request.
	fn apply(&self, credential: &Self::Credential, request: &mut Self::Request);

	/// Produces a replacement for `credential`.
	fn refresh<'a>(
		&'a self,
		credential: &'a Self::Credential,
		session: &'a Self::Session,
	) -> RefreshFuture<'a, Self::Credential>;

	/// Returns `true` when the failure is authentication-related (typically a 401).
	fn did_request_fail_due_to_authentication(
		&self,
		request: &Self::Request,
		response: &Self::Response,
		error: &DynError,
	) -> bool;

	/// Returns `true` when `request` was signed with `credential`.
	fn is_request_authenticated_with(
		&self,
		request: &Self::Request,
		credential: &Self::Credential,
	) -> bool;
}

/// Read access to a request that was sent and failed, as seen by retry decisions.
pub trait Exchange {
	/// Outbound request type.
	type Request;
	/// Response type.
	type Response;

	/// Original outbound request, if the request was ever built.
	fn request(&self) -> Option<&Self::Request>;

	/// Received response, if the server ever answered.
	fn response(&self) -> Option<&Self::Response>;
}

/// Owned [`Exchange`] for callers that do not have a request object of their own.
#[derive(Clone, Debug)]
pub struct CompletedExchange<Req, Resp> {
	/// Original outbound request.
	pub request: Option<Req>,
	/// Received response.
	pub response: Option<Resp>,
}
impl<Req, Resp> CompletedExchange<Req, Resp> {
	/// Creates an exchange that was sent and answered.
	pub fn new(request: Req, response: Resp) -> Self {
		Self { request: Some(request), response: Some(response) }
	}

	/// Creates an exchange that never reached the server.
	pub fn unsent() -> Self {
		Self { request: None, response: None }
	}

	/// Creates an exchange that was sent but never answered.
	pub fn unanswered(request: Req) -> Self {
		Self { request: Some(request), response: None }
	}
}
impl<Req, Resp> Exchange for CompletedExchange<Req, Resp> {
	type Request = Req;
	type Response = Resp;

	fn request(&self) -> Option<&Req> {
		self.request.as_ref()
	}

	fn response(&self) -> Option<&Resp> {
		self.response.as_ref()
	}
}
