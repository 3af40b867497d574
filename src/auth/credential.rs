//! Credential contract and the bundled bearer credential with its builder.

// self
use crate::{_prelude::*, auth::CredentialSecret};

/// Opaque authorization value held by the coordinator.
///
/// Credentials are immutable once produced. A refresh replaces the held value wholesale, so
/// implementations only need to answer whether they are due for replacement.
pub trait Credential
where
	Self: 'static + Clone + Send + Sync,
{
	/// Returns `true` when the credential must be refreshed before it signs another request.
	fn requires_refresh(&self) -> bool;
}

/// Errors produced by [`BearerCredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum BearerCredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Bearer token credential with an expiry instant and a refresh margin.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerCredential {
	/// Access token secret; callers must avoid logging it.
	pub access_token: CredentialSecret,
	/// Refresh token secret used by authenticators to mint the next credential.
	pub refresh_token: Option<CredentialSecret>,
	/// Instant the credential was issued.
	pub issued_at: OffsetDateTime,
	/// Instant the access token stops being accepted.
	pub expires_at: OffsetDateTime,
	/// How long before `expires_at` the credential already counts as stale.
	pub refresh_margin: Duration,
}
impl BearerCredential {
	/// Margin applied when the builder is not given one.
	pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::minutes(5);

	/// Returns a builder for constructing bearer credentials.
	pub fn builder() -> BearerCredentialBuilder {
		BearerCredentialBuilder::default()
	}

	/// Returns `true` if the credential must be refreshed at the provided instant.
	pub fn requires_refresh_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at - self.refresh_margin
	}

	/// Returns `true` if the access token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}
impl Credential for BearerCredential {
	fn requires_refresh(&self) -> bool {
		self.requires_refresh_at(OffsetDateTime::now_utc())
	}
}
impl Debug for BearerCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BearerCredential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("refresh_margin", &self.refresh_margin)
			.finish()
	}
}

/// Builder for [`BearerCredential`].
#[derive(Clone, Debug, Default)]
pub struct BearerCredentialBuilder {
	access_token: Option<CredentialSecret>,
	refresh_token: Option<CredentialSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	refresh_margin: Option<Duration>,
}
impl BearerCredentialBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(CredentialSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(CredentialSecret::new(token));

		self
	}

	/// Sets the issued-at instant (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Overrides the refresh margin (defaults to five minutes; negative values clamp to zero).
	pub fn refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin = Some(if margin.is_negative() { Duration::ZERO } else { margin });

		self
	}

	/// Consumes the builder and produces a [`BearerCredential`].
	pub fn build(self) -> Result<BearerCredential, BearerCredentialBuilderError> {
		let access_token =
			self.access_token.ok_or(BearerCredentialBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(BearerCredentialBuilderError::MissingExpiry),
		};

		Ok(BearerCredential {
			access_token,
			refresh_token: self.refresh_token,
			issued_at,
			expires_at,
			refresh_margin: self
				.refresh_margin
				.unwrap_or(BearerCredential::DEFAULT_REFRESH_MARGIN),
		})
	}
}
