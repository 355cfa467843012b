//! Bearer credentials with redacted secrets and stable cache keys.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Opaque bearer credential.
///
/// Granted scopes are not stored here; the client's
/// [`ScopeResolver`](crate::auth::ScopeResolver) resolves them lazily and keys its cache on
/// [`fingerprint`](Self::fingerprint), so the secret itself never becomes a map key.
#[derive(Clone)]
pub struct Credential {
	secret: TokenSecret,
	fingerprint: Arc<str>,
	/// Expiry reported by the token endpoint, when known.
	pub expires_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Wraps a bearer token.
	pub fn bearer(token: impl Into<String>) -> Self {
		let secret = TokenSecret::new(token);
		let fingerprint = compute_fingerprint(secret.expose()).into();

		Self { secret, fingerprint, expires_at: None }
	}

	/// Records the expiry instant.
	pub fn with_expires_at(mut self, expires_at: OffsetDateTime) -> Self {
		self.expires_at = Some(expires_at);

		self
	}

	/// Redacted secret.
	pub fn secret(&self) -> &TokenSecret {
		&self.secret
	}

	/// Stable SHA-256 fingerprint of the secret (base64, no padding).
	pub fn fingerprint(&self) -> &Arc<str> {
		&self.fingerprint
	}

	/// Returns true once `now` has reached the recorded expiry.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|at| now >= at)
	}

	/// `Authorization` header value.
	pub(crate) fn authorization_value(&self) -> String {
		format!("Bearer {}", self.secret.expose())
	}
}
impl PartialEq for Credential {
	fn eq(&self, other: &Self) -> bool {
		self.secret == other.secret
	}
}
impl Eq for Credential {}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("secret", &self.secret)
			.field("fingerprint", &self.fingerprint)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

fn compute_fingerprint(secret: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(secret.as_bytes());

	STANDARD_NO_PAD.encode(hasher.finalize())
}
