// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::ScopeSet};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub const fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Secrets and URLs of one authorization attempt.
///
/// The verifier never leaves the session except through the token exchange.
#[derive(Clone)]
pub struct PkceSession {
	/// Scopes requested from the user.
	pub scope: ScopeSet,
	/// Opaque state value that must round-trip through the redirect.
	pub state: String,
	/// Redirect URI embedded in the authorization URL.
	pub redirect_uri: Url,
	/// Page the user opens to grant access.
	pub authorize_url: Url,
	/// Moment after which the session times out.
	pub deadline: OffsetDateTime,
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkceSession {
	/// Generates fresh secrets and builds the authorization URL.
	pub fn generate(
		authorization_endpoint: &Url,
		client_id: &str,
		scope: ScopeSet,
		redirect_uri: Url,
		deadline: OffsetDateTime,
	) -> Self {
		Self::with_verifier(
			authorization_endpoint,
			client_id,
			scope,
			redirect_uri,
			deadline,
			random_string(PKCE_VERIFIER_LEN),
			random_string(STATE_LEN),
		)
	}

	pub(crate) fn with_verifier(
		authorization_endpoint: &Url,
		client_id: &str,
		scope: ScopeSet,
		redirect_uri: Url,
		deadline: OffsetDateTime,
		verifier: String,
		state: String,
	) -> Self {
		let challenge = compute_pkce_challenge(&verifier);
		let method = PkceCodeChallengeMethod::S256;
		let mut authorize_url = authorization_endpoint.clone();
		let mut pairs = authorize_url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", client_id);
		pairs.append_pair("redirect_uri", redirect_uri.as_str());
		pairs.append_pair("code_challenge_method", method.as_str());
		pairs.append_pair("code_challenge", &challenge);
		pairs.append_pair("state", &state);

		if !scope.is_empty() {
			pairs.append_pair("scope", &scope.normalized());
		}

		drop(pairs);

		Self { scope, state, redirect_uri, authorize_url, deadline, verifier, challenge, method }
	}

	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.challenge
	}

	/// PKCE challenge method (currently always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		self.method
	}

	/// Returns true when `returned` matches the session state.
	pub fn state_matches(&self, returned: Option<&str>) -> bool {
		returned == Some(self.state.as_str())
	}

	pub(crate) fn verifier(&self) -> &str {
		&self.verifier
	}
}
impl Debug for PkceSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkceSession")
			.field("scope", &self.scope)
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.field("deadline", &self.deadline)
			.field("code_challenge", &self.challenge)
			.field("code_challenge_method", &self.method)
			.finish_non_exhaustive()
	}
}

/// S256 challenge of `verifier`: SHA-256, then base64url without padding.
pub fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}
