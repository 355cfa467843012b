//! Client context: configuration, transport, attached credential, and the scope cache.
//!
//! A [`Client`] is cheap to clone. Clones share the transport and the
//! [`ScopeResolver`], so scopes resolved through one clone are visible to the others, while
//! [`Client::with_credential`] lets each clone carry its own credential.

mod executor;

// self
use crate::{
	_prelude::*,
	auth::{Credential, IntrospectFuture, Scope, ScopeIntrospector, ScopeResolver, ScopeSet},
	decode::{Ack, One},
	endpoint::{RequestParams, catalog},
	error::{ConfigError, DecodeError},
	http::HttpTransport,
	obs::{self, CallKind, CallOutcome, CallSpan},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Production API host.
pub const DEFAULT_API_URL: &str = "https://lichess.org";
/// Response header listing the scopes of the bearer token.
pub const SCOPES_HEADER: &str = "x-oauth-scopes";

/// Connection-independent client settings.
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// API base URL; endpoint paths are appended to it.
	pub api_url: Url,
	/// `User-Agent` sent with every request.
	pub user_agent: String,
	/// Largest body read whole for single-valued and non-streamed calls.
	pub max_body_bytes: usize,
}
impl ClientConfig {
	const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

	/// Settings for the API at `api_url`.
	///
	/// Plain HTTP is accepted only for loopback hosts.
	pub fn new(api_url: &str) -> Result<Self, ConfigError> {
		let api_url =
			Url::parse(api_url).map_err(|source| ConfigError::InvalidApiUrl { source })?;

		ensure_secure(&api_url)?;

		Ok(Self {
			api_url,
			user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into(),
			max_body_bytes: Self::DEFAULT_MAX_BODY_BYTES,
		})
	}

	/// Settings for the production API.
	pub fn lichess() -> Result<Self, ConfigError> {
		Self::new(DEFAULT_API_URL)
	}

	/// Overrides the `User-Agent`.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Overrides the buffered body limit.
	pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
		self.max_body_bytes = limit;

		self
	}

	/// Absolute URL of `path` on the API host.
	pub fn endpoint_url(&self, path: &str) -> Result<Url, ConfigError> {
		let base = self.api_url.as_str().trim_end_matches('/');

		Url::parse(&format!("{base}{path}")).map_err(|source| ConfigError::InvalidApiUrl { source })
	}

	/// OAuth authorization page.
	pub fn authorization_endpoint(&self) -> Result<Url, ConfigError> {
		self.endpoint_url("/oauth")
	}

	/// OAuth token endpoint.
	pub fn token_endpoint(&self) -> Result<Url, ConfigError> {
		self.endpoint_url(catalog::OAUTH_TOKEN.path_template)
	}
}

/// Handle to the API.
#[derive(Clone)]
pub struct Client {
	/// Shared settings.
	pub config: Arc<ClientConfig>,
	transport: Arc<dyn HttpTransport>,
	scopes: Arc<ScopeResolver>,
	credential: Option<Credential>,
}
impl Client {
	/// Client for the production API over the default reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn new() -> Result<Self> {
		Self::with_config(ClientConfig::lichess()?)
	}

	/// Client for `config` over the default reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn with_config(config: ClientConfig) -> Result<Self> {
		Ok(Self::with_transport(config, Arc::new(ReqwestTransport::new()?)))
	}

	/// Client for `config` over a caller-provided transport.
	pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
		Self {
			config: Arc::new(config),
			transport,
			scopes: Default::default(),
			credential: None,
		}
	}

	/// Clone of this client that authenticates with `credential`.
	pub fn with_credential(mut self, credential: Credential) -> Self {
		self.credential = Some(credential);

		self
	}

	/// Clone of this client without a credential.
	pub fn without_credential(mut self) -> Self {
		self.credential = None;

		self
	}

	/// Attached credential.
	pub fn credential(&self) -> Option<&Credential> {
		self.credential.as_ref()
	}

	/// Scope cache shared by every clone of this client.
	pub fn scope_resolver(&self) -> &ScopeResolver {
		&self.scopes
	}

	/// Transport shared by every clone of this client.
	pub fn transport(&self) -> &Arc<dyn HttpTransport> {
		&self.transport
	}

	/// Scopes granted to `credential`, resolved once and cached.
	pub async fn scopes_of(&self, credential: &Credential) -> Result<ScopeSet> {
		self.scopes.scopes_of(self, credential).await
	}

	/// Whether the attached credential carries `scope`. False without a credential.
	pub async fn has_scope(&self, scope: Scope) -> Result<bool> {
		match &self.credential {
			Some(credential) => self.scopes.require(self, credential, scope).await,
			None => Ok(false),
		}
	}

	/// Prefilled personal-token creation page for `scopes`.
	pub fn personal_access_token_form(&self, description: &str, scopes: &[Scope]) -> Result<Url> {
		let mut url = self.config.endpoint_url("/account/oauth/token/create")?;

		{
			let mut pairs = url.query_pairs_mut();

			for scope in scopes.iter().copied().collect::<std::collections::BTreeSet<_>>() {
				pairs.append_pair("scopes[]", scope.as_str());
			}

			pairs.append_pair("description", description);
		}

		Ok(url)
	}

	/// Looks up many tokens at once. Unknown or expired tokens map to `None`.
	pub async fn test_tokens<S>(&self, tokens: &[S]) -> One<BTreeMap<String, Option<TokenInfo>>>
	where
		S: AsRef<str>,
	{
		let joined = tokens.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");

		self.one(&catalog::TOKEN_TEST, RequestParams::new().with_text(joined)).await
	}

	/// Revokes the attached credential.
	pub async fn revoke_token(&self) -> One<Ack> {
		let result = self.one(&catalog::TOKEN_REVOKE, ()).await;

		if result.is_present() {
			if let Some(credential) = &self.credential {
				self.scopes.invalidate(credential);
			}
		}

		result
	}

	async fn introspect_scopes(&self, credential: &Credential) -> Result<ScopeSet> {
		let endpoint = &catalog::ACCOUNT_PROFILE;
		let response =
			self.transmit(endpoint, endpoint.path_template, &RequestParams::new(), Some(credential)).await?;
		let header = match response.headers().get(SCOPES_HEADER) {
			Some(value) => value
				.to_str()
				.map_err(|_| DecodeError::Header { name: SCOPES_HEADER })?
				.to_owned(),
			None => String::new(),
		};

		// The profile body is not needed; dropping it releases the connection.
		drop(response);

		Ok(ScopeSet::from_header(&header).map_err(DecodeError::from)?)
	}
}
impl ScopeIntrospector for Client {
	fn introspect<'a>(&'a self, credential: &'a Credential) -> IntrospectFuture<'a> {
		let span = CallSpan::new(CallKind::Introspect, catalog::ACCOUNT_PROFILE.id);

		Box::pin(async move {
			obs::record_call_outcome(CallKind::Introspect, CallOutcome::Attempt);

			let result = span.instrument(self.introspect_scopes(credential)).await;

			obs::record_call_outcome(CallKind::Introspect, CallOutcome::of(&result));

			result
		})
	}
}
impl Debug for Client {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client")
			.field("config", &self.config)
			.field("credential", &self.credential)
			.field("scopes", &self.scopes)
			.finish()
	}
}

/// Token details returned by the bulk token test.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
	/// Owner of the token.
	pub user_id: String,
	/// Comma-separated scopes.
	pub scopes: String,
	/// Expiry as Unix milliseconds, if the token expires.
	pub expires: Option<i64>,
}
impl TokenInfo {
	/// Parsed scopes.
	pub fn scope_set(&self) -> Result<ScopeSet, DecodeError> {
		Ok(ScopeSet::from_header(&self.scopes)?)
	}
}

fn ensure_secure(url: &Url) -> Result<(), ConfigError> {
	let loopback = match url.host() {
		Some(url::Host::Domain(domain)) => domain == "localhost",
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	};

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(ConfigError::InsecureEndpoint { url: url.to_string() }),
	}
}
