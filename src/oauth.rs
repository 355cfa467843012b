//! Authorization-code token exchange, driven through the client's own transport.
//!
//! The `oauth2` crate builds the token request and parses the response. Its HTTP calls go
//! through [`TransportHandle`], which forwards them to the client's [`HttpTransport`] and
//! records the status and `Retry-After` hint so failures can be reported with them.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, AuthUrl, AuthorizationCode, ClientId, EndpointNotSet, EndpointSet,
	HttpClientError, HttpRequest, HttpResponse, PkceCodeVerifier, RedirectUrl, RequestTokenError,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
use tokio::task::AbortHandle;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	client::Client,
	endpoint::catalog,
	error::{ConfigError, DecodeError, RemoteError, TransportError},
	http::{self as transport, HttpTransport, ResponseMetadata, ResponseMetadataSlot},
	obs::{self, CallKind, CallOutcome, CallSpan},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Inputs of one authorization-code exchange.
#[derive(Clone, Copy)]
pub struct CodeExchange<'a> {
	/// Public OAuth client identifier.
	pub client_id: &'a str,
	/// Code relayed through the redirect.
	pub code: &'a str,
	/// PKCE verifier matching the challenge sent with the authorization request.
	pub verifier: &'a str,
	/// Redirect URI sent with the authorization request.
	pub redirect_uri: &'a Url,
}
impl Debug for CodeExchange<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CodeExchange")
			.field("client_id", &self.client_id)
			.field("redirect_uri", &self.redirect_uri.as_str())
			.finish_non_exhaustive()
	}
}

impl Client {
	/// Trades an authorization code for an access token.
	///
	/// The returned credential carries the expiry reported by the token endpoint, if any.
	pub async fn exchange_code(&self, exchange: CodeExchange<'_>) -> Result<Credential> {
		let span = CallSpan::new(CallKind::TokenExchange, catalog::OAUTH_TOKEN.id);

		obs::record_call_outcome(CallKind::TokenExchange, CallOutcome::Attempt);

		let result = span.instrument(self.request_token(exchange)).await;

		obs::record_call_outcome(CallKind::TokenExchange, CallOutcome::of(&result));

		result
	}

	async fn request_token(&self, exchange: CodeExchange<'_>) -> Result<Credential> {
		let oauth_client = self.oauth_client(exchange.client_id)?;
		let redirect_url = RedirectUrl::new(exchange.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidRedirect { source })?;
		let meta = ResponseMetadataSlot::default();
		let handle = TransportHandle {
			transport: Arc::clone(self.transport()),
			slot: meta.clone(),
			limit: self.config.max_body_bytes,
		};
		let response = oauth_client
			.exchange_code(AuthorizationCode::new(exchange.code.to_owned()))
			.set_pkce_verifier(PkceCodeVerifier::new(exchange.verifier.to_owned()))
			.set_redirect_uri(Cow::Owned(redirect_url))
			.request_async(&handle)
			.await
			.map_err(|err| map_request_error(meta.take(), err))?;
		let mut credential = Credential::bearer(response.access_token().secret().to_owned());

		if let Some(expires_in) = response.expires_in() {
			let expires_in = i64::try_from(expires_in.as_secs()).unwrap_or(i64::MAX);

			credential.expires_at = OffsetDateTime::now_utc().checked_add(Duration::seconds(expires_in));
		}

		Ok(credential)
	}

	fn oauth_client(&self, client_id: &str) -> Result<ConfiguredBasicClient> {
		if client_id.trim().is_empty() {
			return Err(ConfigError::EmptyClientId.into());
		}

		let auth_url = AuthUrl::new(self.config.authorization_endpoint()?.to_string())
			.map_err(|source| ConfigError::InvalidApiUrl { source })?;
		let token_url = TokenUrl::new(self.config.token_endpoint()?.to_string())
			.map_err(|source| ConfigError::InvalidApiUrl { source })?;

		Ok(BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody))
	}
}

/// [`AsyncHttpClient`] adapter over an [`HttpTransport`].
pub(crate) struct TransportHandle {
	transport: Arc<dyn HttpTransport>,
	slot: ResponseMetadataSlot,
	limit: usize,
}
impl<'c> AsyncHttpClient<'c> for TransportHandle {
	type Error = HttpClientError<TransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let sender = Arc::clone(&self.transport);
		let slot = self.slot.clone();
		let limit = self.limit;
		// Transport futures are not `Sync`; only the join handle crosses into `oauth2`.
		let task = tokio::spawn(async move {
			slot.take();

			let response = sender.send(request).await.map_err(Box::new)?;
			let (parts, body) = response.into_parts();

			slot.store(ResponseMetadata {
				status: Some(parts.status.as_u16()),
				retry_after: transport::parse_retry_after(&parts.headers),
			});

			let body = transport::collect_body(body, limit).await.map_err(|e| match e {
				Error::Transport(inner) => HttpClientError::Reqwest(Box::new(inner)),
				other => HttpClientError::Other(other.to_string()),
			})?;

			Ok::<_, HttpClientError<TransportError>>(HttpResponse::from_parts(parts, body.to_vec()))
		});
		let abort = AbortOnDrop(task.abort_handle());

		Box::pin(async move {
			let result = task.await.map_err(|e| HttpClientError::Other(e.to_string()))?;

			drop(abort);

			result
		})
	}
}

// Cancels the exchange task when `oauth2` drops the request future.
struct AbortOnDrop(AbortHandle);
impl Drop for AbortOnDrop {
	fn drop(&mut self) {
		self.0.abort();
	}
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<TransportError>>,
) -> Error {
	let status = meta.as_ref().and_then(|value| value.status);
	let retry_after = meta.as_ref().and_then(|value| value.retry_after);

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(response, status, retry_after),
		RequestTokenError::Request(error) => map_transport_error(error, status, retry_after),
		RequestTokenError::Parse(source, _body) => DecodeError::Json { source }.into(),
		RequestTokenError::Other(message) => token_endpoint_error(
			status.unwrap_or(502),
			format!("unexpected token response: {message}"),
			retry_after,
		),
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	status: Option<u16>,
	retry_after: Option<Duration>,
) -> Error {
	let code = response.error().as_ref().to_owned();
	let message = response.error_description().cloned().unwrap_or_else(|| code.clone());
	let mut remote = RemoteError::from_body(catalog::OAUTH_TOKEN.id, status.unwrap_or(400), "")
		.with_retry_after(retry_after);

	remote.message = message.trim_end_matches('.').to_owned();
	remote.oauth_error = Some(code);

	remote.into()
}

fn map_transport_error(
	err: HttpClientError<TransportError>,
	status: Option<u16>,
	retry_after: Option<Duration>,
) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => Error::Transport(*inner),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) =>
			token_endpoint_error(status.unwrap_or(502), message, retry_after),
		_ => token_endpoint_error(status.unwrap_or(502), "HTTP client error".into(), retry_after),
	}
}

fn token_endpoint_error(status: u16, message: String, retry_after: Option<Duration>) -> Error {
	let mut remote =
		RemoteError::from_body(catalog::OAUTH_TOKEN.id, status, "").with_retry_after(retry_after);

	remote.message = message;

	remote.into()
}
