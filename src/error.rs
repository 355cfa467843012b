//! Error taxonomy shared by the executor, stream reader, scope resolver, and PKCE flow.

// self
use crate::{
	_prelude::*,
	auth::{Scope, ScopeValidationError},
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Caller-supplied parameters were rejected before any network I/O.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Transport failure (DNS, TCP, TLS, interrupted body).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Remote answered with a non-success status.
	#[error(transparent)]
	Remote(#[from] RemoteError),
	/// Response body could not be decoded into the requested type.
	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// Attached credential lacks the scope an endpoint requires.
	#[error("Endpoint `{endpoint}` requires the `{scope}` scope.")]
	Authorization {
		/// Identifier of the gated endpoint.
		endpoint: &'static str,
		/// Scope the credential is missing.
		scope: Scope,
	},
	/// The user declined the authorization request.
	#[error("Authorization was denied: {reason}.")]
	AccessDenied {
		/// Error code or description relayed through the redirect.
		reason: String,
	},
	/// Deadline elapsed before the operation finished.
	#[error("Operation timed out.")]
	TimedOut,
	/// Operation was cancelled by the caller.
	#[error("Operation was cancelled.")]
	Cancelled,
}
impl Error {
	/// HTTP status reported by the remote, when the error carries one.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Remote(remote) => Some(remote.status),
			_ => None,
		}
	}

	/// Returns true when the remote rejected the credential (401 or 403).
	pub fn is_unauthorized(&self) -> bool {
		matches!(self.status(), Some(401 | 403))
	}
}

/// Configuration failures raised while wiring a client or a flow.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] http::Error),
	/// API base URL cannot be parsed or joined.
	#[error("API URL is invalid.")]
	InvalidApiUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoint uses plain HTTP on a non-loopback host.
	#[error("Endpoint `{url}` must use HTTPS.")]
	InsecureEndpoint {
		/// Offending URL.
		url: String,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Loopback redirect path must be absolute.
	#[error("Redirect path `{path}` must start with `/`.")]
	InvalidRedirectPath {
		/// Offending path.
		path: String,
	},
	/// OAuth client identifier is empty.
	#[error("Client identifier cannot be empty.")]
	EmptyClientId,
	/// Loopback listener could not bind its port.
	#[error("Loopback listener could not bind port {port}.")]
	ListenerBind {
		/// Requested port (0 for ephemeral).
		port: u16,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Parameter and descriptor validation failures. None of these reach the network.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// A path placeholder has no bound value.
	#[error("Endpoint `{endpoint}` is missing the `{name}` path parameter.")]
	MissingPathParam {
		/// Endpoint identifier.
		endpoint: &'static str,
		/// Placeholder name.
		name: String,
	},
	/// A path value was supplied for a placeholder the template does not declare.
	#[error("Endpoint `{endpoint}` does not declare the `{name}` path parameter.")]
	UnexpectedPathParam {
		/// Endpoint identifier.
		endpoint: &'static str,
		/// Supplied parameter name.
		name: String,
	},
	/// A path value cannot be embedded in a URL segment.
	#[error("Path parameter `{name}` for `{endpoint}` is invalid: {reason}.")]
	InvalidPathParam {
		/// Endpoint identifier.
		endpoint: &'static str,
		/// Placeholder name.
		name: String,
		/// Human-readable reason.
		reason: &'static str,
	},
	/// Descriptor template is malformed.
	#[error("Endpoint `{endpoint}` has a malformed path template: {reason}.")]
	InvalidTemplate {
		/// Endpoint identifier.
		endpoint: &'static str,
		/// Human-readable reason.
		reason: &'static str,
	},
	/// The call style does not match the descriptor's response shape.
	#[error("Endpoint `{endpoint}` cannot be called as {requested}.")]
	ShapeMismatch {
		/// Endpoint identifier.
		endpoint: &'static str,
		/// Requested call style.
		requested: &'static str,
	},
	/// Numeric parameter outside its accepted range.
	#[error("Parameter `{field}` must be within {min}..={max}, got {value}.")]
	OutOfRange {
		/// Parameter name.
		field: &'static str,
		/// Inclusive lower bound.
		min: i64,
		/// Inclusive upper bound.
		max: i64,
		/// Rejected value.
		value: i64,
	},
	/// Text parameter length outside its accepted range.
	#[error("Parameter `{field}` must be {min}..={max} characters long, got {len}.")]
	InvalidLength {
		/// Parameter name.
		field: &'static str,
		/// Inclusive lower bound.
		min: usize,
		/// Inclusive upper bound.
		max: usize,
		/// Rejected length.
		len: usize,
	},
	/// Required parameter is empty.
	#[error("Parameter `{field}` cannot be empty.")]
	EmptyValue {
		/// Parameter name.
		field: &'static str,
	},
	/// Flow timeout must be strictly positive.
	#[error("Timeout must be positive.")]
	NonPositiveTimeout,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Non-success answer from the remote.
#[derive(Clone, Debug, ThisError)]
#[error("Endpoint `{endpoint}` responded with HTTP {status}: {message}.")]
pub struct RemoteError {
	/// Identifier of the endpoint that failed.
	pub endpoint: &'static str,
	/// HTTP status code.
	pub status: u16,
	/// Short description extracted from the body, or the canonical status reason.
	pub message: String,
	/// Raw (bounded) response body.
	pub body: String,
	/// OAuth `error` code, when the body carried one.
	pub oauth_error: Option<String>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}
impl RemoteError {
	/// Builds an error from a status and raw body, extracting `error`/`error_description`.
	pub fn from_body(endpoint: &'static str, status: u16, body: impl Into<String>) -> Self {
		#[derive(Deserialize)]
		struct ErrorBody {
			error: Option<String>,
			error_description: Option<String>,
		}

		let body = body.into();
		let parsed = serde_json::from_str::<ErrorBody>(&body).ok();
		let oauth_error = parsed.as_ref().and_then(|b| b.error.clone());
		let message = parsed
			.and_then(|b| b.error_description.or(b.error))
			.or_else(|| http::StatusCode::from_u16(status).ok()?.canonical_reason().map(Into::into))
			.unwrap_or_else(|| "unexpected response".into());
		let message = message.trim_end_matches('.').to_owned();

		Self { endpoint, status, message, body, oauth_error, retry_after: None }
	}

	/// Attaches a Retry-After hint.
	pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
		self.retry_after = retry_after;

		self
	}
}

/// Body decoding failures.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// JSON did not match the requested type.
	#[error("Response JSON does not match the expected shape.")]
	Json {
		/// Structured parsing failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// JSON document is followed by trailing data.
	#[error("Response JSON is followed by trailing data.")]
	Syntax {
		/// Underlying parser failure.
		#[source]
		source: serde_json::Error,
	},
	/// Body was not valid UTF-8.
	#[error("Response body is not valid UTF-8.")]
	Utf8(#[from] std::str::Utf8Error),
	/// PGN text could not be parsed.
	#[error("PGN is malformed: {reason}.")]
	Pgn {
		/// Human-readable reason.
		reason: &'static str,
	},
	/// Scope header could not be parsed.
	#[error("Scope header is malformed.")]
	Scopes(#[from] ScopeValidationError),
	/// Header value was not visible ASCII.
	#[error("Header `{name}` is not valid text.")]
	Header {
		/// Header name.
		name: &'static str,
	},
	/// Buffered body exceeded the accepted size.
	#[error("Response body exceeds {limit} bytes.")]
	BodyTooLarge {
		/// Accepted size in bytes.
		limit: usize,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn remote_error_prefers_error_description() {
		let err = RemoteError::from_body(
			"oauth.token",
			400,
			"{\"error\":\"invalid_grant\",\"error_description\":\"code expired.\"}",
		);

		assert_eq!(err.oauth_error.as_deref(), Some("invalid_grant"));
		assert_eq!(err.message, "code expired");
		assert_eq!(
			err.to_string(),
			"Endpoint `oauth.token` responded with HTTP 400: code expired."
		);
	}

	#[test]
	fn remote_error_falls_back_to_status_reason() {
		let err = RemoteError::from_body("account.profile", 429, "<html>slow down</html>");

		assert_eq!(err.oauth_error, None);
		assert_eq!(err.message, "Too Many Requests");
		assert_eq!(err.body, "<html>slow down</html>");
	}

	#[test]
	fn unauthorized_detection_covers_401_and_403() {
		let unauthorized = Error::from(RemoteError::from_body("a", 401, ""));
		let forbidden = Error::from(RemoteError::from_body("a", 403, ""));
		let missing = Error::from(RemoteError::from_body("a", 404, ""));

		assert!(unauthorized.is_unauthorized());
		assert!(forbidden.is_unauthorized());
		assert!(!missing.is_unauthorized());
		assert!(!Error::TimedOut.is_unauthorized());
	}
}
