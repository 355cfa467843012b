//! Transport primitives shared by the executor, the stream reader, and the token exchange.
//!
//! The module exposes [`HttpTransport`], the client's only dependency on an HTTP stack. A
//! transport turns an [`http::Request`] into an [`http::Response`] whose body is a
//! [`BodyStream`] of chunks, so streamed endpoints see bytes as they arrive and dropping the
//! body releases the connection. [`ReqwestTransport`] is the default implementation;
//! [`MemoryTransport`] scripts responses in memory and counts connections for tests.

pub mod memory;

pub use memory::*;

// crates.io
use bytes::BytesMut;
use futures_util::{Stream, StreamExt};
#[cfg(feature = "reqwest")] use futures_util::TryStreamExt;
use http::{HeaderMap, header::RETRY_AFTER};
use time::format_description::well_known::Rfc2822;
// self
#[cfg(feature = "reqwest")] use crate::error::ConfigError;
use crate::{
	_prelude::*,
	error::{DecodeError, TransportError},
};

#[cfg(feature = "reqwest")]
const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Chunked response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;
/// Request handed to a transport.
pub type TransportRequest = http::Request<Vec<u8>>;
/// Response produced by a transport. Dropping the body closes the connection.
pub type TransportResponse = http::Response<BodyStream>;
/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of streaming response bodies.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by every
/// clone of a [`Client`](crate::client::Client) and by the PKCE controller task. The returned
/// response must not buffer the body: the executor decides whether to read it whole or to
/// hand it to a [`StreamReader`](crate::stream::StreamReader).
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Dispatches `request` and resolves once the status line and headers are known.
	fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Reqwest-backed transport.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a dedicated reqwest client with a bounded connect phase.
	///
	/// Response bodies are not time-limited, since live streams stay open indefinitely.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let request = reqwest::Request::try_from(request)?;
			let response = client.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body: BodyStream = Box::pin(response.bytes_stream().map_err(TransportError::from));
			let mut response_new = http::Response::new(body);

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Reads a whole body, failing once it grows past `limit` bytes.
pub async fn collect_body(mut body: BodyStream, limit: usize) -> Result<Bytes> {
	let mut buffer = BytesMut::new();

	while let Some(chunk) = body.next().await {
		let chunk = chunk?;

		if buffer.len() + chunk.len() > limit {
			return Err(DecodeError::BodyTooLarge { limit }.into());
		}

		buffer.extend_from_slice(&chunk);
	}

	Ok(buffer.freeze())
}

/// Parses `Retry-After` as delta seconds or an RFC 2822 date.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// crates.io
	use futures_util::stream;
	use http::HeaderValue;
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_seconds_and_dates() {
		let mut headers = HeaderMap::new();

		assert_eq!(parse_retry_after(&headers), None);

		headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(120)));

		headers.insert(RETRY_AFTER, HeaderValue::from_static("Mon, 01 Jan 2001 00:00:00 +0000"));

		assert_eq!(parse_retry_after(&headers), None, "Past dates carry no hint.");
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn reqwest_transport_builds_its_own_client() {
		ReqwestTransport::new().expect("Default reqwest client should build.");

		let err = ConfigError::http_client_build(std::io::Error::other("TLS backend unavailable"));

		assert!(matches!(err, ConfigError::HttpClientBuild { .. }));
		assert_eq!(err.to_string(), "HTTP client could not be constructed.");
	}

	#[tokio::test]
	async fn collect_body_enforces_limit() {
		let chunks = || -> BodyStream {
			Box::pin(stream::iter(vec![
				Ok::<_, TransportError>(Bytes::from_static(b"abc")),
				Ok(Bytes::from_static(b"def")),
			]))
		};
		let whole = collect_body(chunks(), 6).await.expect("Body within limit should collect.");

		assert_eq!(&whole[..], b"abcdef");
		assert!(matches!(
			collect_body(chunks(), 5).await,
			Err(Error::Decode(DecodeError::BodyTooLarge { limit: 5 }))
		));
	}
}
