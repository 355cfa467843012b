//! Scripted in-memory transport.
//!
//! Responses are registered per method and path. Each route is a queue: entries are consumed
//! in order and the last one answers every further request. Unrouted requests receive an
//! empty 404. Every response body is wrapped so the transport knows when it is dropped,
//! which lets tests assert that no connection outlives its sequence.

// std
use std::{
	sync::atomic::{AtomicUsize, Ordering},
	task::{Context, Poll},
};
// crates.io
use futures_util::Stream;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
// self
use crate::{
	_prelude::*,
	endpoint::Method,
	error::TransportError,
	http::{BodyStream, HttpTransport, TransportFuture, TransportRequest, TransportResponse},
};

/// How a scripted body ends once its chunks are exhausted.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Tail {
	End,
	Fail(String),
	Pending,
}

/// Response script for one request.
#[derive(Clone, Debug)]
pub struct ScriptedResponse {
	status: u16,
	headers: Vec<(String, String)>,
	chunks: Vec<Bytes>,
	tail: Tail,
	unreachable: Option<String>,
}
impl ScriptedResponse {
	/// Empty body with `status`.
	pub fn status(status: u16) -> Self {
		Self { status, headers: Vec::new(), chunks: Vec::new(), tail: Tail::End, unreachable: None }
	}

	/// JSON body delivered in one chunk.
	pub fn json(status: u16, body: impl Into<String>) -> Self {
		let body: String = body.into();

		Self::chunks(status, [body]).with_header("content-type", "application/json")
	}

	/// 200 with one NDJSON line per chunk.
	pub fn ndjson<I, S>(lines: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::chunks(200, lines.into_iter().map(|line| format!("{}\n", line.into())))
			.with_header("content-type", "application/x-ndjson")
	}

	/// Raw chunks, delivered exactly as split.
	pub fn chunks<I, S>(status: u16, chunks: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self { chunks: chunks.into_iter().map(|c| Bytes::from(c.into())).collect(), ..Self::status(status) }
	}

	/// Adds a response header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Interrupts the body with a transport error after the scripted chunks.
	pub fn then_fail(mut self, message: impl Into<String>) -> Self {
		self.tail = Tail::Fail(message.into());

		self
	}

	/// Keeps the body open after the scripted chunks, like an idle live stream.
	pub fn then_pend(mut self) -> Self {
		self.tail = Tail::Pending;

		self
	}

	/// Fails the request itself before any response arrives.
	pub fn unreachable(message: impl Into<String>) -> Self {
		Self { unreachable: Some(message.into()), ..Self::status(0) }
	}
}

/// Request observed by a [`MemoryTransport`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
	/// Request method.
	pub method: http::Method,
	/// Full request URI.
	pub uri: Uri,
	/// Request headers.
	pub headers: HeaderMap,
	/// Request body.
	pub body: Vec<u8>,
}
impl RecordedRequest {
	/// Header value as text, if present.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// Query pairs, decoded.
	pub fn query_pairs(&self) -> Vec<(String, String)> {
		url::form_urlencoded::parse(self.uri.query().unwrap_or_default().as_bytes())
			.into_owned()
			.collect()
	}
}

/// In-memory [`HttpTransport`] with scripted routes and connection accounting.
#[derive(Debug, Default)]
pub struct MemoryTransport {
	routes: Mutex<HashMap<(http::Method, String), VecDeque<ScriptedResponse>>>,
	requests: Mutex<Vec<RecordedRequest>>,
	opened: Arc<AtomicUsize>,
	closed: Arc<AtomicUsize>,
}
impl MemoryTransport {
	/// Empty transport; every request answers 404 until routed.
	pub fn new() -> Self {
		Self::default()
	}

	/// Queues `response` for `method` + `path` (query excluded).
	pub fn route(&self, method: Method, path: &str, response: ScriptedResponse) -> &Self {
		self.routes
			.lock()
			.entry((method.as_http(), path.to_owned()))
			.or_default()
			.push_back(response);

		self
	}

	/// Requests seen so far, oldest first.
	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.requests.lock().clone()
	}

	/// Number of requests seen so far.
	pub fn calls(&self) -> usize {
		self.requests.lock().len()
	}

	/// Number of requests to `path` seen so far.
	pub fn calls_to(&self, path: &str) -> usize {
		self.requests.lock().iter().filter(|request| request.uri.path() == path).count()
	}

	/// Response bodies handed out.
	pub fn opened(&self) -> usize {
		self.opened.load(Ordering::SeqCst)
	}

	/// Response bodies dropped.
	pub fn closed(&self) -> usize {
		self.closed.load(Ordering::SeqCst)
	}

	/// Bodies handed out but not yet dropped.
	pub fn open_connections(&self) -> usize {
		self.opened().saturating_sub(self.closed())
	}

	fn next_response(&self, method: &http::Method, path: &str) -> ScriptedResponse {
		let mut routes = self.routes.lock();

		match routes.get_mut(&(method.clone(), path.to_owned())) {
			Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| ScriptedResponse::status(404)),
			Some(queue) => queue.front().cloned().unwrap_or_else(|| ScriptedResponse::status(404)),
			None => ScriptedResponse::status(404),
		}
	}
}
impl HttpTransport for MemoryTransport {
	fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let (parts, body) = request.into_parts();
			let script = self.next_response(&parts.method, parts.uri.path());

			self.requests.lock().push(RecordedRequest {
				method: parts.method,
				uri: parts.uri,
				headers: parts.headers,
				body,
			});

			if let Some(message) = script.unreachable {
				return Err(TransportError::network(std::io::Error::other(message)));
			}

			let mut headers = HeaderMap::new();

			for (name, value) in &script.headers {
				let name = HeaderName::try_from(name.as_str()).map_err(TransportError::network)?;
				let value = HeaderValue::try_from(value.as_str()).map_err(TransportError::network)?;

				headers.append(name, value);
			}

			let status = StatusCode::from_u16(script.status).map_err(TransportError::network)?;

			self.opened.fetch_add(1, Ordering::SeqCst);

			let body: BodyStream = Box::pin(TrackedBody {
				chunks: script.chunks.into(),
				tail: script.tail,
				closed: Arc::clone(&self.closed),
			});
			let mut response: TransportResponse = http::Response::new(body);

			*response.status_mut() = status;
			*response.headers_mut() = headers;

			Ok(response)
		})
	}
}

struct TrackedBody {
	chunks: VecDeque<Bytes>,
	tail: Tail,
	closed: Arc<AtomicUsize>,
}
impl Stream for TrackedBody {
	type Item = Result<Bytes, TransportError>;

	fn poll_next(mut self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		if let Some(chunk) = self.chunks.pop_front() {
			return Poll::Ready(Some(Ok(chunk)));
		}

		match std::mem::replace(&mut self.tail, Tail::End) {
			Tail::End => Poll::Ready(None),
			Tail::Fail(message) =>
				Poll::Ready(Some(Err(TransportError::network(std::io::Error::other(message))))),
			Tail::Pending => {
				self.tail = Tail::Pending;

				Poll::Pending
			},
		}
	}
}
impl Drop for TrackedBody {
	fn drop(&mut self) {
		self.closed.fetch_add(1, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use futures_util::StreamExt;
	// self
	use super::*;

	fn get(path: &str) -> TransportRequest {
		http::Request::get(path).body(Vec::new()).expect("Request fixture should build.")
	}

	#[tokio::test]
	async fn last_scripted_response_is_sticky() {
		let transport = MemoryTransport::new();

		transport
			.route(Method::Get, "/a", ScriptedResponse::status(500))
			.route(Method::Get, "/a", ScriptedResponse::json(200, "{}"));

		let statuses = [
			transport.send(get("/a")).await.expect("First call should answer.").status(),
			transport.send(get("/a")).await.expect("Second call should answer.").status(),
			transport.send(get("/a?x=1")).await.expect("Third call should answer.").status(),
			transport.send(get("/b")).await.expect("Unrouted call should answer.").status(),
		];

		assert_eq!(statuses.map(|s| s.as_u16()), [500, 200, 200, 404]);
		assert_eq!(transport.calls_to("/a"), 3);
		assert_eq!(transport.opened(), 4);
		assert_eq!(transport.closed(), 4);
	}

	#[tokio::test]
	async fn body_tracks_drop_and_failure() {
		let transport = MemoryTransport::new();

		transport.route(Method::Get, "/s", ScriptedResponse::ndjson(["1"]).then_fail("reset"));

		let mut body = transport.send(get("/s")).await.expect("Call should answer.").into_body();

		assert_eq!(transport.open_connections(), 1);
		assert_eq!(body.next().await.map(|c| c.is_ok()), Some(true));
		assert_eq!(body.next().await.map(|c| c.is_err()), Some(true));
		assert!(body.next().await.is_none());

		drop(body);

		assert_eq!(transport.open_connections(), 0);
	}
}
