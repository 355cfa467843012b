// crates.io
use futures_util::stream;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	client::Client,
	decode::{self, One, Pgn},
	endpoint::{EndpointDescriptor, Framing, ParamSpec, RequestParams, ResponseShape},
	error::{ConfigError, RemoteError, TransportError, ValidationError},
	http::{self as transport, BodyStream, TransportResponse},
	obs::{self, CallKind, CallOutcome, CallSpan},
	stream::{Sequence, StreamReader},
};

impl Client {
	/// Performs a single-valued call.
	///
	/// A 404 yields [`One::Absent`]. Validation and scope failures are reported before any
	/// request is sent.
	pub async fn one<T>(&self, endpoint: &'static EndpointDescriptor, params: impl ParamSpec) -> One<T>
	where
		T: DeserializeOwned,
	{
		let params = params.apply();
		let span = CallSpan::new(CallKind::One, endpoint.id);

		obs::record_call_outcome(CallKind::One, CallOutcome::Attempt);

		let result = span.instrument(self.fetch_one(endpoint, params)).await;

		obs::record_call_outcome(CallKind::One, CallOutcome::of(&result));

		result.into()
	}

	/// Performs a many-valued JSON call.
	///
	/// Streamed endpoints produce values as lines arrive; the returned [`Sequence`] holds the
	/// connection until it is exhausted or dropped. Undecodable lines are skipped and counted.
	pub async fn many<T>(
		&self,
		endpoint: &'static EndpointDescriptor,
		params: impl ParamSpec,
	) -> Result<Sequence<T>>
	where
		T: DeserializeOwned,
	{
		let params = params.apply();
		let span = CallSpan::new(CallKind::Many, endpoint.id);

		obs::record_call_outcome(CallKind::Many, CallOutcome::Attempt);

		let result = span.instrument(self.fetch_many(endpoint, params)).await;

		obs::record_call_outcome(CallKind::Many, CallOutcome::of(&result));

		result
	}

	/// Performs a many-valued PGN call, yielding one [`Pgn`] per game.
	pub async fn pgn(
		&self,
		endpoint: &'static EndpointDescriptor,
		params: impl ParamSpec,
	) -> Result<Sequence<Pgn>> {
		let params = params.apply();
		let span = CallSpan::new(CallKind::Many, endpoint.id);

		obs::record_call_outcome(CallKind::Many, CallOutcome::Attempt);

		let result = span.instrument(self.fetch_pgn(endpoint, params)).await;

		obs::record_call_outcome(CallKind::Many, CallOutcome::of(&result));

		result
	}

	async fn fetch_one<T>(
		&self,
		endpoint: &'static EndpointDescriptor,
		params: Result<RequestParams, ValidationError>,
	) -> Result<Option<T>>
	where
		T: DeserializeOwned,
	{
		if endpoint.shape != ResponseShape::Single {
			return Err(ValidationError::ShapeMismatch { endpoint: endpoint.id, requested: "one" }.into());
		}

		let response = match self.send(endpoint, params?).await {
			Ok(response) => response,
			Err(Error::Remote(remote)) if remote.status == 404 => return Ok(None),
			Err(e) => return Err(e),
		};
		let bytes = transport::collect_body(response.into_body(), self.config.max_body_bytes).await?;

		Ok(Some(decode::decode_json(&bytes)?))
	}

	async fn fetch_many<T>(
		&self,
		endpoint: &'static EndpointDescriptor,
		params: Result<RequestParams, ValidationError>,
	) -> Result<Sequence<T>>
	where
		T: DeserializeOwned,
	{
		let framing = match endpoint.shape {
			ResponseShape::Many(framing) if framing != Framing::Pgn => framing,
			_ =>
				return Err(
					ValidationError::ShapeMismatch { endpoint: endpoint.id, requested: "many" }.into()
				),
		};
		let body = self.send(endpoint, params?).await?.into_body();

		if endpoint.streaming {
			return Ok(Sequence::live(StreamReader::new(
				endpoint.id,
				body,
				framing,
				decode::decode_json::<T>,
			)));
		}

		let bytes = transport::collect_body(body, self.config.max_body_bytes).await?;

		match framing {
			Framing::Ndjson => Ok(Sequence::live(StreamReader::new(
				endpoint.id,
				replay(bytes),
				framing,
				decode::decode_json::<T>,
			))),
			_ => Ok(Sequence::buffered(decode::decode_json::<Vec<T>>(&bytes)?)),
		}
	}

	async fn fetch_pgn(
		&self,
		endpoint: &'static EndpointDescriptor,
		params: Result<RequestParams, ValidationError>,
	) -> Result<Sequence<Pgn>> {
		if endpoint.shape != ResponseShape::Many(Framing::Pgn) {
			return Err(ValidationError::ShapeMismatch { endpoint: endpoint.id, requested: "pgn" }.into());
		}

		let mut body = self.send(endpoint, params?).await?.into_body();

		if !endpoint.streaming {
			body = replay(transport::collect_body(body, self.config.max_body_bytes).await?);
		}

		Ok(Sequence::live(StreamReader::new(endpoint.id, body, Framing::Pgn, decode::decode_pgn)))
	}

	/// Validates, gates on scope, then transmits with the attached credential.
	async fn send(
		&self,
		endpoint: &'static EndpointDescriptor,
		params: RequestParams,
	) -> Result<TransportResponse> {
		let path = endpoint.resolve_path(&params.path)?;

		self.check_scope(endpoint).await?;
		self.transmit(endpoint, &path, &params, self.credential.as_ref()).await
	}

	async fn check_scope(&self, endpoint: &'static EndpointDescriptor) -> Result<()> {
		let (Some(scope), Some(credential)) = (endpoint.required_scope, self.credential.as_ref())
		else {
			return Ok(());
		};

		if self.scopes.require(self, credential, scope).await? {
			Ok(())
		} else {
			Err(Error::Authorization { endpoint: endpoint.id, scope })
		}
	}

	/// Sends one request and maps non-success statuses to [`RemoteError`].
	///
	/// A 401 or 403 drops the cached scopes of `credential`.
	pub(crate) async fn transmit(
		&self,
		endpoint: &'static EndpointDescriptor,
		path: &str,
		params: &RequestParams,
		credential: Option<&Credential>,
	) -> Result<TransportResponse> {
		let mut url = self.config.endpoint_url(path)?;

		if !params.query.is_empty() {
			url.query_pairs_mut().extend_pairs(&params.query);
		}

		let mut builder = http::Request::builder()
			.method(endpoint.method.as_http())
			.uri(url.as_str())
			.header(ACCEPT, endpoint.shape.framing().media_type())
			.header(USER_AGENT, self.config.user_agent.as_str());

		if let Some(credential) = credential {
			builder = builder.header(AUTHORIZATION, credential.authorization_value());
		}

		let body = match &params.body {
			Some(body) => {
				builder = builder.header(CONTENT_TYPE, body.content_type());

				body.encode()
			},
			None => Vec::new(),
		};
		let request = builder.body(body).map_err(ConfigError::from)?;
		let response = self.transport.send(request).await?;
		let status = response.status();

		if status.is_success() {
			return Ok(response);
		}
		if matches!(status.as_u16(), 401 | 403) {
			if let Some(credential) = credential {
				self.scopes.invalidate(credential);
			}
		}

		let retry_after = transport::parse_retry_after(response.headers());
		let body = match transport::collect_body(response.into_body(), self.config.max_body_bytes)
			.await
		{
			Ok(body) => body,
			Err(e) => {
				obs::record_unread_error_body(endpoint.id, status.as_u16(), &e);

				Bytes::new()
			},
		};

		Err(RemoteError::from_body(endpoint.id, status.as_u16(), String::from_utf8_lossy(&body))
			.with_retry_after(retry_after)
			.into())
	}
}

// Re-reads an already collected body through the line framer.
fn replay(bytes: Bytes) -> BodyStream {
	Box::pin(stream::iter([Ok::<_, TransportError>(bytes)]))
}
