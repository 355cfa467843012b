//! Authorization Code + PKCE flow controller.
//!
//! [`Client::authorize_pkce`] generates a [`PkceSession`], binds the loopback listener when
//! one is requested, and returns an [`AuthorizationHandle`] right away. A background task owns
//! the session from then on: it waits for the redirect (from the browser or through
//! [`AuthorizationHandle::deliver`]), rejects redirects whose `state` does not match, performs
//! exactly one code exchange, and publishes the outcome. The deadline covers the whole wait
//! including the exchange. Cancelling or dropping the handle stops the task and frees the port.

mod listener;
mod session;

pub use session::*;

// std
use std::{net::SocketAddr, time::Duration as StdDuration};
// crates.io
use tokio::{
	sync::{Notify, mpsc, oneshot, watch},
	time::{self, Instant},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, Scope, ScopeSet},
	client::Client,
	error::{ConfigError, TransportError, ValidationError},
	flows::FlowState,
	obs::{self, CallKind, CallOutcome, CallSpan},
	oauth::CodeExchange,
};
use listener::{Callback, LoopbackReceiver};

/// Default time a session waits for the user.
pub const DEFAULT_TIMEOUT: Duration = Duration::minutes(2);
/// Page shown in the browser after a successful exchange.
pub const DEFAULT_SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Authorized</title></head><body><h1>Authorization complete</h1><p>You can close this tab and return to the application.</p></body></html>";

const REJECTED_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Rejected</title></head><body><h1>Redirect rejected</h1><p>The authorization response did not match this session.</p></body></html>";
const FAILED_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Failed</title></head><body><h1>Authorization failed</h1><p>Return to the application for details.</p></body></html>";
const NOT_FOUND_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Not found</title></head><body><h1>Not found</h1></body></html>";
const REDIRECT_QUEUE: usize = 4;

/// Where the authorization server sends the user back to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedirectTarget {
	/// Local listener on `127.0.0.1`; port 0 picks an ephemeral port.
	Loopback {
		/// Callback path, starting with `/`.
		path: String,
		/// Port to bind.
		port: u16,
	},
	/// Caller-managed redirect URI; redirects are handed in through
	/// [`AuthorizationHandle::deliver`].
	Custom(Url),
}
impl Default for RedirectTarget {
	fn default() -> Self {
		Self::Loopback { path: "/".into(), port: 0 }
	}
}

/// Parameters of one authorization session.
#[derive(Clone, Debug)]
pub struct PkceRequest {
	/// Public OAuth client identifier shown to the user.
	pub client_id: String,
	/// Scopes to request.
	pub scopes: Vec<Scope>,
	/// Redirect handling.
	pub redirect: RedirectTarget,
	/// How long to wait for the user, exchange included.
	pub timeout: Duration,
	/// HTML answered to the browser after a successful exchange.
	pub success_page: String,
}
impl PkceRequest {
	/// Request with a loopback redirect, no scopes, and the default timeout.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			scopes: Vec::new(),
			redirect: RedirectTarget::default(),
			timeout: DEFAULT_TIMEOUT,
			success_page: DEFAULT_SUCCESS_PAGE.into(),
		}
	}

	/// Adds requested scopes.
	pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
		self.scopes.extend(scopes);

		self
	}

	/// Overrides the redirect handling.
	pub fn with_redirect(mut self, redirect: RedirectTarget) -> Self {
		self.redirect = redirect;

		self
	}

	/// Overrides the deadline.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the browser success page.
	pub fn with_success_page(mut self, html: impl Into<String>) -> Self {
		self.success_page = html.into();

		self
	}
}

/// Query parameters of an authorization redirect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RedirectParams {
	/// Authorization code.
	pub code: Option<String>,
	/// Returned state.
	pub state: Option<String>,
	/// OAuth error code, e.g. `access_denied`.
	pub error: Option<String>,
	/// Human-readable error description.
	pub error_description: Option<String>,
}
impl RedirectParams {
	/// Parses a raw query string.
	pub fn from_query(query: &str) -> Self {
		let mut params = Self::default();

		for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
			let slot = match key.as_ref() {
				"code" => &mut params.code,
				"state" => &mut params.state,
				"error" => &mut params.error,
				"error_description" => &mut params.error_description,
				_ => continue,
			};

			*slot = Some(value.into_owned());
		}

		params
	}

	/// Parses the query of a full redirect URL.
	pub fn from_url(url: &Url) -> Self {
		Self::from_query(url.query().unwrap_or_default())
	}
}

/// What happened to a delivered redirect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedirectOutcome {
	/// Code exchanged; the session completed.
	Accepted,
	/// State mismatch or missing code; the session keeps waiting.
	Rejected,
	/// Redirect matched but the session failed (denied, exchange error, cancelled).
	Failed,
	/// Session had already ended.
	Ignored,
}

impl Client {
	/// Starts a PKCE authorization session.
	///
	/// Returns as soon as the authorization URL is ready and, for loopback redirects, the
	/// listener is bound. Must be called inside a tokio runtime.
	pub async fn authorize_pkce(&self, request: PkceRequest) -> Result<AuthorizationHandle> {
		if request.client_id.trim().is_empty() {
			return Err(ConfigError::EmptyClientId.into());
		}
		if !request.timeout.is_positive() {
			return Err(ValidationError::NonPositiveTimeout.into());
		}

		let timeout =
			StdDuration::try_from(request.timeout).map_err(|_| ValidationError::NonPositiveTimeout)?;
		let deadline = Instant::now().checked_add(timeout).ok_or(ValidationError::OutOfRange {
			field: "timeout",
			min: 1,
			max: i64::MAX,
			value: request.timeout.whole_seconds(),
		})?;
		let (listener, redirect_uri) = match &request.redirect {
			RedirectTarget::Loopback { path, port } => {
				if !path.starts_with('/') {
					return Err(ConfigError::InvalidRedirectPath { path: path.clone() }.into());
				}

				let listener = LoopbackReceiver::bind(*port).await?;
				let redirect_uri = Url::parse(&format!("http://{}{path}", listener.local_addr()))
					.map_err(|source| ConfigError::InvalidRedirect { source })?;

				(Some(listener), redirect_uri)
			},
			RedirectTarget::Custom(url) => (None, url.clone()),
		};
		let session = PkceSession::generate(
			&self.config.authorization_endpoint()?,
			&request.client_id,
			request.scopes.iter().copied().collect::<ScopeSet>(),
			redirect_uri,
			OffsetDateTime::now_utc().saturating_add(request.timeout),
		);
		let (state_tx, state_rx) = watch::channel(FlowState::Idle);
		let states = StateCell(state_tx);

		states.advance(FlowState::AwaitingUserAction);
		// The listener is bound and the delivery queue exists before the caller gets the handle.
		states.advance(FlowState::AwaitingRedirect);

		let (redirect_tx, redirect_rx) = mpsc::channel(REDIRECT_QUEUE);
		let (outcome_tx, outcome_rx) = oneshot::channel();
		let cancel = Arc::new(Notify::new());
		let handle = AuthorizationHandle {
			authorize_url: session.authorize_url.clone(),
			redirect_uri: session.redirect_uri.clone(),
			local_addr: listener.as_ref().map(LoopbackReceiver::local_addr),
			state: state_rx,
			redirects: redirect_tx,
			cancel: Arc::clone(&cancel),
			outcome: Some(outcome_rx),
		};
		let controller = Controller {
			client: self.clone(),
			client_id: request.client_id,
			success_page: request.success_page,
			session,
			listener,
			redirects: redirect_rx,
			cancel,
			states,
			deadline,
			settled: None,
		};
		let span = CallSpan::new(CallKind::Pkce, "oauth.authorize");

		tokio::spawn(span.instrument(controller.run(outcome_tx)));

		Ok(handle)
	}
}

/// Caller's side of a running session. Dropping it cancels the session.
pub struct AuthorizationHandle {
	authorize_url: Url,
	redirect_uri: Url,
	local_addr: Option<SocketAddr>,
	state: watch::Receiver<FlowState>,
	redirects: mpsc::Sender<Delivery>,
	cancel: Arc<Notify>,
	outcome: Option<oneshot::Receiver<Result<Credential>>>,
}
impl AuthorizationHandle {
	/// Page the user has to open.
	pub fn authorize_url(&self) -> &Url {
		&self.authorize_url
	}

	/// Redirect URI embedded in the authorization URL.
	pub fn redirect_uri(&self) -> &Url {
		&self.redirect_uri
	}

	/// Address of the loopback listener, if one is bound.
	pub fn local_addr(&self) -> Option<SocketAddr> {
		self.local_addr
	}

	/// Current state.
	pub fn state(&self) -> FlowState {
		*self.state.borrow()
	}

	/// Watch channel that observes every state change.
	pub fn subscribe(&self) -> watch::Receiver<FlowState> {
		self.state.clone()
	}

	/// Hands a redirect received by the caller to the session.
	pub async fn deliver(&self, params: RedirectParams) -> RedirectOutcome {
		let (reply, outcome) = oneshot::channel();

		if self.redirects.send(Delivery { params, reply }).await.is_err() {
			return RedirectOutcome::Ignored;
		}

		outcome.await.unwrap_or(RedirectOutcome::Ignored)
	}

	/// Stops the session unless it already ended.
	pub fn cancel(&self) {
		self.cancel.notify_one();
	}

	/// Waits for the session outcome.
	pub async fn wait(mut self) -> Result<Credential> {
		match self.outcome.take() {
			Some(outcome) => outcome.await.unwrap_or(Err(Error::Cancelled)),
			None => Err(Error::Cancelled),
		}
	}

	/// Blocks the current thread until the session ends. Must not be called from async code.
	pub fn wait_blocking(mut self) -> Result<Credential> {
		match self.outcome.take() {
			Some(outcome) => outcome.blocking_recv().unwrap_or(Err(Error::Cancelled)),
			None => Err(Error::Cancelled),
		}
	}
}
impl Debug for AuthorizationHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationHandle")
			.field("authorize_url", &self.authorize_url.as_str())
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("local_addr", &self.local_addr)
			.field("state", &self.state())
			.finish()
	}
}
impl Drop for AuthorizationHandle {
	fn drop(&mut self) {
		self.cancel.notify_one();
	}
}

struct Delivery {
	params: RedirectParams,
	reply: oneshot::Sender<RedirectOutcome>,
}

// Publishes monotonic transitions.
struct StateCell(watch::Sender<FlowState>);
impl StateCell {
	fn advance(&self, to: FlowState) -> bool {
		self.0.send_if_modified(|state| {
			if !state.can_advance_to(to) {
				return false;
			}

			obs::record_transition(*state, to);

			*state = to;

			true
		})
	}
}

enum Event {
	Delivered(Delivery),
	Browser(std::io::Result<Callback>),
}

enum Step {
	Rejected,
	Finished(Result<Credential>),
}
impl Step {
	fn outcome(&self) -> RedirectOutcome {
		match self {
			Step::Rejected => RedirectOutcome::Rejected,
			Step::Finished(Ok(_)) => RedirectOutcome::Accepted,
			Step::Finished(Err(_)) => RedirectOutcome::Failed,
		}
	}
}

struct Controller {
	client: Client,
	client_id: String,
	success_page: String,
	session: PkceSession,
	listener: Option<LoopbackReceiver>,
	redirects: mpsc::Receiver<Delivery>,
	cancel: Arc<Notify>,
	states: StateCell,
	deadline: Instant,
	settled: Option<(oneshot::Sender<RedirectOutcome>, RedirectOutcome)>,
}
impl Controller {
	async fn run(mut self, outcome: oneshot::Sender<Result<Credential>>) {
		obs::record_call_outcome(CallKind::Pkce, CallOutcome::Attempt);

		let result = self.drive().await;

		// The port is free before anyone can observe the outcome.
		self.listener = None;
		self.redirects.close();

		while let Ok(late) = self.redirects.try_recv() {
			let _ = late.reply.send(RedirectOutcome::Ignored);
		}

		let terminal = match &result {
			Ok(_) => FlowState::Completed,
			Err(Error::TimedOut) => FlowState::TimedOut,
			Err(Error::Cancelled) => FlowState::Cancelled,
			Err(_) => FlowState::Failed,
		};

		obs::record_call_outcome(CallKind::Pkce, CallOutcome::of(&result));
		self.states.advance(terminal);

		if let Some((reply, redirect)) = self.settled.take() {
			let _ = reply.send(redirect);
		}

		let _ = outcome.send(result);
	}

	async fn drive(&mut self) -> Result<Credential> {
		loop {
			let event = tokio::select! {
				biased;
				_ = self.cancel.notified() => return Err(Error::Cancelled),
				_ = time::sleep_until(self.deadline) => return Err(Error::TimedOut),
				Some(delivery) = self.redirects.recv() => Event::Delivered(delivery),
				callback = next_callback(self.listener.as_mut()) => Event::Browser(callback),
			};

			match event {
				Event::Delivered(Delivery { params, reply }) => {
					let step = self.evaluate(params).await;
					let outcome = step.outcome();

					match step {
						Step::Rejected => {
							let _ = reply.send(outcome);
						},
						Step::Finished(result) => {
							// Answered once the terminal state is visible.
							self.settled = Some((reply, outcome));

							return result;
						},
					}
				},
				Event::Browser(callback) => {
					let callback = callback.map_err(TransportError::Io)?;

					if callback.path() != self.session.redirect_uri.path() {
						callback.respond(404, "Not Found", NOT_FOUND_PAGE).await;

						continue;
					}

					let step = self.evaluate(RedirectParams::from_query(callback.query())).await;

					match &step {
						Step::Rejected => callback.respond(400, "Bad Request", REJECTED_PAGE).await,
						Step::Finished(Ok(_)) => callback.respond(200, "OK", &self.success_page).await,
						Step::Finished(Err(_)) => callback.respond(400, "Bad Request", FAILED_PAGE).await,
					}

					if let Step::Finished(result) = step {
						return result;
					}
				},
			}
		}
	}

	async fn evaluate(&self, params: RedirectParams) -> Step {
		if !self.session.state_matches(params.state.as_deref()) {
			return Step::Rejected;
		}
		if let Some(error) = params.error {
			let reason = params.error_description.unwrap_or(error);

			return Step::Finished(Err(Error::AccessDenied {
				reason: reason.trim_end_matches('.').to_owned(),
			}));
		}

		let Some(code) = params.code else {
			return Step::Rejected;
		};

		self.states.advance(FlowState::ExchangingCode);

		let exchange = self.client.exchange_code(CodeExchange {
			client_id: &self.client_id,
			code: &code,
			verifier: self.session.verifier(),
			redirect_uri: &self.session.redirect_uri,
		});
		let result = tokio::select! {
			biased;
			_ = self.cancel.notified() => Err(Error::Cancelled),
			result = time::timeout_at(self.deadline, exchange) => result.unwrap_or(Err(Error::TimedOut)),
		};

		Step::Finished(result)
	}
}

async fn next_callback(listener: Option<&mut LoopbackReceiver>) -> std::io::Result<Callback> {
	match listener {
		Some(listener) => listener.accept().await,
		None => std::future::pending().await,
	}
}
