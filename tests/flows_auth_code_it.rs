// std
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
// crates.io
use time::Duration;
use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::{TcpListener, TcpStream},
};
// self
use lichess_api_core::{
	Client, ClientConfig,
	auth::Scope,
	endpoint::Method,
	error::Error,
	flows::{
		AuthorizationHandle, DEFAULT_SUCCESS_PAGE, FlowState, PkceRequest, RedirectOutcome,
		RedirectParams, RedirectTarget, compute_pkce_challenge,
	},
	http::{MemoryTransport, ScriptedResponse},
	url::Url,
};

const CLIENT_ID: &str = "lichess-api-core-it";
const TOKEN: &str = r#"{"token_type":"Bearer","access_token":"lio_loopback","expires_in":31536000}"#;

fn memory_client(transport: &Arc<MemoryTransport>) -> Client {
	let config =
		ClientConfig::new("https://lichess.dev").expect("Memory client config should be valid.");

	Client::with_transport(config, transport.clone())
}

fn loopback(path: &str) -> RedirectTarget {
	RedirectTarget::Loopback { path: path.into(), port: 0 }
}

fn custom() -> RedirectTarget {
	RedirectTarget::Custom(
		Url::parse("https://app.example/oauth/callback").expect("Redirect fixture should parse."),
	)
}

fn authorize_params(handle: &AuthorizationHandle) -> HashMap<String, String> {
	handle.authorize_url().query_pairs().into_owned().collect()
}

fn form(body: &[u8]) -> HashMap<String, String> {
	url::form_urlencoded::parse(body).into_owned().collect()
}

// Plays the browser: one GET, whole response read back.
async fn browse(addr: SocketAddr, target: &str) -> (u16, String) {
	let mut stream = TcpStream::connect(addr).await.expect("Loopback listener should accept.");
	let request = format!("GET {target} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
	let mut response = String::new();

	stream.write_all(request.as_bytes()).await.expect("Browser request should be written.");
	stream.read_to_string(&mut response).await.expect("Browser response should be read.");

	let status = response
		.split_ascii_whitespace()
		.nth(1)
		.and_then(|status| status.parse().ok())
		.expect("Response should carry a status line.");
	let body = response.split_once("\r\n\r\n").map(|(_, body)| body.to_owned()).unwrap_or_default();

	(status, body)
}

#[tokio::test]
async fn loopback_session_completes_after_rejecting_a_forged_redirect() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(Method::Post, "/api/token", ScriptedResponse::json(200, TOKEN));

	let handle = memory_client(&transport)
		.authorize_pkce(
			PkceRequest::new(CLIENT_ID)
				.with_scopes([Scope::PuzzleRead, Scope::ChallengeRead])
				.with_redirect(loopback("/callback")),
		)
		.await
		.expect("Session should start.");
	let addr = handle.local_addr().expect("Loopback sessions expose their address.");
	let params = authorize_params(&handle);
	let state = params["state"].clone();
	let mut states = handle.subscribe();

	assert_eq!(handle.redirect_uri().as_str(), format!("http://{addr}/callback"));
	assert_eq!(params["redirect_uri"], handle.redirect_uri().as_str());
	assert_eq!(params["client_id"], CLIENT_ID);
	assert_eq!(params["scope"], "challenge:read puzzle:read");
	assert_eq!(handle.state(), FlowState::AwaitingRedirect);

	let (status, _) = browse(addr, "/callback?code=forged&state=not-the-state").await;

	assert_eq!(status, 400);
	assert_eq!(handle.state(), FlowState::AwaitingRedirect);

	let (status, _) = browse(addr, "/favicon.ico").await;

	assert_eq!(status, 404);

	let (status, body) = browse(addr, &format!("/callback?code=granted&state={state}")).await;

	assert_eq!(status, 200);
	assert_eq!(body, DEFAULT_SUCCESS_PAGE);

	let credential = handle.wait().await.expect("Session should complete.");

	assert_eq!(credential.secret().expose(), "lio_loopback");
	assert!(credential.expires_at.is_some());
	assert_eq!(*states.borrow_and_update(), FlowState::Completed);
	assert_eq!(transport.calls_to("/api/token"), 1);

	let token_request = form(&transport.requests()[0].body);

	assert_eq!(token_request["grant_type"], "authorization_code");
	assert_eq!(token_request["code"], "granted");
	assert_eq!(token_request["client_id"], CLIENT_ID);
	assert_eq!(token_request["redirect_uri"], format!("http://{addr}/callback"));
	assert_eq!(compute_pkce_challenge(&token_request["code_verifier"]), params["code_challenge"]);

	TcpListener::bind(addr).await.expect("Port should be free once the session ended.");
}

#[tokio::test]
async fn custom_redirect_sends_the_verifier_behind_the_challenge() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(Method::Post, "/api/token", ScriptedResponse::json(200, TOKEN));

	let handle = memory_client(&transport)
		.authorize_pkce(PkceRequest::new(CLIENT_ID).with_redirect(custom()))
		.await
		.expect("Session should start.");
	let params = authorize_params(&handle);
	let mut redirect = Url::parse("https://app.example/oauth/callback?code=granted")
		.expect("Redirect fixture should parse.");

	redirect.query_pairs_mut().append_pair("state", &params["state"]);

	assert!(handle.local_addr().is_none());
	assert!(!params.contains_key("scope"));
	assert_eq!(params["code_challenge_method"], "S256");
	assert_eq!(handle.deliver(RedirectParams::from_url(&redirect)).await, RedirectOutcome::Accepted);
	assert_eq!(handle.state(), FlowState::Completed);

	handle.wait().await.expect("Session should complete.");

	let token_request = form(&transport.requests()[0].body);

	assert_eq!(token_request["redirect_uri"], "https://app.example/oauth/callback");
	assert_eq!(compute_pkce_challenge(&token_request["code_verifier"]), params["code_challenge"]);
}

#[tokio::test]
async fn user_denial_fails_the_session_without_an_exchange() {
	let transport = Arc::new(MemoryTransport::new());
	let handle = memory_client(&transport)
		.authorize_pkce(PkceRequest::new(CLIENT_ID).with_redirect(loopback("/")))
		.await
		.expect("Session should start.");
	let addr = handle.local_addr().expect("Loopback sessions expose their address.");
	let state = authorize_params(&handle)["state"].clone();
	let (status, _) = browse(addr, &format!("/?error=access_denied&state={state}")).await;

	assert_eq!(status, 400);
	assert!(matches!(
		handle.wait().await,
		Err(Error::AccessDenied { reason }) if reason == "access_denied"
	));
	assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn session_times_out_and_frees_the_port() {
	let transport = Arc::new(MemoryTransport::new());
	let handle = memory_client(&transport)
		.authorize_pkce(
			PkceRequest::new(CLIENT_ID)
				.with_redirect(loopback("/"))
				.with_timeout(Duration::milliseconds(200)),
		)
		.await
		.expect("Session should start.");
	let addr = handle.local_addr().expect("Loopback sessions expose their address.");
	let mut states = handle.subscribe();

	assert!(matches!(handle.wait().await, Err(Error::TimedOut)));
	assert_eq!(*states.borrow_and_update(), FlowState::TimedOut);

	TcpListener::bind(addr).await.expect("Port should be free once the session timed out.");
}

#[tokio::test]
async fn deadline_covers_a_stalled_exchange() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(
		Method::Post,
		"/api/token",
		ScriptedResponse::chunks(200, [r#"{"token_type":"Bearer","#]).then_pend(),
	);

	let handle = memory_client(&transport)
		.authorize_pkce(
			PkceRequest::new(CLIENT_ID)
				.with_redirect(custom())
				.with_timeout(Duration::milliseconds(300)),
		)
		.await
		.expect("Session should start.");
	let state = authorize_params(&handle)["state"].clone();
	let outcome = handle
		.deliver(RedirectParams {
			code: Some("granted".into()),
			state: Some(state),
			..Default::default()
		})
		.await;

	assert_eq!(outcome, RedirectOutcome::Failed);
	assert_eq!(handle.state(), FlowState::TimedOut);
	assert!(matches!(handle.wait().await, Err(Error::TimedOut)));
	assert_eq!(transport.calls_to("/api/token"), 1);
}

#[tokio::test]
async fn cancel_stops_the_session() {
	let transport = Arc::new(MemoryTransport::new());
	let handle = memory_client(&transport)
		.authorize_pkce(PkceRequest::new(CLIENT_ID).with_redirect(loopback("/")))
		.await
		.expect("Session should start.");
	let addr = handle.local_addr().expect("Loopback sessions expose their address.");

	handle.cancel();

	assert!(matches!(handle.wait().await, Err(Error::Cancelled)));

	TcpListener::bind(addr).await.expect("Port should be free once the session was cancelled.");
}

#[tokio::test]
async fn dropping_the_handle_cancels_the_session() {
	let transport = Arc::new(MemoryTransport::new());
	let handle = memory_client(&transport)
		.authorize_pkce(PkceRequest::new(CLIENT_ID).with_redirect(custom()))
		.await
		.expect("Session should start.");
	let mut states = handle.subscribe();

	drop(handle);

	let terminal = states
		.wait_for(|state| state.is_terminal())
		.await
		.map(|state| *state)
		.expect("Terminal state should be published.");

	assert_eq!(terminal, FlowState::Cancelled);
}

#[test]
fn blocking_wait_returns_the_outcome() {
	let runtime = tokio::runtime::Builder::new_multi_thread()
		.worker_threads(1)
		.enable_all()
		.build()
		.expect("Runtime should build.");
	let transport = Arc::new(MemoryTransport::new());
	let handle = runtime
		.block_on(memory_client(&transport).authorize_pkce(
			PkceRequest::new(CLIENT_ID)
				.with_redirect(custom())
				.with_timeout(Duration::milliseconds(100)),
		))
		.expect("Session should start.");

	assert!(matches!(handle.wait_blocking(), Err(Error::TimedOut)));
}

#[cfg(feature = "reqwest")]
mod over_http {
	// crates.io
	use httpmock::prelude::*;
	use lichess_api_core::{http::ReqwestTransport, reqwest};
	// self
	use super::*;

	fn http_client(server: &MockServer) -> Client {
		let config =
			ClientConfig::new(&server.base_url()).expect("Mock server URL should be accepted.");
		let reqwest =
			reqwest::Client::builder().no_proxy().build().expect("Reqwest client should build.");

		Client::with_transport(config, Arc::new(ReqwestTransport::with_client(reqwest)))
	}

	#[tokio::test]
	async fn loopback_session_exchanges_exactly_once() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/api/token")
					.header("content-type", "application/x-www-form-urlencoded");
				then.status(200).header("content-type", "application/json").body(TOKEN);
			})
			.await;
		let handle = http_client(&server)
			.authorize_pkce(PkceRequest::new(CLIENT_ID).with_redirect(loopback("/callback")))
			.await
			.expect("Session should start.");
		let addr = handle.local_addr().expect("Loopback sessions expose their address.");
		let state = authorize_params(&handle)["state"].clone();
		let target = format!("/callback?code=granted&state={state}");
		let (status, _) = browse(addr, &target).await;

		assert_eq!(status, 200);
		assert_eq!(handle.deliver(RedirectParams::from_query(&target[10..])).await, RedirectOutcome::Ignored);

		let credential = handle.wait().await.expect("Session should complete.");

		mock.assert_calls_async(1).await;

		assert_eq!(credential.secret().expose(), "lio_loopback");
		assert!(
			TcpStream::connect(addr).await.is_err(),
			"Listener should be closed once the session completed."
		);
	}

	#[tokio::test]
	async fn token_endpoint_errors_fail_the_session() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST).path("/api/token");
				then.status(400)
					.header("content-type", "application/json")
					.body(r#"{"error":"invalid_grant","error_description":"Authorization code expired."}"#);
			})
			.await;
		let handle = http_client(&server)
			.authorize_pkce(PkceRequest::new(CLIENT_ID).with_redirect(loopback("/")))
			.await
			.expect("Session should start.");
		let addr = handle.local_addr().expect("Loopback sessions expose their address.");
		let state = authorize_params(&handle)["state"].clone();
		let mut states = handle.subscribe();
		let (status, _) = browse(addr, &format!("/?code=stale&state={state}")).await;

		assert_eq!(status, 400);

		let err = handle.wait().await.expect_err("Rejected exchange should fail the session.");

		mock.assert_async().await;

		match err {
			Error::Remote(remote) => {
				assert_eq!(remote.status, 400);
				assert_eq!(remote.oauth_error.as_deref(), Some("invalid_grant"));
				assert_eq!(remote.message, "Authorization code expired");
			},
			other => panic!("Expected a remote failure, got {other:?}."),
		}

		assert_eq!(*states.borrow_and_update(), FlowState::Failed);
	}
}
