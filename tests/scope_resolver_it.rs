// std
use std::sync::Arc;
// crates.io
use futures_util::future;
// self
use lichess_api_core::{
	Client, ClientConfig,
	auth::{Credential, Scope},
	endpoint::{Method, catalog},
	error::Error,
	http::{MemoryTransport, ScriptedResponse},
};

const ACCOUNT: &str = "/api/account";

fn account(scopes: &str) -> ScriptedResponse {
	ScriptedResponse::json(200, r#"{"id":"thibault"}"#).with_header("x-oauth-scopes", scopes)
}

fn client(transport: &Arc<MemoryTransport>, token: &str) -> Client {
	let config =
		ClientConfig::new("https://lichess.dev").expect("Memory client config should be valid.");

	Client::with_transport(config, transport.clone()).with_credential(Credential::bearer(token))
}

#[tokio::test]
async fn scopes_are_resolved_once_per_credential() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(Method::Get, ACCOUNT, account("challenge:read, puzzle:read"));

	let client = client(&transport, "lip_cached");

	assert!(client.has_scope(Scope::ChallengeRead).await.expect("Lookup should succeed."));
	assert!(client.has_scope(Scope::PuzzleRead).await.expect("Lookup should succeed."));
	assert!(!client.has_scope(Scope::StudyWrite).await.expect("Lookup should succeed."));
	assert_eq!(transport.calls_to(ACCOUNT), 1);
	assert_eq!(client.scope_resolver().metrics.resolutions(), 1);
	assert_eq!(client.scope_resolver().metrics.hits(), 2);
	assert_eq!(
		transport.requests()[0].header("authorization"),
		Some("Bearer lip_cached"),
		"Introspection must authenticate with the checked credential."
	);
}

#[tokio::test]
async fn missing_scope_stops_before_the_endpoint() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(Method::Get, ACCOUNT, account("puzzle:read"));

	let result =
		client(&transport, "lip_narrow").one::<serde_json::Value>(&catalog::CHALLENGE_LIST, ()).await;

	assert!(matches!(
		result.err(),
		Some(Error::Authorization { scope: Scope::ChallengeRead, .. })
	));
	assert_eq!(transport.calls(), 1);
	assert_eq!(transport.calls_to(ACCOUNT), 1);
}

#[tokio::test]
async fn missing_scope_header_means_no_scopes() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(Method::Get, ACCOUNT, ScriptedResponse::json(200, "{}"));

	let client = client(&transport, "lip_bare");
	let scopes = client
		.scopes_of(client.credential().expect("Credential should be attached."))
		.await
		.expect("Lookup should succeed.");

	assert!(scopes.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unauthorized_response_triggers_exactly_one_reresolution() {
	let transport = Arc::new(MemoryTransport::new());

	transport
		.route(Method::Get, ACCOUNT, account("challenge:read"))
		.route(Method::Get, "/api/challenge", ScriptedResponse::json(401, r#"{"error":"No such token"}"#))
		.route(Method::Get, "/api/challenge", ScriptedResponse::json(200, r#"{"in":[],"out":[]}"#));

	let client = client(&transport, "lip_revoked");
	let first = client.one::<serde_json::Value>(&catalog::CHALLENGE_LIST, ()).await;

	assert!(first.err().is_some_and(Error::is_unauthorized));
	assert!(client.scope_resolver().cached(client.credential().expect("Credential should be attached.")).is_none());
	assert_eq!(transport.calls_to(ACCOUNT), 1);

	let checks = (0..16).map(|_| {
		let client = client.clone();

		tokio::spawn(async move { client.has_scope(Scope::ChallengeRead).await })
	});
	let results = future::join_all(checks).await;

	for result in results {
		assert!(result.expect("Check task should finish.").expect("Lookup should succeed."));
	}

	assert_eq!(transport.calls_to(ACCOUNT), 2);
	assert_eq!(client.scope_resolver().metrics.invalidations(), 1);

	let second = client.one::<serde_json::Value>(&catalog::CHALLENGE_LIST, ()).await;

	assert!(second.is_present());
	assert_eq!(transport.calls_to(ACCOUNT), 2);
}

#[tokio::test]
async fn forbidden_response_also_invalidates() {
	let transport = Arc::new(MemoryTransport::new());

	transport
		.route(Method::Get, ACCOUNT, account("challenge:read"))
		.route(Method::Get, "/api/challenge", ScriptedResponse::status(403));

	let client = client(&transport, "lip_forbidden");
	let result = client.one::<serde_json::Value>(&catalog::CHALLENGE_LIST, ()).await;

	assert!(matches!(result.err(), Some(Error::Remote(remote)) if remote.status == 403));
	assert!(client.has_scope(Scope::ChallengeRead).await.expect("Lookup should succeed."));
	assert_eq!(transport.calls_to(ACCOUNT), 2);
}

#[tokio::test]
async fn separate_clients_keep_separate_caches() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(Method::Get, ACCOUNT, account("puzzle:read"));

	let a = client(&transport, "lip_shared");
	let b = client(&transport, "lip_shared");
	let a_clone = a.clone();

	assert!(a.has_scope(Scope::PuzzleRead).await.expect("Lookup should succeed."));
	assert!(a_clone.has_scope(Scope::PuzzleRead).await.expect("Lookup should succeed."));
	assert_eq!(transport.calls_to(ACCOUNT), 1);
	assert!(b.has_scope(Scope::PuzzleRead).await.expect("Lookup should succeed."));
	assert_eq!(transport.calls_to(ACCOUNT), 2);
}

#[tokio::test]
async fn anonymous_clients_have_no_scopes() {
	let transport = Arc::new(MemoryTransport::new());
	let config =
		ClientConfig::new("https://lichess.dev").expect("Memory client config should be valid.");
	let client = Client::with_transport(config, transport.clone());

	assert!(!client.has_scope(Scope::PuzzleRead).await.expect("Lookup should succeed."));
	assert_eq!(transport.calls(), 0);
}
