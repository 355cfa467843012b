// std
use std::sync::Arc;
// crates.io
use futures_util::StreamExt;
use serde::Deserialize;
// self
use lichess_api_core::{
	Client, ClientConfig,
	endpoint::{Method, RequestParams, catalog},
	error::Error,
	http::{MemoryTransport, ScriptedResponse},
};

#[derive(Debug, Deserialize, PartialEq)]
struct Tour {
	id: String,
}

fn client(transport: &Arc<MemoryTransport>) -> Client {
	let config =
		ClientConfig::new("https://lichess.dev").expect("Memory client config should be valid.");

	Client::with_transport(config, transport.clone())
}

fn round(id: &str) -> RequestParams {
	RequestParams::new().with_path("round_id", id)
}

#[tokio::test]
async fn undecodable_lines_are_skipped_and_counted() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(
		Method::Get,
		"/api/broadcast",
		ScriptedResponse::chunks(200, ["{\"id\":\"t1\"}\nnot-", "json\n\n{\"id\":", "\"t2\"}\n"]),
	);

	let mut tours = client(&transport)
		.many::<Tour>(&catalog::BROADCAST_OFFICIAL, ())
		.await
		.expect("Broadcast feed should open.");
	let mut ids = Vec::new();

	while let Some(tour) = tours.next().await {
		ids.push(tour.expect("Malformed lines are skipped, not surfaced.").id);
	}

	assert_eq!(ids, ["t1", "t2"]);
	assert_eq!(tours.skipped(), 1);
	assert_eq!(transport.open_connections(), 0);
}

#[tokio::test]
async fn dropping_a_live_sequence_releases_the_connection() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(
		Method::Get,
		"/api/broadcast",
		ScriptedResponse::ndjson([r#"{"id":"t1"}"#, r#"{"id":"t2"}"#]).then_pend(),
	);

	let mut tours = client(&transport)
		.many::<Tour>(&catalog::BROADCAST_OFFICIAL, ())
		.await
		.expect("Broadcast feed should open.");

	assert_eq!(tours.next().await.map(|tour| tour.ok()), Some(Some(Tour { id: "t1".into() })));
	assert_eq!(transport.open_connections(), 1);

	drop(tours);

	assert_eq!(transport.opened(), 1);
	assert_eq!(transport.closed(), 1);
}

#[tokio::test]
async fn closing_a_live_sequence_releases_the_connection() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(
		Method::Get,
		"/api/broadcast",
		ScriptedResponse::ndjson([r#"{"id":"t1"}"#]).then_pend(),
	);

	let mut tours = client(&transport)
		.many::<Tour>(&catalog::BROADCAST_OFFICIAL, ())
		.await
		.expect("Broadcast feed should open.");

	assert!(tours.next().await.is_some());

	tours.close();

	assert_eq!(transport.open_connections(), 0);
	assert!(tours.next().await.is_none());
}

#[tokio::test]
async fn transport_failure_ends_the_sequence_once() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(
		Method::Get,
		"/api/broadcast",
		ScriptedResponse::ndjson([r#"{"id":"t1"}"#, r#"{"id":"t2"}"#]).then_fail("connection reset"),
	);

	let mut tours = client(&transport)
		.many::<Tour>(&catalog::BROADCAST_OFFICIAL, ())
		.await
		.expect("Broadcast feed should open.");
	let mut ids = Vec::new();
	let mut failures = 0;

	while let Some(tour) = tours.next().await {
		match tour {
			Ok(tour) => ids.push(tour.id),
			Err(Error::Transport(_)) => failures += 1,
			Err(e) => panic!("Unexpected stream error: {e:?}."),
		}
	}

	assert_eq!(ids, ["t1", "t2"]);
	assert_eq!(failures, 1);
	assert!(tours.next().await.is_none());
	assert_eq!(transport.open_connections(), 0);
}

#[tokio::test]
async fn to_vec_stops_at_the_transport_failure() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(
		Method::Get,
		"/api/broadcast",
		ScriptedResponse::ndjson([r#"{"id":"t1"}"#]).then_fail("connection reset"),
	);

	let result = client(&transport)
		.many::<Tour>(&catalog::BROADCAST_OFFICIAL, ())
		.await
		.expect("Broadcast feed should open.")
		.to_vec()
		.await;

	assert!(matches!(result, Err(Error::Transport(_))));
	assert_eq!(transport.open_connections(), 0);
}

#[tokio::test]
async fn round_pgn_is_split_into_games() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(
		Method::Get,
		"/api/broadcast/round/r1.pgn",
		ScriptedResponse::chunks(200, [
			"[Event \"Open\"]\n[Round \"1.1\"]\n\n1. e4 e5 2. Nf3 *\n\n\n",
			"[Event \"Open\"]\n[Round \"1.2\"]\n\n1. d4 d5 *\n",
		])
		.with_header("content-type", "application/x-chess-pgn"),
	);

	let games = client(&transport)
		.pgn(&catalog::BROADCAST_ROUND_PGN, round("r1"))
		.await
		.expect("Round export should open.")
		.to_vec()
		.await
		.expect("Round export should decode.");

	assert_eq!(games.len(), 2);
	assert_eq!(games[0].tag("Round"), Some("1.1"));
	assert_eq!(games[1].moves, "1. d4 d5 *");
	assert_eq!(transport.requests()[0].header("accept"), Some("application/x-chess-pgn"));
	assert_eq!(transport.open_connections(), 0);
}

#[tokio::test]
async fn live_round_pgn_reassembles_games_across_chunks() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(
		Method::Get,
		"/api/stream/broadcast/round/r1.pgn",
		ScriptedResponse::chunks(200, [
			"[White \"Carlsen, Magnus\"]\n[Bla",
			"ck \"Nepomniachtchi, Ian\"]\n\n1. e4",
			" e5 *\n\n[White \"Ding, Liren\"]\n\n1. d4 *\n\n",
		])
		.then_pend(),
	);

	let mut games = client(&transport)
		.pgn(&catalog::BROADCAST_STREAM_ROUND, round("r1"))
		.await
		.expect("Round stream should open.");
	let first = games.next().await.and_then(Result::ok).expect("First game should arrive.");
	let second = games.next().await.and_then(Result::ok).expect("Second game should arrive.");

	assert_eq!(first.tag("Black"), Some("Nepomniachtchi, Ian"));
	assert_eq!(first.moves, "1. e4 e5 *");
	assert_eq!(second.tag("White"), Some("Ding, Liren"));

	drop(games);

	assert_eq!(transport.open_connections(), 0);
}

#[tokio::test]
async fn sequences_work_as_streams() {
	let transport = Arc::new(MemoryTransport::new());

	transport.route(
		Method::Get,
		"/api/broadcast",
		ScriptedResponse::ndjson([r#"{"id":"t1"}"#, r#"{"id":"t2"}"#, r#"{"id":"t3"}"#]),
	);

	let ids = client(&transport)
		.many::<Tour>(&catalog::BROADCAST_OFFICIAL, ())
		.await
		.expect("Broadcast feed should open.")
		.take(2)
		.map(|tour| tour.map(|tour| tour.id))
		.collect::<Vec<_>>()
		.await;

	assert_eq!(ids.len(), 2);
	assert!(ids.iter().all(Result::is_ok));
	assert_eq!(transport.open_connections(), 0);
}
