//! Drives the executor against a scripted in-memory transport.
//!
//! Nothing leaves the process, which makes this the quickest way to see how streamed results,
//! skipped lines, and scope checks behave.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use serde::Deserialize;
// self
use lichess_api_core::{
	Client, ClientConfig,
	auth::{Credential, Scope},
	endpoint::{Method, catalog},
	http::{MemoryTransport, ScriptedResponse},
};

#[derive(Debug, Deserialize)]
struct Event {
	r#type: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let transport = Arc::new(MemoryTransport::new());

	transport
		.route(
			Method::Get,
			"/api/account",
			ScriptedResponse::json(200, r#"{"id":"demo"}"#)
				.with_header("x-oauth-scopes", "challenge:read"),
		)
		.route(
			Method::Get,
			"/api/stream/event",
			ScriptedResponse::ndjson([
				r#"{"type":"challenge"}"#,
				"",
				r#"{"type":"gameStart"}"#,
				"not json",
				r#"{"type":"gameFinish"}"#,
			])
			.then_pend(),
		);

	let client = Client::with_transport(ClientConfig::lichess()?, transport.clone())
		.with_credential(Credential::bearer("lip_demo"));

	println!("challenge:read granted: {}.", client.has_scope(Scope::ChallengeRead).await?);
	println!("study:write granted: {}.", client.has_scope(Scope::StudyWrite).await?);

	let mut events = client.many::<Event>(&catalog::STREAM_EVENTS, ()).await?;

	for _ in 0..3 {
		if let Some(event) = events.next().await {
			println!("Event: {}.", event?.r#type);
		}
	}

	println!("Skipped lines: {}.", events.skipped());
	println!("Open connections before drop: {}.", transport.open_connections());

	drop(events);

	println!("Open connections after drop: {}.", transport.open_connections());
	println!("Requests sent: {}.", transport.calls());

	Ok(())
}
