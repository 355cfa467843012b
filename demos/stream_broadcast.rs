//! Reads the first official broadcasts from lichess.org as they stream in.

// crates.io
use color_eyre::Result;
use serde::Deserialize;
// self
use lichess_api_core::{
	Client,
	endpoint::{BroadcastParams, catalog},
};

#[derive(Debug, Deserialize)]
struct Broadcast {
	tour: Tour,
	#[serde(default)]
	rounds: Vec<Round>,
}

#[derive(Debug, Deserialize)]
struct Tour {
	id: String,
	name: String,
}

#[derive(Debug, Deserialize)]
struct Round {
	name: String,
	#[serde(default)]
	ongoing: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let client = Client::new()?;
	let mut broadcasts = client
		.many::<Broadcast>(&catalog::BROADCAST_OFFICIAL, BroadcastParams::default().with_nb(5))
		.await?;

	while let Some(broadcast) = broadcasts.next().await {
		let broadcast = broadcast?;
		let live = broadcast.rounds.iter().filter(|round| round.ongoing).map(|round| round.name.as_str());

		println!("{} ({}): {}", broadcast.tour.name, broadcast.tour.id, live.collect::<Vec<_>>().join(", "));
	}

	if broadcasts.skipped() > 0 {
		println!("Skipped {} lines that did not match the expected shape.", broadcasts.skipped());
	}

	Ok(())
}
