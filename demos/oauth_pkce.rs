//! Runs the loopback PKCE flow against lichess.org and prints the granted scopes.
//!
//! Open the printed URL in a browser and approve the request; the session ends on its own
//! once the redirect arrives or after two minutes.

// crates.io
use color_eyre::Result;
// self
use lichess_api_core::{
	Client,
	auth::Scope,
	flows::{PkceRequest, RedirectTarget},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let client = Client::new()?;
	let request = PkceRequest::new("lichess-api-core-demo")
		.with_scopes([Scope::PuzzleRead, Scope::ChallengeRead])
		.with_redirect(RedirectTarget::Loopback { path: "/callback".into(), port: 0 });
	let handle = client.authorize_pkce(request).await?;
	let mut states = handle.subscribe();

	println!("Open {} to authorize.", handle.authorize_url());

	tokio::spawn(async move {
		while states.changed().await.is_ok() {
			println!("Session is now {}.", states.borrow_and_update().as_str());
		}
	});

	let credential = handle.wait().await?;
	let scopes = client.scopes_of(&credential).await?;

	println!("Granted scopes: {scopes}.");

	Ok(())
}
