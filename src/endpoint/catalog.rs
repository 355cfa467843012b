//! Descriptor table for the operations the client exposes.

// self
use crate::{
	auth::Scope,
	endpoint::{EndpointDescriptor as E, Framing},
};

/// Account profile. Also answers scope introspection through `X-OAuth-Scopes`.
pub static ACCOUNT_PROFILE: E = E::get("account.profile", "/api/account");
/// Account email address.
pub static ACCOUNT_EMAIL: E = E::get("account.email", "/api/account/email").scope(Scope::EmailRead);
/// Authorization-code token exchange.
pub static OAUTH_TOKEN: E = E::post("oauth.token", "/api/token");
/// Revokes the attached credential.
pub static TOKEN_REVOKE: E = E::delete("token.revoke", "/api/token");
/// Tests many tokens at once.
pub static TOKEN_TEST: E = E::post("token.test", "/api/token/test");

/// Official broadcasts, newest first.
pub static BROADCAST_OFFICIAL: E = E::get("broadcast.official", "/api/broadcast").streamed(Framing::Ndjson);
/// Live PGN stream of one broadcast round.
pub static BROADCAST_STREAM_ROUND: E =
	E::get("broadcast.stream_round", "/api/stream/broadcast/round/{round_id}.pgn")
		.streamed(Framing::Pgn);
/// All games of one broadcast round.
pub static BROADCAST_ROUND_PGN: E =
	E::get("broadcast.round_pgn", "/api/broadcast/round/{round_id}.pgn").many(Framing::Pgn);
/// All games of every round of a broadcast tournament.
pub static BROADCAST_TOUR_PGN: E =
	E::get("broadcast.tour_pgn", "/api/broadcast/{tour_id}.pgn").many(Framing::Pgn);
/// One broadcast tournament.
pub static BROADCAST_BY_ID: E = E::get("broadcast.by_id", "/api/broadcast/{tour_id}");
/// One broadcast round.
pub static BROADCAST_ROUND_BY_ID: E = E::get("broadcast.round_by_id", "/api/broadcast/-/-/{round_id}");
/// Rounds of broadcasts the user is a member of.
pub static BROADCAST_MY_ROUNDS: E = E::get("broadcast.my_rounds", "/api/broadcast/my-rounds")
	.scope(Scope::StudyRead)
	.streamed(Framing::Ndjson);
/// Creates a broadcast tournament.
pub static BROADCAST_CREATE: E = E::post("broadcast.create", "/broadcast/new").scope(Scope::StudyWrite);
/// Updates a broadcast tournament.
pub static BROADCAST_UPDATE: E =
	E::post("broadcast.update", "/broadcast/{tour_id}/edit").scope(Scope::StudyWrite);
/// Creates a round in a broadcast tournament.
pub static BROADCAST_ROUND_CREATE: E =
	E::post("broadcast.round_create", "/broadcast/{tour_id}/new").scope(Scope::StudyWrite);
/// Updates a broadcast round.
pub static BROADCAST_ROUND_UPDATE: E =
	E::post("broadcast.round_update", "/broadcast/round/{round_id}/edit").scope(Scope::StudyWrite);
/// Removes every game from a broadcast round.
pub static BROADCAST_ROUND_RESET: E =
	E::post("broadcast.round_reset", "/api/broadcast/round/{round_id}/reset").scope(Scope::StudyWrite);
/// Pushes PGN text to a broadcast round.
pub static BROADCAST_ROUND_PUSH: E =
	E::post("broadcast.round_push", "/api/broadcast/round/{round_id}/push").scope(Scope::StudyWrite);

/// Incoming events (challenges, game starts) for the authenticated user.
pub static STREAM_EVENTS: E =
	E::get("board.stream_events", "/api/stream/event").scope(Scope::ChallengeRead).streamed(Framing::Ndjson);
/// Pending incoming and outgoing challenges.
pub static CHALLENGE_LIST: E = E::get("challenge.list", "/api/challenge").scope(Scope::ChallengeRead);
/// Challenges another player.
pub static CHALLENGE_CREATE: E =
	E::post("challenge.create", "/api/challenge/{username}").scope(Scope::ChallengeWrite);
/// Challenges another player and keeps the challenge alive while the stream is open.
pub static CHALLENGE_CREATE_KEEPALIVE: E =
	E::post("challenge.create_keepalive", "/api/challenge/{username}")
		.scope(Scope::ChallengeWrite)
		.streamed(Framing::Ndjson);
/// One challenge.
pub static CHALLENGE_SHOW: E =
	E::get("challenge.show", "/api/challenge/{challenge_id}/show").scope(Scope::ChallengeRead);
/// Starts a game against the AI.
pub static CHALLENGE_AI: E = E::post("challenge.ai", "/api/challenge/ai").scope(Scope::ChallengeWrite);
/// Cancels a challenge.
pub static CHALLENGE_CANCEL: E =
	E::post("challenge.cancel", "/api/challenge/{challenge_id}/cancel").scope(Scope::ChallengeWrite);
/// Accepts an incoming challenge.
pub static CHALLENGE_ACCEPT: E =
	E::post("challenge.accept", "/api/challenge/{challenge_id}/accept").scope(Scope::ChallengeWrite);
/// Declines an incoming challenge.
pub static CHALLENGE_DECLINE: E =
	E::post("challenge.decline", "/api/challenge/{challenge_id}/decline").scope(Scope::ChallengeWrite);

/// Daily puzzle.
pub static PUZZLE_DAILY: E = E::get("puzzle.daily", "/api/puzzle/daily");
/// One puzzle.
pub static PUZZLE_BY_ID: E = E::get("puzzle.by_id", "/api/puzzle/{puzzle_id}");
/// Puzzle storm dashboard of a player.
pub static STORM_DASHBOARD: E = E::get("puzzle.storm_dashboard", "/api/storm/dashboard/{username}");

/// Recently finished, ongoing, and upcoming simuls.
pub static SIMULS: E = E::get("simul.list", "/api/simul");
/// Online, playing, and streaming flags of many users.
pub static USERS_STATUS: E = E::get("users.status", "/api/users/status").many(Framing::JsonArray);

/// Every descriptor above.
pub static ALL: &[&E] = &[
	&ACCOUNT_PROFILE,
	&ACCOUNT_EMAIL,
	&OAUTH_TOKEN,
	&TOKEN_REVOKE,
	&TOKEN_TEST,
	&BROADCAST_OFFICIAL,
	&BROADCAST_STREAM_ROUND,
	&BROADCAST_ROUND_PGN,
	&BROADCAST_TOUR_PGN,
	&BROADCAST_BY_ID,
	&BROADCAST_ROUND_BY_ID,
	&BROADCAST_MY_ROUNDS,
	&BROADCAST_CREATE,
	&BROADCAST_UPDATE,
	&BROADCAST_ROUND_CREATE,
	&BROADCAST_ROUND_UPDATE,
	&BROADCAST_ROUND_RESET,
	&BROADCAST_ROUND_PUSH,
	&STREAM_EVENTS,
	&CHALLENGE_LIST,
	&CHALLENGE_CREATE,
	&CHALLENGE_CREATE_KEEPALIVE,
	&CHALLENGE_SHOW,
	&CHALLENGE_AI,
	&CHALLENGE_CANCEL,
	&CHALLENGE_ACCEPT,
	&CHALLENGE_DECLINE,
	&PUZZLE_DAILY,
	&PUZZLE_BY_ID,
	&STORM_DASHBOARD,
	&SIMULS,
	&USERS_STATUS,
];

/// Looks a descriptor up by identifier.
pub fn by_id(id: &str) -> Option<&'static E> {
	ALL.iter().copied().find(|descriptor| descriptor.id == id)
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashSet;
	// self
	use super::*;

	#[test]
	fn every_descriptor_is_well_formed() {
		for descriptor in ALL {
			descriptor.validate().unwrap_or_else(|e| panic!("{}: {e}", descriptor.id));
		}
	}

	#[test]
	fn identifiers_are_unique() {
		let ids = ALL.iter().map(|descriptor| descriptor.id).collect::<HashSet<_>>();

		assert_eq!(ids.len(), ALL.len());
		assert_eq!(by_id("puzzle.daily"), Some(&PUZZLE_DAILY));
		assert_eq!(by_id("nope"), None);
	}
}
