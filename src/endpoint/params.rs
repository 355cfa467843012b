//! Request parameters and the validated parameter sets the catalog endpoints accept.
//!
//! A parameter set is a plain struct whose public fields can be set independently. Nothing is
//! checked until [`ParamSpec::apply`] runs, which either yields the wire-level
//! [`RequestParams`] or a [`ValidationError`]; the executor calls it before any network I/O.

// crates.io
use url::form_urlencoded;
// self
use crate::{_prelude::*, error::ValidationError};

/// Request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
	/// `application/x-www-form-urlencoded` pairs.
	Form(Vec<(String, String)>),
	/// `text/plain` payload.
	Text(String),
}
impl Body {
	/// `Content-Type` header value.
	pub const fn content_type(&self) -> &'static str {
		match self {
			Body::Form(_) => "application/x-www-form-urlencoded",
			Body::Text(_) => "text/plain; charset=utf-8",
		}
	}

	/// Serialized body bytes.
	pub fn encode(&self) -> Vec<u8> {
		match self {
			Body::Form(pairs) =>
				form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish().into_bytes(),
			Body::Text(text) => text.clone().into_bytes(),
		}
	}
}

/// Wire-level parameters of one call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestParams {
	/// Values for the descriptor's path placeholders.
	pub path: BTreeMap<String, String>,
	/// Query pairs in insertion order.
	pub query: Vec<(String, String)>,
	/// Optional body.
	pub body: Option<Body>,
}
impl RequestParams {
	/// Empty parameters.
	pub fn new() -> Self {
		Self::default()
	}

	/// Binds a path placeholder.
	pub fn with_path(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.path.insert(name.into(), value.into());

		self
	}

	/// Appends a query pair.
	pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
		self.query.push((name.into(), value.to_string()));

		self
	}

	/// Appends a form field, turning the body into a form when needed.
	pub fn with_form(mut self, name: impl Into<String>, value: impl ToString) -> Self {
		let pair = (name.into(), value.to_string());

		match &mut self.body {
			Some(Body::Form(pairs)) => pairs.push(pair),
			_ => self.body = Some(Body::Form(vec![pair])),
		}

		self
	}

	/// Sets a plain-text body.
	pub fn with_text(mut self, text: impl Into<String>) -> Self {
		self.body = Some(Body::Text(text.into()));

		self
	}

	fn with_query_opt(self, name: &str, value: Option<impl ToString>) -> Self {
		match value {
			Some(value) => self.with_query(name, value),
			None => self,
		}
	}

	fn with_form_opt(self, name: &str, value: Option<impl ToString>) -> Self {
		match value {
			Some(value) => self.with_form(name, value),
			None => self,
		}
	}
}

/// Converts a parameter set into wire-level parameters, validating every field.
pub trait ParamSpec {
	/// Validates the fields and produces the wire-level parameters.
	fn apply(&self) -> Result<RequestParams, ValidationError>;
}
impl ParamSpec for RequestParams {
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		Ok(self.clone())
	}
}
impl ParamSpec for () {
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		Ok(RequestParams::default())
	}
}
impl<P> ParamSpec for &P
where
	P: ?Sized + ParamSpec,
{
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		(**self).apply()
	}
}

/// Side preference of the challenger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
	/// Play white.
	White,
	/// Play black.
	Black,
	/// Let the server decide.
	Random,
}
impl Color {
	/// Wire value.
	pub const fn as_str(self) -> &'static str {
		match self {
			Color::White => "white",
			Color::Black => "black",
			Color::Random => "random",
		}
	}
}
impl Display for Color {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Real-time clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Clock {
	/// Initial time in seconds.
	pub limit: u32,
	/// Increment in seconds.
	pub increment: u32,
}
impl Clock {
	/// Builds a clock from seconds.
	pub const fn new(limit: u32, increment: u32) -> Self {
		Self { limit, increment }
	}

	fn check(self) -> Result<Self, ValidationError> {
		check_range("clock.limit", self.limit.into(), 0, 10_800)?;
		check_range("clock.increment", self.increment.into(), 0, 60)?;

		Ok(self)
	}
}

/// Listing parameters for broadcast feeds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastParams {
	/// Maximum number of entries, 1..=100. Server default is 20.
	pub nb: Option<u32>,
	/// Include the leaderboard of each broadcast.
	pub leaderboard: bool,
}
impl BroadcastParams {
	/// Sets the maximum number of entries.
	pub fn with_nb(mut self, nb: u32) -> Self {
		self.nb = Some(nb);

		self
	}
}
impl ParamSpec for BroadcastParams {
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		if let Some(nb) = self.nb {
			check_range("nb", nb.into(), 1, 100)?;
		}

		let params = RequestParams::new().with_query_opt("nb", self.nb);

		Ok(if self.leaderboard { params.with_query("leaderboard", true) } else { params })
	}
}

/// Form for creating (`tour_id: None`) or updating a broadcast tournament.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastForm {
	/// Tournament to update; `None` creates a new one.
	pub tour_id: Option<String>,
	/// Name, 3..=80 characters.
	pub name: String,
	/// Markdown description, at most 20000 characters.
	pub description: Option<String>,
	/// Tier 3 (normal), 4 (high), or 5 (best).
	pub tier: Option<u8>,
	/// Compute a leaderboard from game results.
	pub auto_leaderboard: bool,
	/// Show a team table.
	pub team_table: bool,
}
impl BroadcastForm {
	/// Form for a new tournament.
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), ..Default::default() }
	}
}
impl ParamSpec for BroadcastForm {
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		check_len("name", &self.name, 3, 80)?;

		if let Some(description) = &self.description {
			check_len("description", description, 0, 20_000)?;
		}
		if let Some(tier) = self.tier {
			check_range("tier", tier.into(), 3, 5)?;
		}

		let mut params = RequestParams::new()
			.with_form("name", &self.name)
			.with_form_opt("description", self.description.as_deref())
			.with_form_opt("tier", self.tier)
			.with_form("autoLeaderboard", self.auto_leaderboard)
			.with_form("teamTable", self.team_table);

		if let Some(tour_id) = &self.tour_id {
			params = params.with_path("tour_id", tour_id);
		}

		Ok(params)
	}
}

/// Form for creating (`Tour`) or updating (`Round`) a broadcast round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundForm {
	/// Tournament receiving a new round, or the round being edited.
	pub target: RoundTarget,
	/// Name, 3..=80 characters.
	pub name: String,
	/// URL the server polls for PGN.
	pub sync_url: Option<Url>,
	/// Start time as Unix milliseconds.
	pub starts_at: Option<i64>,
	/// Transmission delay in seconds, 0..=3600.
	pub delay: Option<u32>,
}
/// Target of a [`RoundForm`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundTarget {
	/// Create a round in this tournament.
	Tour(String),
	/// Update this round.
	Round(String),
}
impl RoundForm {
	/// Form targeting `target` with the given name.
	pub fn new(target: RoundTarget, name: impl Into<String>) -> Self {
		Self { target, name: name.into(), sync_url: None, starts_at: None, delay: None }
	}
}
impl ParamSpec for RoundForm {
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		check_len("name", &self.name, 3, 80)?;

		if let Some(delay) = self.delay {
			check_range("delay", delay.into(), 0, 3_600)?;
		}

		let params = match &self.target {
			RoundTarget::Tour(id) => RequestParams::new().with_path("tour_id", id),
			RoundTarget::Round(id) => RequestParams::new().with_path("round_id", id),
		};

		Ok(params
			.with_form("name", &self.name)
			.with_form_opt("syncUrl", self.sync_url.as_ref())
			.with_form_opt("startsAt", self.starts_at)
			.with_form_opt("delay", self.delay))
	}
}

/// PGN pushed to a broadcast round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushPgn {
	/// Round receiving the games.
	pub round_id: String,
	/// One or more PGN games.
	pub pgn: String,
}
impl ParamSpec for PushPgn {
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		if self.pgn.trim().is_empty() {
			return Err(ValidationError::EmptyValue { field: "pgn" });
		}

		Ok(RequestParams::new().with_path("round_id", &self.round_id).with_text(&self.pgn))
	}
}

/// Challenge to another player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeParams {
	/// Opponent.
	pub username: String,
	/// Rated game.
	pub rated: bool,
	/// Real-time clock; mutually exclusive with `days` on the server side.
	pub clock: Option<Clock>,
	/// Correspondence days per move, 1..=14.
	pub days: Option<u8>,
	/// Side preference.
	pub color: Option<Color>,
	/// Variant key, e.g. `standard` or `chess960`.
	pub variant: Option<String>,
	/// Custom initial position.
	pub fen: Option<String>,
}
impl ChallengeParams {
	/// Casual challenge with server defaults.
	pub fn new(username: impl Into<String>) -> Self {
		Self {
			username: username.into(),
			rated: false,
			clock: None,
			days: None,
			color: None,
			variant: None,
			fen: None,
		}
	}

	/// Sets a real-time clock.
	pub fn with_clock(mut self, clock: Clock) -> Self {
		self.clock = Some(clock);

		self
	}
}
impl ParamSpec for ChallengeParams {
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		let clock = self.clock.map(Clock::check).transpose()?;

		if let Some(days) = self.days {
			check_range("days", days.into(), 1, 14)?;
		}

		Ok(RequestParams::new()
			.with_path("username", &self.username)
			.with_form("rated", self.rated)
			.with_form_opt("clock.limit", clock.map(|c| c.limit))
			.with_form_opt("clock.increment", clock.map(|c| c.increment))
			.with_form_opt("days", self.days)
			.with_form_opt("color", self.color)
			.with_form_opt("variant", self.variant.as_deref())
			.with_form_opt("fen", self.fen.as_deref()))
	}
}

/// Game against the AI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeAiParams {
	/// Strength; values outside 1..=8 are clamped.
	pub level: u8,
	/// Real-time clock.
	pub clock: Option<Clock>,
	/// Correspondence days per move, 1..=14.
	pub days: Option<u8>,
	/// Side preference.
	pub color: Option<Color>,
	/// Variant key.
	pub variant: Option<String>,
	/// Custom initial position.
	pub fen: Option<String>,
}
impl ChallengeAiParams {
	/// AI game at `level`.
	pub fn new(level: u8) -> Self {
		Self { level, clock: None, days: None, color: None, variant: None, fen: None }
	}
}
impl ParamSpec for ChallengeAiParams {
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		let clock = self.clock.map(Clock::check).transpose()?;

		if let Some(days) = self.days {
			check_range("days", days.into(), 1, 14)?;
		}

		Ok(RequestParams::new()
			.with_form("level", self.level.clamp(1, 8))
			.with_form_opt("clock.limit", clock.map(|c| c.limit))
			.with_form_opt("clock.increment", clock.map(|c| c.increment))
			.with_form_opt("days", self.days)
			.with_form_opt("color", self.color)
			.with_form_opt("variant", self.variant.as_deref())
			.with_form_opt("fen", self.fen.as_deref()))
	}
}

/// Reason attached to a declined challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclineReason {
	/// No particular reason.
	Generic,
	/// Not now.
	Later,
	/// Time control too fast.
	TooFast,
	/// Time control too slow.
	TooSlow,
	/// Time control not accepted.
	TimeControl,
	/// Only rated games.
	Rated,
	/// Only casual games.
	Casual,
	/// Only standard chess.
	Standard,
	/// Variant not accepted.
	Variant,
	/// No bots.
	NoBot,
	/// Only bots.
	OnlyBot,
}
impl DeclineReason {
	/// Wire value.
	pub const fn as_str(self) -> &'static str {
		match self {
			DeclineReason::Generic => "generic",
			DeclineReason::Later => "later",
			DeclineReason::TooFast => "tooFast",
			DeclineReason::TooSlow => "tooSlow",
			DeclineReason::TimeControl => "timeControl",
			DeclineReason::Rated => "rated",
			DeclineReason::Casual => "casual",
			DeclineReason::Standard => "standard",
			DeclineReason::Variant => "variant",
			DeclineReason::NoBot => "noBot",
			DeclineReason::OnlyBot => "onlyBot",
		}
	}
}

/// Declines `challenge_id`, optionally with a reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclineParams {
	/// Challenge being declined.
	pub challenge_id: String,
	/// Reason shown to the challenger.
	pub reason: Option<DeclineReason>,
}
impl ParamSpec for DeclineParams {
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		Ok(RequestParams::new()
			.with_path("challenge_id", &self.challenge_id)
			.with_form_opt("reason", self.reason.map(DeclineReason::as_str)))
	}
}

/// Puzzle storm dashboard lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StormParams {
	/// Player.
	pub username: String,
	/// Days of history, 0..=365. Server default is 30.
	pub days: Option<u16>,
}
impl ParamSpec for StormParams {
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		if let Some(days) = self.days {
			check_range("days", days.into(), 0, 365)?;
		}

		Ok(RequestParams::new().with_path("username", &self.username).with_query_opt("days", self.days))
	}
}

/// Status lookup for up to 100 users.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsersStatusParams {
	/// User identifiers.
	pub ids: Vec<String>,
	/// Include the identifier of the game each user is playing.
	pub with_game_ids: bool,
}
impl ParamSpec for UsersStatusParams {
	fn apply(&self) -> Result<RequestParams, ValidationError> {
		if self.ids.is_empty() {
			return Err(ValidationError::EmptyValue { field: "ids" });
		}

		check_range("ids", self.ids.len() as i64, 1, 100)?;

		let params = RequestParams::new().with_query("ids", self.ids.join(","));

		Ok(if self.with_game_ids { params.with_query("withGameIds", true) } else { params })
	}
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), ValidationError> {
	if (min..=max).contains(&value) {
		Ok(())
	} else {
		Err(ValidationError::OutOfRange { field, min, max, value })
	}
}

fn check_len(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
	let len = value.chars().count();

	if (min..=max).contains(&len) {
		Ok(())
	} else {
		Err(ValidationError::InvalidLength { field, min, max, len })
	}
}
