//! OAuth scope tags and normalized scope sets.

// std
use std::collections::BTreeSet;
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError};
// self
use crate::_prelude::*;

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
	/// Scope is not one of the tags this crate models.
	#[error("Unknown scope: {scope}.")]
	Unknown {
		/// The offending scope string.
		scope: String,
	},
}

macro_rules! scopes {
	($($(#[$doc:meta])* $variant:ident => $tag:literal,)+) => {
		/// Permission tag granted to a credential.
		#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
		pub enum Scope {
			$($(#[$doc])* $variant,)+
		}
		impl Scope {
			/// Every modeled scope, in declaration order.
			pub const ALL: &'static [Scope] = &[$(Scope::$variant,)+];

			/// Returns the wire tag, e.g. `challenge:write`.
			pub const fn as_str(self) -> &'static str {
				match self {
					$(Scope::$variant => $tag,)+
				}
			}
		}
		impl FromStr for Scope {
			type Err = ScopeValidationError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				match s {
					$($tag => Ok(Scope::$variant),)+
					other => Err(ScopeValidationError::Unknown { scope: other.to_owned() }),
				}
			}
		}
	};
}

scopes! {
	/// Read preferences.
	PreferenceRead => "preference:read",
	/// Write preferences.
	PreferenceWrite => "preference:write",
	/// Read the account email address.
	EmailRead => "email:read",
	/// Read external engines.
	EngineRead => "engine:read",
	/// Create and update external engines.
	EngineWrite => "engine:write",
	/// Read incoming challenges.
	ChallengeRead => "challenge:read",
	/// Create, accept, and decline challenges.
	ChallengeWrite => "challenge:write",
	/// Create many games at once for other players.
	ChallengeBulk => "challenge:bulk",
	/// Read private studies and broadcasts.
	StudyRead => "study:read",
	/// Create, update, and delete studies and broadcasts.
	StudyWrite => "study:write",
	/// Create tournaments.
	TournamentWrite => "tournament:write",
	/// Create and join puzzle races.
	RacerWrite => "racer:write",
	/// Read puzzle activity.
	PuzzleRead => "puzzle:read",
	/// Create and join puzzle events.
	PuzzleWrite => "puzzle:write",
	/// Read private team information.
	TeamRead => "team:read",
	/// Join and leave teams.
	TeamWrite => "team:write",
	/// Manage teams the user leads.
	TeamLead => "team:lead",
	/// Read followed players.
	FollowRead => "follow:read",
	/// Follow and unfollow players.
	FollowWrite => "follow:write",
	/// Send private messages.
	MsgWrite => "msg:write",
	/// Play with the Board API.
	BoardPlay => "board:play",
	/// Play with the Bot API.
	BotPlay => "bot:play",
}

impl Display for Scope {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Normalized set of scope strings.
///
/// Entries are deduplicated and sorted. The set keeps raw strings so tags the server
/// grants but [`Scope`] does not model survive a round trip.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet(Arc<[String]>);
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		normalize(scopes).map(Self)
	}

	/// Parses the comma-separated value of an `X-OAuth-Scopes` header.
	///
	/// Blank entries are ignored, so an empty header yields an empty set.
	pub fn from_header(value: &str) -> Result<Self, ScopeValidationError> {
		Self::new(value.split(',').map(str::trim).filter(|scope| !scope.is_empty()))
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the set contains the provided raw scope string.
	pub fn contains(&self, scope: &str) -> bool {
		self.0.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Returns true if the set contains the provided scope tag.
	pub fn contains_scope(&self, scope: Scope) -> bool {
		self.contains(scope.as_str())
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	/// Modeled scope tags in the set; unknown entries are skipped.
	pub fn known(&self) -> impl Iterator<Item = Scope> + '_ {
		self.iter().filter_map(|scope| scope.parse().ok())
	}

	/// Space-delimited form used in OAuth authorization requests.
	pub fn normalized(&self) -> String {
		self.0.join(" ")
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.0).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromIterator<Scope> for ScopeSet {
	fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
		let set = iter.into_iter().map(|scope| scope.as_str().to_owned()).collect::<BTreeSet<_>>();

		Self(set.into_iter().collect())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	/// Accepts comma- or whitespace-separated lists.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}

		let parts = s.split(|c: char| c == ',' || c.is_whitespace()).filter(|p| !p.is_empty());
		let set = Self::new(parts)?;

		if set.is_empty() { Err(ScopeValidationError::Empty) } else { Ok(set) }
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_seq(self.iter())
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

fn normalize<I, S>(scopes: I) -> Result<Arc<[String]>, ScopeValidationError>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut set = BTreeSet::new();

	for scope in scopes {
		let owned: String = scope.into();

		if owned.is_empty() {
			return Err(ScopeValidationError::Empty);
		}
		if owned.chars().any(char::is_whitespace) {
			return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
		}

		set.insert(owned);
	}

	Ok(set.into_iter().collect())
}
