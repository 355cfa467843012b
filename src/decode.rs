//! Response decoding: the single-result type, JSON decoding with paths, and PGN games.

// self
use crate::{_prelude::*, error::DecodeError};

/// Body-less success marker for endpoints that answer `{"ok":true}` or nothing at all.
pub type Ack = serde::de::IgnoredAny;

/// Outcome of a single-valued call.
///
/// `Absent` is distinct from `Fail`: the remote answered 404 for a well-formed request.
#[derive(Debug)]
pub enum One<T> {
	/// The value was returned.
	Present(T),
	/// The remote has no such entity.
	Absent,
	/// The call failed.
	Fail(Error),
}
impl<T> One<T> {
	/// Converts into `Result<Option<T>>`, mapping `Absent` to `Ok(None)`.
	pub fn into_result(self) -> Result<Option<T>> {
		match self {
			One::Present(value) => Ok(Some(value)),
			One::Absent => Ok(None),
			One::Fail(err) => Err(err),
		}
	}

	/// Present value, if any, discarding errors.
	pub fn ok(self) -> Option<T> {
		match self {
			One::Present(value) => Some(value),
			_ => None,
		}
	}

	/// Maps the present value.
	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> One<U> {
		match self {
			One::Present(value) => One::Present(f(value)),
			One::Absent => One::Absent,
			One::Fail(err) => One::Fail(err),
		}
	}

	/// Returns true for `Present`.
	pub fn is_present(&self) -> bool {
		matches!(self, One::Present(_))
	}

	/// Returns true for `Absent`.
	pub fn is_absent(&self) -> bool {
		matches!(self, One::Absent)
	}

	/// Error, if the call failed.
	pub fn err(&self) -> Option<&Error> {
		match self {
			One::Fail(err) => Some(err),
			_ => None,
		}
	}
}
impl<T> From<Result<Option<T>>> for One<T> {
	fn from(result: Result<Option<T>>) -> Self {
		match result {
			Ok(Some(value)) => One::Present(value),
			Ok(None) => One::Absent,
			Err(err) => One::Fail(err),
		}
	}
}
impl<T> From<Error> for One<T> {
	fn from(err: Error) -> Self {
		One::Fail(err)
	}
}

/// Decodes a JSON document, recording the path of the first mismatch.
///
/// An empty (or whitespace-only) body decodes as `null`, so `Option<T>` and [`Ack`] accept it.
pub fn decode_json<T>(bytes: &[u8]) -> Result<T, DecodeError>
where
	T: DeserializeOwned,
{
	let bytes = if bytes.iter().all(u8::is_ascii_whitespace) { b"null".as_slice() } else { bytes };
	let mut deserializer = serde_json::Deserializer::from_slice(bytes);
	let value = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| DecodeError::Json { source })?;

	deserializer.end().map_err(|source| DecodeError::Syntax { source })?;

	Ok(value)
}

/// Decodes a PGN game from UTF-8 bytes.
pub fn decode_pgn(bytes: &[u8]) -> Result<Pgn, DecodeError> {
	std::str::from_utf8(bytes)?.parse()
}

/// One PGN game: tag pairs followed by movetext.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pgn {
	/// Tag pairs in file order.
	pub tags: Vec<(String, String)>,
	/// Movetext, lines joined by a single space.
	pub moves: String,
}
impl Pgn {
	/// Value of the first tag named `name`.
	pub fn tag(&self, name: &str) -> Option<&str> {
		self.tags.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}
}
impl FromStr for Pgn {
	type Err = DecodeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut pgn = Pgn::default();
		let mut moves = Vec::new();

		for line in s.lines().map(str::trim).filter(|line| !line.is_empty()) {
			if let Some(tag) = line.strip_prefix('[') {
				if !moves.is_empty() {
					return Err(DecodeError::Pgn { reason: "tag pair after movetext" });
				}

				pgn.tags.push(parse_tag(tag)?);
			} else {
				moves.push(line);
			}
		}

		if pgn.tags.is_empty() && moves.is_empty() {
			return Err(DecodeError::Pgn { reason: "empty game" });
		}

		pgn.moves = moves.join(" ");

		Ok(pgn)
	}
}
impl Display for Pgn {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		for (key, value) in &self.tags {
			writeln!(f, "[{key} \"{}\"]", value.replace('\\', "\\\\").replace('"', "\\\""))?;
		}

		if !self.tags.is_empty() {
			writeln!(f)?;
		}

		writeln!(f, "{}", self.moves)
	}
}

fn parse_tag(tag: &str) -> Result<(String, String), DecodeError> {
	let malformed = DecodeError::Pgn { reason: "malformed tag pair" };
	let inner = tag.strip_suffix(']').ok_or(DecodeError::Pgn { reason: "unterminated tag pair" })?;
	let (key, rest) = inner.split_once(char::is_whitespace).ok_or(DecodeError::Pgn {
		reason: "tag pair without value",
	})?;
	let quoted = rest.trim().strip_prefix('"').and_then(|v| v.strip_suffix('"')).ok_or(malformed)?;
	let mut value = String::with_capacity(quoted.len());
	let mut escaped = false;

	for c in quoted.chars() {
		match (c, escaped) {
			('\\', false) => escaped = true,
			(c, _) => {
				value.push(c);

				escaped = false;
			},
		}
	}

	Ok((key.to_owned(), value))
}
