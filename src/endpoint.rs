//! Immutable descriptions of remote operations.
//!
//! Every call the client makes is driven by an [`EndpointDescriptor`]: a static value naming
//! the HTTP method, the path template, the scope a credential must carry, and how the
//! response body is shaped. The executor never special-cases an endpoint beyond what its
//! descriptor says.

pub mod catalog;
pub mod params;

pub use params::*;

// self
use crate::{_prelude::*, auth::Scope, error::ValidationError};

/// HTTP methods used by the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Converts to the `http` crate representation.
	pub fn as_http(self) -> http::Method {
		match self {
			Method::Get => http::Method::GET,
			Method::Post => http::Method::POST,
			Method::Put => http::Method::PUT,
			Method::Delete => http::Method::DELETE,
		}
	}

	/// Uppercase method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// How a response body is laid out on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Framing {
	/// One JSON document.
	Json,
	/// One JSON array holding every value.
	JsonArray,
	/// Newline-delimited JSON, one value per line.
	Ndjson,
	/// PGN games separated by blank lines.
	Pgn,
}
impl Framing {
	/// `Accept` header value requesting this framing.
	pub const fn media_type(self) -> &'static str {
		match self {
			Framing::Json | Framing::JsonArray => "application/json",
			Framing::Ndjson => "application/x-ndjson",
			Framing::Pgn => "application/x-chess-pgn",
		}
	}
}

/// Single- or many-valued response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseShape {
	/// Exactly one value, possibly absent.
	Single,
	/// A sequence of values framed as described.
	Many(Framing),
}
impl ResponseShape {
	/// Framing of the body.
	pub const fn framing(self) -> Framing {
		match self {
			ResponseShape::Single => Framing::Json,
			ResponseShape::Many(framing) => framing,
		}
	}
}

/// Static description of one remote operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EndpointDescriptor {
	/// Stable identifier used in errors, spans, and metrics.
	pub id: &'static str,
	/// HTTP method.
	pub method: Method,
	/// Path relative to the API base, with `{name}` placeholders.
	pub path_template: &'static str,
	/// Scope a credential must carry, when the endpoint is privileged.
	pub required_scope: Option<Scope>,
	/// Response shape.
	pub shape: ResponseShape,
	/// Whether the body stays open and values are produced as they arrive.
	pub streaming: bool,
}
impl EndpointDescriptor {
	/// Builds a single-valued, unscoped descriptor.
	pub const fn new(id: &'static str, method: Method, path_template: &'static str) -> Self {
		Self {
			id,
			method,
			path_template,
			required_scope: None,
			shape: ResponseShape::Single,
			streaming: false,
		}
	}

	/// `GET` shorthand.
	pub const fn get(id: &'static str, path_template: &'static str) -> Self {
		Self::new(id, Method::Get, path_template)
	}

	/// `POST` shorthand.
	pub const fn post(id: &'static str, path_template: &'static str) -> Self {
		Self::new(id, Method::Post, path_template)
	}

	/// `DELETE` shorthand.
	pub const fn delete(id: &'static str, path_template: &'static str) -> Self {
		Self::new(id, Method::Delete, path_template)
	}

	/// Requires `scope` from the attached credential.
	pub const fn scope(mut self, scope: Scope) -> Self {
		self.required_scope = Some(scope);

		self
	}

	/// Marks the response as many-valued with the given framing.
	pub const fn many(mut self, framing: Framing) -> Self {
		self.shape = ResponseShape::Many(framing);

		self
	}

	/// Marks the response as a live stream with the given framing.
	pub const fn streamed(mut self, framing: Framing) -> Self {
		self.shape = ResponseShape::Many(framing);
		self.streaming = true;

		self
	}

	/// Placeholder names in template order.
	pub fn placeholders(&self) -> impl Iterator<Item = &'static str> {
		let template = self.path_template;

		template.split('{').skip(1).filter_map(|rest| rest.split_once('}').map(|(name, _)| name))
	}

	/// Checks the descriptor's own consistency.
	pub fn validate(&self) -> Result<(), ValidationError> {
		let invalid = |reason| ValidationError::InvalidTemplate { endpoint: self.id, reason };

		if !self.path_template.starts_with('/') {
			return Err(invalid("template must start with `/`"));
		}

		let mut open = false;

		for c in self.path_template.chars() {
			match (c, open) {
				('{', false) => open = true,
				('}', true) => open = false,
				('{', true) => return Err(invalid("nested `{`")),
				('}', false) => return Err(invalid("unbalanced `}`")),
				_ => (),
			}
		}

		if open {
			return Err(invalid("unterminated placeholder"));
		}
		if self.placeholders().any(str::is_empty) {
			return Err(invalid("empty placeholder name"));
		}
		if self.streaming && !matches!(self.shape.framing(), Framing::Ndjson | Framing::Pgn) {
			return Err(invalid("streamed endpoints must use line framing"));
		}

		Ok(())
	}

	/// Substitutes every placeholder with its bound value.
	///
	/// Fails when a placeholder has no value, a value has no placeholder, or a value cannot be
	/// embedded in a single URL segment.
	pub fn resolve_path(&self, values: &BTreeMap<String, String>) -> Result<String, ValidationError> {
		self.validate()?;

		for name in values.keys() {
			if !self.placeholders().any(|placeholder| placeholder == name) {
				return Err(ValidationError::UnexpectedPathParam {
					endpoint: self.id,
					name: name.clone(),
				});
			}
		}

		let mut path = String::with_capacity(self.path_template.len());
		let mut rest = self.path_template;

		while let Some(start) = rest.find('{') {
			let (literal, tail) = rest.split_at(start);
			let (name, tail) = tail[1..].split_once('}').ok_or(ValidationError::InvalidTemplate {
				endpoint: self.id,
				reason: "unterminated placeholder",
			})?;
			let value = values.get(name).ok_or_else(|| ValidationError::MissingPathParam {
				endpoint: self.id,
				name: name.to_owned(),
			})?;

			check_segment(self.id, name, value)?;
			path.push_str(literal);
			path.push_str(value);

			rest = tail;
		}

		path.push_str(rest);

		Ok(path)
	}
}

fn check_segment(endpoint: &'static str, name: &str, value: &str) -> Result<(), ValidationError> {
	let invalid = |reason| ValidationError::InvalidPathParam {
		endpoint,
		name: name.to_owned(),
		reason,
	};

	if value.is_empty() {
		return Err(invalid("value is empty"));
	}
	if value == "." || value == ".." {
		return Err(invalid("value is a relative segment"));
	}
	if value.chars().any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
	{
		return Err(invalid("value contains reserved characters"));
	}

	Ok(())
}
