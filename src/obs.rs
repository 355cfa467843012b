//! Optional observability helpers for API calls, streams, and the PKCE flow.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `lichess_api.call` with the `kind` and `endpoint`
//!   fields, plus debug events for skipped stream frames, unreadable error bodies, and PKCE
//!   state transitions.
//! - Enable `metrics` to increment `lichess_api_call_total` (labeled by `kind` + `outcome`),
//!   `lichess_api_stream_skipped_total` (labeled by `endpoint`), and
//!   `lichess_api_pkce_transition_total` (labeled by `state`).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Call kinds observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
	/// Single-valued executor call.
	One,
	/// Many-valued executor call (buffered or streamed).
	Many,
	/// Scope introspection round trip.
	Introspect,
	/// Authorization-code token exchange.
	TokenExchange,
	/// PKCE controller session.
	Pkce,
}
impl CallKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallKind::One => "one",
			CallKind::Many => "many",
			CallKind::Introspect => "introspect",
			CallKind::TokenExchange => "token_exchange",
			CallKind::Pkce => "pkce",
		}
	}
}
impl Display for CallKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Entry to a call.
	Attempt,
	/// Successful completion (including `Absent`).
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Success => "success",
			CallOutcome::Failure => "failure",
		}
	}

	/// Success or failure depending on `result`.
	pub fn of<T, E>(result: &Result<T, E>) -> Self {
		if result.is_ok() { CallOutcome::Success } else { CallOutcome::Failure }
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
