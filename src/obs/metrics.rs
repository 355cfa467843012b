// self
use crate::{
	error::DecodeError,
	flows::FlowState,
	obs::{CallKind, CallOutcome},
};

/// Records a call outcome via the global metrics recorder (when enabled).
pub fn record_call_outcome(kind: CallKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"lichess_api_call_total",
			"kind" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a stream frame that failed to decode and was skipped.
pub fn record_skipped_frame(endpoint: &'static str, error: &DecodeError) {
	#[cfg(feature = "tracing")]
	tracing::debug!(endpoint, %error, "Skipping undecodable stream frame.");

	#[cfg(feature = "metrics")]
	{
		metrics::counter!("lichess_api_stream_skipped_total", "endpoint" => endpoint).increment(1);
	}

	#[cfg(not(any(feature = "tracing", feature = "metrics")))]
	{
		let _ = (endpoint, error);
	}
	#[cfg(all(feature = "metrics", not(feature = "tracing")))]
	{
		let _ = error;
	}
}

/// Records a PKCE controller transition.
pub fn record_transition(from: FlowState, to: FlowState) {
	#[cfg(feature = "tracing")]
	tracing::debug!(from = from.as_str(), to = to.as_str(), "PKCE session transitioned.");

	#[cfg(feature = "metrics")]
	{
		metrics::counter!("lichess_api_pkce_transition_total", "state" => to.as_str()).increment(1);
	}

	#[cfg(not(any(feature = "tracing", feature = "metrics")))]
	{
		let _ = (from, to);
	}
	#[cfg(all(feature = "metrics", not(feature = "tracing")))]
	{
		let _ = from;
	}
}
