//! Interactive authorization flows.

pub mod auth_code_pkce;

pub use auth_code_pkce::*;

/// Lifecycle of a PKCE authorization session.
///
/// States only move forward; the four terminal states are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowState {
	/// Session created, nothing issued yet.
	Idle,
	/// Authorization URL issued; the user has to open it.
	AwaitingUserAction,
	/// Waiting for the redirect carrying the code.
	AwaitingRedirect,
	/// Code accepted, token request in flight.
	ExchangingCode,
	/// Token obtained.
	Completed,
	/// Denied by the user or rejected by the token endpoint.
	Failed,
	/// Deadline elapsed first.
	TimedOut,
	/// Cancelled by the caller.
	Cancelled,
}
impl FlowState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowState::Idle => "idle",
			FlowState::AwaitingUserAction => "awaiting_user_action",
			FlowState::AwaitingRedirect => "awaiting_redirect",
			FlowState::ExchangingCode => "exchanging_code",
			FlowState::Completed => "completed",
			FlowState::Failed => "failed",
			FlowState::TimedOut => "timed_out",
			FlowState::Cancelled => "cancelled",
		}
	}

	/// Returns true for `Completed`, `Failed`, `TimedOut`, and `Cancelled`.
	pub const fn is_terminal(self) -> bool {
		matches!(
			self,
			FlowState::Completed | FlowState::Failed | FlowState::TimedOut | FlowState::Cancelled
		)
	}

	/// Whether a session in this state may move to `next`.
	pub const fn can_advance_to(self, next: FlowState) -> bool {
		!self.is_terminal() && next.rank() > self.rank()
	}

	const fn rank(self) -> u8 {
		match self {
			FlowState::Idle => 0,
			FlowState::AwaitingUserAction => 1,
			FlowState::AwaitingRedirect => 2,
			FlowState::ExchangingCode => 3,
			FlowState::Completed | FlowState::Failed | FlowState::TimedOut | FlowState::Cancelled =>
				4,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn transitions_only_move_forward() {
		assert!(FlowState::Idle.can_advance_to(FlowState::AwaitingUserAction));
		assert!(FlowState::AwaitingRedirect.can_advance_to(FlowState::TimedOut));
		assert!(FlowState::ExchangingCode.can_advance_to(FlowState::Completed));
		assert!(!FlowState::ExchangingCode.can_advance_to(FlowState::AwaitingRedirect));
		assert!(!FlowState::AwaitingRedirect.can_advance_to(FlowState::AwaitingRedirect));

		for terminal in
			[FlowState::Completed, FlowState::Failed, FlowState::TimedOut, FlowState::Cancelled]
		{
			assert!(terminal.is_terminal());
			assert!(!terminal.can_advance_to(FlowState::Failed));
		}
	}
}
