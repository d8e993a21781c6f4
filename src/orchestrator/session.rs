//! Session status and per-attempt bookkeeping for the connection orchestrator.

// crates.io
use tokio::task::AbortHandle;
// self
use crate::_prelude::*;

/// Lifecycle of a connect attempt.
///
/// `Connected` is sticky: no internal transition leaves it. Only the parent coordinator's
/// reset returns the session to `Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionStatus {
	/// No attempt in flight and no completed connection.
	#[default]
	Idle,
	/// Authorization URL request in flight.
	Requesting,
	/// Surface open; waiting for the user to finish and close it.
	AwaitingUser,
	/// Credential exchange in flight.
	Exchanging,
	/// Credentials published; the connect trigger is inert until an external reset.
	Connected,
	/// Attempt failed; the user may retry from the start.
	Failed,
}
impl SessionStatus {
	/// True while a connect attempt is in flight (the busy state of the connect trigger).
	pub const fn is_connecting(self) -> bool {
		matches!(
			self,
			SessionStatus::Requesting | SessionStatus::AwaitingUser | SessionStatus::Exchanging
		)
	}

	/// True once the attempt has settled in a terminal state.
	pub const fn is_settled(self) -> bool {
		matches!(self, SessionStatus::Connected | SessionStatus::Failed)
	}

	/// Returns a stable label suitable for span fields and logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			SessionStatus::Idle => "idle",
			SessionStatus::Requesting => "requesting",
			SessionStatus::AwaitingUser => "awaiting_user",
			SessionStatus::Exchanging => "exchanging",
			SessionStatus::Connected => "connected",
			SessionStatus::Failed => "failed",
		}
	}
}
impl Display for SessionStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Mutable per-attempt state owned by the orchestrator.
///
/// `generation` identifies the current attempt; results carrying a stale generation are
/// discarded on arrival. `poller` is the abort handle of the active closure-poll task, if any.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
	pub(crate) generation: u64,
	pub(crate) poller: Option<AbortHandle>,
	pub(crate) last_error: Option<String>,
}
