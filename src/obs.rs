//! Optional observability helpers for broker operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `integration_broker.op` with the `op`
//!   (operation) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `integration_broker_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

// self
use crate::_prelude::*;

/// Broker operations observed by the instrumentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Full connect attempt, from authorize request to published credentials.
	Connect,
	/// Credential exchange issued after surface closure.
	Exchange,
	/// Provider data load.
	Load,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Connect => "connect",
			OpKind::Exchange => "exchange",
			OpKind::Load => "load",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to a broker operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller or surfaced as session state.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
