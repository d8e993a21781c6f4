//! Shared integration parameters cell connecting the orchestrator to its consumers.

// self
use crate::{_prelude::*, auth::Credentials, provider::ProviderType};

/// Snapshot of the shared integration parameters record.
///
/// Invariant: `credentials` is populated if and only if `provider` is—a completed connection
/// sets both fields atomically, and a reset clears both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationParams {
	/// Provider the credentials belong to, when a completed connection exists.
	pub provider: Option<ProviderType>,
	/// Exchanged credential bundle, when a completed connection exists.
	pub credentials: Option<Credentials>,
}
impl IntegrationParams {
	/// True when a completed connection exists.
	pub fn is_connected(&self) -> bool {
		self.credentials.is_some()
	}
}

/// Single-writer cell holding the shared [`IntegrationParams`] record.
///
/// Exactly two mutations exist: the orchestrator's publish step on a successful exchange
/// (crate-private) and the parent coordinator's [`reset`](ParamsCell::reset). Every other
/// party reads snapshots. Clones share the same underlying record.
#[derive(Clone, Debug, Default)]
pub struct ParamsCell(Arc<RwLock<IntegrationParams>>);
impl ParamsCell {
	/// Creates an empty cell.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns a copy of the current record.
	pub fn snapshot(&self) -> IntegrationParams {
		self.0.read().clone()
	}

	/// Publishes a completed connection; both fields are set in one assignment.
	pub(crate) fn publish(&self, provider: ProviderType, credentials: Credentials) {
		*self.0.write() =
			IntegrationParams { provider: Some(provider), credentials: Some(credentials) };
	}

	/// Clears both fields; the parent coordinator's reset path.
	pub fn reset(&self) {
		*self.0.write() = IntegrationParams::default();
	}
}
