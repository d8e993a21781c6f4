//! Broker-level error types shared by the orchestrator, transport, and data client.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
///
/// Every backend-facing failure is caught at the boundary of its initiating operation and
/// carries a human-readable message—preferring the backend's `detail` field, then the
/// underlying error's own message, then a generic string. Rendering [`Error`] with `Display`
/// yields exactly the text the host should surface to the user.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Backend failed to produce an authorization URL; the user may retry.
	#[error("Failed to obtain an authorization URL: {0}")]
	Authorization(#[source] crate::http::BackendError),
	/// Backend answered the authorize call without a usable URL.
	#[error("No authorization URL received.")]
	MissingAuthorizationUrl,
	/// Host environment refused to create the authorization surface.
	#[error(transparent)]
	SurfaceBlocked(#[from] crate::surface::SurfaceError),
	/// Credential exchange failed; previously published parameters are untouched.
	#[error("Failed to retrieve credentials: {0}")]
	CredentialExchange(#[source] crate::http::BackendError),
	/// Exchange succeeded but returned an empty credential bundle.
	#[error("No credentials received.")]
	EmptyCredentials,
	/// Data load failed; the previously loaded payload is preserved.
	#[error("Failed to load provider data: {0}")]
	Load(#[source] crate::http::BackendError),
	/// A provider name has no routing mapping; a configuration defect, not user-recoverable.
	#[error(transparent)]
	UnknownProvider(#[from] crate::provider::UnknownProviderError),
	/// A completed connection exists; the connect trigger is inert until an external reset.
	#[error("Already connected; reset the integration parameters to connect again.")]
	AlreadyConnected,
	/// Another operation is still in flight on this instance.
	#[error("An operation is already in flight.")]
	Busy,
	/// Identifier validation failed before any network call was issued.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backend.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the backend.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
