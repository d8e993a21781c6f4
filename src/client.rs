//! Data-access client: one guarded load at a time over previously exchanged credentials.
//!
//! The client never talks to the orchestrator. It consumes whatever credentials the shared
//! params record holds, performs a single request/response round trip per trigger, and keeps
//! the last successful payload until it is explicitly cleared. There is no retry and no state
//! machine beyond idle/busy.

// self
use crate::{
	_prelude::*,
	auth::Credentials,
	http::BackendApi,
	obs::{self, OpKind, OpOutcome, OpSpan},
	provider::ProviderType,
};

/// Loads provider data one request at a time and retains the last payload.
///
/// At most one load is in flight per client instance; concurrent triggers are rejected with
/// [`Error::Busy`] rather than queued. Clones share the same busy guard and payload.
#[derive(Clone)]
pub struct DataClient {
	inner: Arc<ClientInner>,
}

struct ClientInner {
	api: Arc<dyn BackendApi>,
	busy: AsyncMutex<()>,
	last_loaded: Mutex<Option<Json>>,
}
impl DataClient {
	/// Creates a client over the provided backend transport.
	pub fn new(api: Arc<dyn BackendApi>) -> Self {
		Self {
			inner: Arc::new(ClientInner {
				api,
				busy: AsyncMutex::new(()),
				last_loaded: Mutex::new(None),
			}),
		}
	}

	/// Last successfully loaded payload, if any.
	pub fn last_loaded(&self) -> Option<Json> {
		self.inner.last_loaded.lock().clone()
	}

	/// True while a load is in flight.
	pub fn is_loading(&self) -> bool {
		self.inner.busy.try_lock().is_none()
	}

	/// Performs one load call and stores the returned payload verbatim.
	///
	/// On failure the backend's `detail`-derived message is surfaced and the previously
	/// loaded payload is preserved. Rejected with [`Error::Busy`] while another load is in
	/// flight.
	pub async fn load(&self, provider: ProviderType, credentials: &Credentials) -> Result<Json> {
		// Busy for the full duration of the call; the guard drops on every exit path.
		let _busy = self.inner.busy.try_lock().ok_or(Error::Busy)?;

		const KIND: OpKind = OpKind::Load;

		let span = OpSpan::new(KIND, "load");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let payload =
					self.inner.api.load(provider, credentials).await.map_err(Error::Load)?;

				*self.inner.last_loaded.lock() = Some(payload.clone());

				Ok(payload)
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	/// Clears the stored payload. Rejected with [`Error::Busy`] while a load is in flight.
	pub fn clear(&self) -> Result<()> {
		let _busy = self.inner.busy.try_lock().ok_or(Error::Busy)?;

		*self.inner.last_loaded.lock() = None;

		Ok(())
	}
}
impl Debug for DataClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DataClient")
			.field("loading", &self.is_loading())
			.field("has_payload", &self.last_loaded().is_some())
			.finish()
	}
}
