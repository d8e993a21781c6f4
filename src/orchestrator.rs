//! Connection orchestration: the popup-based authorization handshake.
//!
//! The protocol has three actors—this orchestrator, the backend authorizer, and the user in a
//! detached UI surface—and no callback channel from the surface back to the orchestrator.
//! Completion is detected by polling surface closure every 200 ms. A closed surface proves
//! nothing about whether the user actually finished authorizing; the credential exchange is
//! the sole arbiter of success, so a closed popup without valid credentials settles the
//! attempt as `Failed`, not as an anomaly.
//!
//! A new connect attempt supersedes any attempt still in flight: the previous poller is
//! aborted, the previous surface is left to the user (it is never force-closed), and stale
//! network results are discarded on arrival via a generation counter.

pub mod session;
pub use session::SessionStatus;

// crates.io
use tokio::{
	sync::watch,
	task::AbortHandle,
	time::{self, MissedTickBehavior},
};
// self
use crate::{
	_prelude::*,
	auth::{OrgId, UserId},
	http::BackendApi,
	obs::{self, OpKind, OpOutcome, OpSpan},
	orchestrator::session::SessionState,
	params::ParamsCell,
	provider::ProviderType,
	surface::{AuthSurface, SurfaceHandle, SurfaceRequest},
};

/// Period between surface-closure checks.
const POLL_PERIOD: Duration = Duration::from_millis(200);

/// Drives one provider's authorization handshake and publishes the exchanged credentials.
///
/// The orchestrator owns the backend transport, the host's surface opener, and the shared
/// [`ParamsCell`] it publishes into. Clones share the same session; at most one connect
/// attempt—and therefore at most one poll timer—is live at any time.
#[derive(Clone)]
pub struct Orchestrator {
	inner: Arc<Inner>,
}
impl Orchestrator {
	/// Creates an orchestrator over the provided collaborators.
	///
	/// Must be called within a tokio runtime; the closure poller runs as a spawned task.
	pub fn new(
		api: Arc<dyn BackendApi>,
		surface: Arc<dyn AuthSurface>,
		params: ParamsCell,
	) -> Self {
		let (status_tx, _) = watch::channel(SessionStatus::Idle);

		Self {
			inner: Arc::new(Inner {
				api,
				surface,
				params,
				state: Mutex::new(SessionState::default()),
				status_tx,
			}),
		}
	}

	/// Current session status.
	pub fn status(&self) -> SessionStatus {
		*self.inner.status_tx.borrow()
	}

	/// Subscribes to session status transitions.
	pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
		self.inner.status_tx.subscribe()
	}

	/// True while a connect attempt is in flight.
	pub fn is_connecting(&self) -> bool {
		self.status().is_connecting()
	}

	/// Message of the most recent failure, until dismissed or superseded.
	pub fn last_error(&self) -> Option<String> {
		self.inner.state.lock().last_error.clone()
	}

	/// Dismisses the current error notification without changing session status.
	pub fn dismiss_error(&self) {
		self.inner.state.lock().last_error = None;
	}

	/// Handle to the shared params cell this orchestrator publishes into.
	pub fn params(&self) -> ParamsCell {
		self.inner.params.clone()
	}

	/// Waits until the current attempt settles and returns the terminal status.
	pub async fn settled(&self) -> SessionStatus {
		let mut status_rx = self.inner.status_tx.subscribe();

		loop {
			let status = *status_rx.borrow_and_update();

			if status.is_settled() {
				return status;
			}
			if status_rx.changed().await.is_err() {
				return status;
			}
		}
	}

	/// Begins a connect attempt: request an authorization URL, open it in a detached surface,
	/// and poll for closure before exchanging for credentials.
	///
	/// Returns once the surface is open and the poller is running (`AwaitingUser`), or with
	/// the failure that ended the attempt early. Rejected with [`Error::AlreadyConnected`]
	/// while a completed connection exists; supersedes any attempt still in flight.
	pub async fn initiate_connection(
		&self,
		user: UserId,
		org: OrgId,
		provider: ProviderType,
	) -> Result<()> {
		const KIND: OpKind = OpKind::Connect;

		let span = OpSpan::new(KIND, "initiate_connection");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.inner.clone().begin(user, org, provider)).await;

		if result.is_err() {
			obs::record_op_outcome(KIND, OpOutcome::Failure);
		}

		result
	}

	/// The parent coordinator's reset: aborts any in-flight attempt, clears the error and the
	/// shared params, and returns the session to `Idle`. The only path out of `Connected`.
	pub fn reset(&self) {
		let mut state = self.inner.state.lock();

		// Invalidate any in-flight attempt before tearing its poller down.
		state.generation += 1;

		if let Some(poller) = state.poller.take() {
			poller.abort();
		}

		state.last_error = None;
		self.inner.params.reset();
		self.inner.status_tx.send_replace(SessionStatus::Idle);
	}
}
impl Debug for Orchestrator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Orchestrator")
			.field("status", &self.status())
			.field("last_error", &self.last_error())
			.finish()
	}
}

struct Inner {
	api: Arc<dyn BackendApi>,
	surface: Arc<dyn AuthSurface>,
	params: ParamsCell,
	state: Mutex<SessionState>,
	status_tx: watch::Sender<SessionStatus>,
}
impl Inner {
	async fn begin(
		self: Arc<Self>,
		user: UserId,
		org: OrgId,
		provider: ProviderType,
	) -> Result<()> {
		let generation = self.supersede()?;
		let result = self.request_and_open(generation, user, org, provider).await;

		if let Err(error) = &result {
			self.fail(generation, error);
		}

		result
	}

	fn supersede(&self) -> Result<u64> {
		let mut state = self.state.lock();

		if *self.status_tx.borrow() == SessionStatus::Connected {
			return Err(Error::AlreadyConnected);
		}

		// A newer attempt takes over; the old poller stops, the old surface stays with the
		// user.
		if let Some(poller) = state.poller.take() {
			poller.abort();
		}

		state.generation += 1;
		state.last_error = None;
		self.status_tx.send_replace(SessionStatus::Requesting);

		Ok(state.generation)
	}

	async fn request_and_open(
		self: &Arc<Self>,
		generation: u64,
		user: UserId,
		org: OrgId,
		provider: ProviderType,
	) -> Result<()> {
		let auth_url =
			self.api.authorize(provider, &user, &org).await.map_err(Error::Authorization)?;

		if !self.is_current(generation) {
			// Superseded while the authorize call was in flight; discard on arrival.
			return Ok(());
		}
		if auth_url.trim().is_empty() {
			return Err(Error::MissingAuthorizationUrl);
		}

		let request =
			SurfaceRequest::new(auth_url, format!("{} Authorization", provider.display_name()));
		let handle = self.surface.open(request)?;
		let mut state = self.state.lock();

		if state.generation != generation {
			// A newer attempt took over while the surface opened; it stays with the user.
			return Ok(());
		}

		self.status_tx.send_replace(SessionStatus::AwaitingUser);
		state.poller = Some(self.spawn_poller(generation, handle, user, org, provider));

		Ok(())
	}

	fn spawn_poller(
		self: &Arc<Self>,
		generation: u64,
		handle: Box<dyn SurfaceHandle>,
		user: UserId,
		org: OrgId,
		provider: ProviderType,
	) -> AbortHandle {
		let weak = Arc::downgrade(self);
		let task = tokio::spawn(async move {
			let mut ticker = time::interval(POLL_PERIOD);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				ticker.tick().await;

				let Some(inner) = weak.upgrade() else { return };

				if !inner.is_current(generation) {
					return;
				}
				if handle.is_closed() {
					// The ticker stops here, before the exchange; it must never fire again.
					drop(ticker);
					inner.complete_connection(generation, &user, &org, provider).await;

					return;
				}
			}
		});

		task.abort_handle()
	}

	async fn complete_connection(
		&self,
		generation: u64,
		user: &UserId,
		org: &OrgId,
		provider: ProviderType,
	) {
		{
			let mut state = self.state.lock();

			if state.generation != generation {
				return;
			}

			// The poll already stopped; nothing is left to abort.
			state.poller = None;
			self.status_tx.send_replace(SessionStatus::Exchanging);
		}

		const KIND: OpKind = OpKind::Exchange;

		let span = OpSpan::new(KIND, "complete_connection");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let outcome = span
			.instrument(async {
				let credentials = self
					.api
					.credentials(provider, user, org)
					.await
					.map_err(Error::CredentialExchange)?;

				if credentials.is_empty() {
					return Err(Error::EmptyCredentials);
				}

				Ok(credentials)
			})
			.await;

		match outcome {
			Ok(credentials) => {
				let state = self.state.lock();

				if state.generation != generation {
					// Superseded during the exchange; the result is discarded on arrival.
					return;
				}

				// Publish before announcing `Connected`, so readers woken by the status
				// change always observe populated params.
				self.params.publish(provider, credentials);
				self.status_tx.send_replace(SessionStatus::Connected);
				obs::record_op_outcome(KIND, OpOutcome::Success);
				obs::record_op_outcome(OpKind::Connect, OpOutcome::Success);
			},
			Err(error) => {
				obs::record_op_outcome(KIND, OpOutcome::Failure);
				obs::record_op_outcome(OpKind::Connect, OpOutcome::Failure);
				self.fail(generation, &error);
			},
		}
	}

	fn fail(&self, generation: u64, error: &Error) {
		let mut state = self.state.lock();

		if state.generation != generation {
			return;
		}
		if let Some(poller) = state.poller.take() {
			poller.abort();
		}

		state.last_error = Some(error.to_string());
		self.status_tx.send_replace(SessionStatus::Failed);
	}

	fn is_current(&self, generation: u64) -> bool {
		self.state.lock().generation == generation
	}
}
impl Drop for Inner {
	fn drop(&mut self) {
		// Teardown must never leak an active poll timer.
		if let Some(poller) = self.state.get_mut().poller.take() {
			poller.abort();
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	use tokio::time::sleep;
	// self
	use super::*;
	use crate::{
		auth::Credentials,
		http::ScriptedBackend,
		params::IntegrationParams,
		surface::{DEFAULT_HEIGHT, DEFAULT_WIDTH, FlagSurface},
	};

	const AUTH_URL: &str = "https://auth.example/abc";

	fn user() -> UserId {
		UserId::new("u1").expect("User fixture should be valid.")
	}

	fn org() -> OrgId {
		OrgId::new("o1").expect("Org fixture should be valid.")
	}

	fn build(api: &ScriptedBackend, surface: &FlagSurface) -> (Orchestrator, ParamsCell) {
		let params = ParamsCell::new();
		let orchestrator =
			Orchestrator::new(Arc::new(api.clone()), Arc::new(surface.clone()), params.clone());

		(orchestrator, params)
	}

	#[tokio::test]
	async fn connect_publishes_credentials_once_the_surface_closes() {
		let api = ScriptedBackend::new();
		let surface = FlagSurface::new();

		api.script_authorize(Ok(AUTH_URL));
		api.script_credentials(Ok(json!({ "access_token": "t1" })));

		let (orchestrator, params) = build(&api, &surface);

		orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect("Connect should reach the awaiting-user stage.");

		assert_eq!(orchestrator.status(), SessionStatus::AwaitingUser);
		assert!(orchestrator.is_connecting());

		let opened = surface.opened_requests();

		assert_eq!(opened.len(), 1);
		assert_eq!(opened[0].url, AUTH_URL);
		assert_eq!(opened[0].name, "Hubspot Authorization");
		assert_eq!((opened[0].width, opened[0].height), (DEFAULT_WIDTH, DEFAULT_HEIGHT));

		surface.close();

		assert_eq!(orchestrator.settled().await, SessionStatus::Connected);
		assert_eq!(
			params.snapshot(),
			IntegrationParams {
				provider: Some(ProviderType::Hubspot),
				credentials: Some(Credentials::new(json!({ "access_token": "t1" }))),
			}
		);
		assert!(!orchestrator.is_connecting());
		assert_eq!(orchestrator.last_error(), None);
	}

	#[tokio::test]
	async fn connected_sessions_reject_further_initiations() {
		let api = ScriptedBackend::new();
		let surface = FlagSurface::new();

		api.script_authorize(Ok(AUTH_URL));
		api.script_credentials(Ok(json!({ "access_token": "t1" })));

		let (orchestrator, _params) = build(&api, &surface);

		orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect("Connect should reach the awaiting-user stage.");
		surface.close();
		orchestrator.settled().await;

		let err = orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect_err("The connect trigger must be inert while connected.");

		assert!(matches!(err, Error::AlreadyConnected));
		assert_eq!(orchestrator.status(), SessionStatus::Connected);
		assert_eq!(api.authorize_calls(), 1);
	}

	#[tokio::test]
	async fn empty_authorization_url_fails_without_opening_a_surface() {
		let api = ScriptedBackend::new();
		let surface = FlagSurface::new();

		api.script_authorize(Ok(""));

		let (orchestrator, params) = build(&api, &surface);
		let err = orchestrator
			.initiate_connection(user(), org(), ProviderType::Notion)
			.await
			.expect_err("An empty authorization URL must fail the attempt.");

		assert!(matches!(err, Error::MissingAuthorizationUrl));
		assert_eq!(orchestrator.status(), SessionStatus::Failed);
		assert!(surface.opened_requests().is_empty());
		assert_eq!(
			orchestrator.last_error().as_deref(),
			Some("No authorization URL received.")
		);
		assert_eq!(params.snapshot(), IntegrationParams::default());
	}

	#[tokio::test]
	async fn authorize_rejection_surfaces_backend_detail_and_allows_retry() {
		let api = ScriptedBackend::new();
		let surface = FlagSurface::new();

		api.script_authorize(Err("Rate limited."));

		let (orchestrator, _params) = build(&api, &surface);
		let err = orchestrator
			.initiate_connection(user(), org(), ProviderType::Airtable)
			.await
			.expect_err("A rejected authorize call must fail the attempt.");

		assert!(matches!(err, Error::Authorization(_)));
		assert!(err.to_string().contains("Rate limited."));
		assert_eq!(orchestrator.status(), SessionStatus::Failed);

		// Retrying from the start is allowed after a failure.
		api.script_authorize(Ok(AUTH_URL));
		orchestrator
			.initiate_connection(user(), org(), ProviderType::Airtable)
			.await
			.expect("Retry should reach the awaiting-user stage.");

		assert_eq!(orchestrator.status(), SessionStatus::AwaitingUser);
	}

	#[tokio::test]
	async fn blocked_surface_fails_without_starting_a_poller() {
		let api = ScriptedBackend::new();
		let surface = FlagSurface::refusing();

		api.script_authorize(Ok(AUTH_URL));

		let (orchestrator, _params) = build(&api, &surface);
		let err = orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect_err("A blocked surface must fail the attempt.");

		assert!(matches!(err, Error::SurfaceBlocked(_)));
		assert!(err.to_string().contains("blocked"));
		assert_eq!(orchestrator.status(), SessionStatus::Failed);

		// No poller was started, so a later "closure" must not trigger an exchange.
		surface.close();
		sleep(POLL_PERIOD * 3).await;

		assert_eq!(api.credentials_calls(), 0);
	}

	#[tokio::test]
	async fn empty_exchange_fails_and_leaves_params_untouched() {
		let api = ScriptedBackend::new();
		let surface = FlagSurface::new();

		api.script_authorize(Ok(AUTH_URL));
		api.script_credentials(Ok(Json::Null));

		let (orchestrator, params) = build(&api, &surface);

		orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect("Connect should reach the awaiting-user stage.");
		surface.close();

		assert_eq!(orchestrator.settled().await, SessionStatus::Failed);
		assert_eq!(params.snapshot(), IntegrationParams::default());
		assert_eq!(orchestrator.last_error().as_deref(), Some("No credentials received."));
		assert!(!orchestrator.is_connecting());

		// The user can start over.
		orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect("Retry should reach the awaiting-user stage.");

		assert_eq!(orchestrator.status(), SessionStatus::AwaitingUser);
	}

	#[tokio::test]
	async fn exchange_rejection_prefers_backend_detail() {
		let api = ScriptedBackend::new();
		let surface = FlagSurface::new();

		api.script_authorize(Ok(AUTH_URL));
		api.script_credentials(Err("No credentials found."));

		let (orchestrator, params) = build(&api, &surface);

		orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect("Connect should reach the awaiting-user stage.");
		surface.close();

		assert_eq!(orchestrator.settled().await, SessionStatus::Failed);
		assert_eq!(
			orchestrator.last_error().as_deref(),
			Some("Failed to retrieve credentials: No credentials found.")
		);
		assert_eq!(params.snapshot(), IntegrationParams::default());
	}

	#[tokio::test]
	async fn second_initiate_supersedes_the_first() {
		let api = ScriptedBackend::new();
		let surface = FlagSurface::new();

		api.script_authorize(Ok(AUTH_URL));
		api.script_credentials(Ok(json!({ "access_token": "t2" })));

		let (orchestrator, params) = build(&api, &surface);

		orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect("First connect should reach the awaiting-user stage.");
		orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect("Second connect should supersede the first.");

		assert_eq!(api.authorize_calls(), 2);

		surface.close();

		assert_eq!(orchestrator.settled().await, SessionStatus::Connected);
		// Only the winning attempt exchanges; the superseded poller was aborted.
		assert_eq!(api.credentials_calls(), 1);
		assert!(params.snapshot().is_connected());
	}

	#[tokio::test]
	async fn reset_returns_to_idle_and_clears_params() {
		let api = ScriptedBackend::new();
		let surface = FlagSurface::new();

		api.script_authorize(Ok(AUTH_URL));
		api.script_credentials(Ok(json!({ "access_token": "t1" })));

		let (orchestrator, params) = build(&api, &surface);

		orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect("Connect should reach the awaiting-user stage.");
		surface.close();
		orchestrator.settled().await;

		assert!(params.snapshot().is_connected());

		orchestrator.reset();

		assert_eq!(orchestrator.status(), SessionStatus::Idle);
		assert_eq!(params.snapshot(), IntegrationParams::default());
		assert_eq!(orchestrator.last_error(), None);

		// A fresh attempt is allowed after the reset.
		orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect("Connect after reset should reach the awaiting-user stage.");

		assert_eq!(orchestrator.status(), SessionStatus::AwaitingUser);
	}

	#[tokio::test]
	async fn dropping_the_orchestrator_stops_the_poller() {
		let api = ScriptedBackend::new();
		let surface = FlagSurface::new();

		api.script_authorize(Ok(AUTH_URL));
		api.script_credentials(Ok(json!({ "access_token": "t1" })));

		let (orchestrator, params) = build(&api, &surface);

		orchestrator
			.initiate_connection(user(), org(), ProviderType::Hubspot)
			.await
			.expect("Connect should reach the awaiting-user stage.");
		drop(orchestrator);
		surface.close();
		sleep(POLL_PERIOD * 3).await;

		assert_eq!(api.credentials_calls(), 0);
		assert_eq!(params.snapshot(), IntegrationParams::default());
	}

	#[tokio::test]
	async fn dismissing_an_error_keeps_the_failed_status() {
		let api = ScriptedBackend::new();
		let surface = FlagSurface::new();

		api.script_authorize(Ok(""));

		let (orchestrator, _params) = build(&api, &surface);
		let _ = orchestrator.initiate_connection(user(), org(), ProviderType::Notion).await;

		assert!(orchestrator.last_error().is_some());

		orchestrator.dismiss_error();

		assert_eq!(orchestrator.last_error(), None);
		assert_eq!(orchestrator.status(), SessionStatus::Failed);
	}
}
