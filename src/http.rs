//! Backend transport for the integration endpoints.
//!
//! The module exposes [`BackendApi`], the broker's only dependency on an HTTP stack. Hosts
//! typically use the bundled [`ReqwestBackendClient`], which posts form-encoded bodies to the
//! three collaborator endpoints (`authorize`, `credentials`, `load`) and decodes responses
//! from raw bytes. Error responses are expected to carry a human-readable `detail` field;
//! when it is absent the client falls back to a generic status-derived message instead of
//! failing the caller a second time.

// std
#[cfg(any(test, feature = "test"))]
use std::sync::atomic::{AtomicUsize, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{Credentials, OrgId, UserId},
	error::TransportError,
	provider::ProviderType,
};

/// Boxed future returned by [`BackendApi`] implementations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + 'a + Send>>;

/// Transport contract for the three integration endpoints.
///
/// Implementations must be `Send + Sync` so a single client can back both the orchestrator
/// and the data-access client behind `Arc<dyn BackendApi>`.
pub trait BackendApi
where
	Self: Send + Sync,
{
	/// Requests a provider authorization URL for the user/org pair.
	fn authorize<'a>(
		&'a self,
		provider: ProviderType,
		user: &'a UserId,
		org: &'a OrgId,
	) -> ApiFuture<'a, String>;

	/// Exchanges a finished authorization flow for a credential bundle.
	///
	/// An empty response body decodes to an empty bundle rather than a parse failure, since
	/// "the flow never completed" is a normal outcome the orchestrator must distinguish.
	fn credentials<'a>(
		&'a self,
		provider: ProviderType,
		user: &'a UserId,
		org: &'a OrgId,
	) -> ApiFuture<'a, Credentials>;

	/// Loads provider data using previously exchanged credentials.
	fn load<'a>(
		&'a self,
		provider: ProviderType,
		credentials: &'a Credentials,
	) -> ApiFuture<'a, Json>;
}

/// Error produced by [`BackendApi`] implementations.
#[derive(Debug, ThisError)]
pub enum BackendError {
	/// Backend rejected the call; the message prefers the body's `detail` field.
	#[error("{message}")]
	Rejected {
		/// Human-readable message derived from the error body.
		message: String,
		/// HTTP status code of the rejection.
		status: u16,
	},
	/// Success response body could not be decoded.
	#[error("Backend returned a malformed response body.")]
	Decode {
		/// Structured parsing failure with the offending JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for BackendError {
	fn from(e: ReqwestError) -> Self {
		TransportError::from(e).into()
	}
}

/// Reqwest-backed [`BackendApi`] targeting a single backend base URL.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestBackendClient {
	base: Url,
	client: ReqwestClient,
}
#[cfg(feature = "reqwest")]
impl ReqwestBackendClient {
	/// Creates a client with a default reqwest transport.
	pub fn new(base: Url) -> Self {
		Self::with_client(base, ReqwestClient::default())
	}

	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(base: Url, client: ReqwestClient) -> Self {
		Self { base, client }
	}

	fn endpoint(&self, provider: ProviderType, action: &str) -> String {
		format!(
			"{}/integrations/{}/{action}",
			self.base.as_str().trim_end_matches('/'),
			provider.routing_key(),
		)
	}

	async fn post_form(
		&self,
		url: &str,
		form: &[(&str, &str)],
	) -> Result<(u16, Vec<u8>), BackendError> {
		let response = self.client.post(url).form(form).send().await?;
		let status = response.status().as_u16();
		let success = response.status().is_success();
		let body = response.bytes().await?.to_vec();

		if !success {
			return Err(BackendError::Rejected { message: extract_detail(&body, status), status });
		}

		Ok((status, body))
	}
}
#[cfg(feature = "reqwest")]
impl BackendApi for ReqwestBackendClient {
	fn authorize<'a>(
		&'a self,
		provider: ProviderType,
		user: &'a UserId,
		org: &'a OrgId,
	) -> ApiFuture<'a, String> {
		Box::pin(async move {
			let url = self.endpoint(provider, "authorize");
			let form = [("user_id", user.as_ref()), ("org_id", org.as_ref())];
			let (status, body) = self.post_form(&url, &form).await?;

			decode(&body, status)
		})
	}

	fn credentials<'a>(
		&'a self,
		provider: ProviderType,
		user: &'a UserId,
		org: &'a OrgId,
	) -> ApiFuture<'a, Credentials> {
		Box::pin(async move {
			let url = self.endpoint(provider, "credentials");
			let form = [("user_id", user.as_ref()), ("org_id", org.as_ref())];
			let (status, body) = self.post_form(&url, &form).await?;

			if body.iter().all(u8::is_ascii_whitespace) {
				return Ok(Credentials::new(Json::Null));
			}

			Ok(Credentials::new(decode(&body, status)?))
		})
	}

	fn load<'a>(
		&'a self,
		provider: ProviderType,
		credentials: &'a Credentials,
	) -> ApiFuture<'a, Json> {
		Box::pin(async move {
			let url = self.endpoint(provider, "load");
			let bundle = credentials.to_form_value();
			let form = [("credentials", bundle.as_str())];
			let (status, body) = self.post_form(&url, &form).await?;

			decode(&body, status)
		})
	}
}

/// Derives a user-facing message from an error body, preferring its `detail` field.
#[cfg_attr(not(feature = "reqwest"), allow(dead_code))]
fn extract_detail(body: &[u8], status: u16) -> String {
	serde_json::from_slice::<Json>(body)
		.ok()
		.and_then(|value| value.get("detail").cloned())
		.and_then(|detail| match detail {
			Json::String(s) => Some(s),
			Json::Null => None,
			other => Some(other.to_string()),
		})
		.filter(|message| !message.is_empty())
		.unwrap_or_else(|| format!("Backend request failed with status {status}."))
}

#[cfg_attr(not(feature = "reqwest"), allow(dead_code))]
fn decode<T>(body: &[u8], status: u16) -> Result<T, BackendError>
where
	T: serde::de::DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| BackendError::Decode { source, status: Some(status) })
}

/// Scripted [`BackendApi`] double for unit tests.
///
/// Each endpoint replays a configured response; unscripted endpoints answer with a 500-level
/// rejection so accidental calls fail visibly. An optional delay keeps responses in flight so
/// tests can observe busy states.
#[cfg(any(test, feature = "test"))]
#[derive(Clone, Default)]
pub struct ScriptedBackend(Arc<ScriptedState>);
#[cfg(any(test, feature = "test"))]
#[derive(Default)]
struct ScriptedState {
	authorize: Mutex<Option<Result<String, String>>>,
	credentials: Mutex<Option<Result<Json, String>>>,
	load: Mutex<Option<Result<Json, String>>>,
	delay: Mutex<Option<Duration>>,
	authorize_calls: AtomicUsize,
	credentials_calls: AtomicUsize,
	load_calls: AtomicUsize,
}
#[cfg(any(test, feature = "test"))]
impl ScriptedBackend {
	/// Creates a backend with no scripted responses.
	pub fn new() -> Self {
		Self::default()
	}

	/// Scripts the authorize endpoint; `Err` becomes a 400 rejection with that detail.
	pub fn script_authorize(&self, response: Result<&str, &str>) {
		*self.0.authorize.lock() =
			Some(response.map(str::to_owned).map_err(str::to_owned));
	}

	/// Scripts the credentials endpoint; `Err` becomes a 400 rejection with that detail.
	pub fn script_credentials(&self, response: Result<Json, &str>) {
		*self.0.credentials.lock() = Some(response.map_err(str::to_owned));
	}

	/// Scripts the load endpoint; `Err` becomes a 400 rejection with that detail.
	pub fn script_load(&self, response: Result<Json, &str>) {
		*self.0.load.lock() = Some(response.map_err(str::to_owned));
	}

	/// Holds every response in flight for the given duration.
	pub fn set_delay(&self, delay: Duration) {
		*self.0.delay.lock() = Some(delay);
	}

	/// Number of authorize calls observed.
	pub fn authorize_calls(&self) -> usize {
		self.0.authorize_calls.load(Ordering::SeqCst)
	}

	/// Number of credentials calls observed.
	pub fn credentials_calls(&self) -> usize {
		self.0.credentials_calls.load(Ordering::SeqCst)
	}

	/// Number of load calls observed.
	pub fn load_calls(&self) -> usize {
		self.0.load_calls.load(Ordering::SeqCst)
	}

	async fn respond<T>(state: Arc<ScriptedState>, script: Option<Result<T, String>>) -> Result<T, BackendError> {
		let delay = *state.delay.lock();

		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}

		match script {
			Some(Ok(value)) => Ok(value),
			Some(Err(message)) => Err(BackendError::Rejected { message, status: 400 }),
			None => Err(BackendError::Rejected {
				message: "No scripted response for this endpoint.".into(),
				status: 500,
			}),
		}
	}
}
#[cfg(any(test, feature = "test"))]
impl BackendApi for ScriptedBackend {
	fn authorize<'a>(
		&'a self,
		_provider: ProviderType,
		_user: &'a UserId,
		_org: &'a OrgId,
	) -> ApiFuture<'a, String> {
		let state = self.0.clone();

		Box::pin(async move {
			state.authorize_calls.fetch_add(1, Ordering::SeqCst);

			let script = state.authorize.lock().clone();

			Self::respond(state, script).await
		})
	}

	fn credentials<'a>(
		&'a self,
		_provider: ProviderType,
		_user: &'a UserId,
		_org: &'a OrgId,
	) -> ApiFuture<'a, Credentials> {
		let state = self.0.clone();

		Box::pin(async move {
			state.credentials_calls.fetch_add(1, Ordering::SeqCst);

			let script = state.credentials.lock().clone();

			Self::respond(state, script).await.map(Credentials::new)
		})
	}

	fn load<'a>(
		&'a self,
		_provider: ProviderType,
		_credentials: &'a Credentials,
	) -> ApiFuture<'a, Json> {
		let state = self.0.clone();

		Box::pin(async move {
			state.load_calls.fetch_add(1, Ordering::SeqCst);

			let script = state.load.lock().clone();

			Self::respond(state, script).await
		})
	}
}
