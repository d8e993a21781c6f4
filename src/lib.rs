//! Client-side integration broker—drive popup-based authorization handshakes against a backend
//! authorizer, publish exchanged credentials exactly once, and load provider data with guarded
//! busy semantics.
//!
//! Enable the `test` feature to use the bundled test doubles (`surface::FlagSurface` and
//! `http::ScriptedBackend`) from downstream integration tests.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod obs;
pub mod orchestrator;
pub mod params;
pub mod provider;
pub mod surface;

mod _prelude {
	pub use std::{
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value as Json;
	pub use thiserror::Error as ThisError;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
