//! Host-supplied UI surface abstraction for the authorization flow.
//!
//! Opening a detached window is inherently host-specific, so the crate only owns the protocol
//! side: it asks an [`AuthSurface`] to open a named, fixed-size surface and then polls the
//! returned [`SurfaceHandle`] for closure. The orchestrator never force-closes a surface—the
//! user, not the system, controls that surface's lifecycle.

// std
#[cfg(any(test, feature = "test"))]
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::_prelude::*;

/// Default width in pixels requested for authorization surfaces.
pub const DEFAULT_WIDTH: u32 = 600;
/// Default height in pixels requested for authorization surfaces.
pub const DEFAULT_HEIGHT: u32 = 600;

/// Parameters describing the surface an opener should create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceRequest {
	/// Authorization URL the surface must display. Opaque and single-use; the broker never
	/// parses it.
	pub url: String,
	/// Name shown by the host surface (window title).
	pub name: String,
	/// Requested width in pixels.
	pub width: u32,
	/// Requested height in pixels.
	pub height: u32,
}
impl SurfaceRequest {
	/// Creates a request with the default fixed dimensions.
	pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
		Self { url: url.into(), name: name.into(), width: DEFAULT_WIDTH, height: DEFAULT_HEIGHT }
	}
}

/// Error raised when the host environment refuses to create a surface.
///
/// Non-fatal and user-actionable (typically a popup-blocker permission).
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Authorization window was blocked: {reason}")]
pub struct SurfaceError {
	/// Host-supplied reason for the refusal.
	pub reason: String,
}
impl SurfaceError {
	/// Builds a blocked-surface error with the provided reason.
	pub fn blocked(reason: impl Into<String>) -> Self {
		Self { reason: reason.into() }
	}
}

/// Opens authorization surfaces on behalf of the orchestrator.
pub trait AuthSurface
where
	Self: Send + Sync,
{
	/// Opens a new surface for the request, returning a handle pollable for closure.
	fn open(&self, request: SurfaceRequest) -> Result<Box<dyn SurfaceHandle>, SurfaceError>;
}

/// Handle to an opened surface.
pub trait SurfaceHandle
where
	Self: Send + Sync,
{
	/// True once the user has closed the surface. Closure is the only completion signal the
	/// authorization flow emits; there is no message-passing callback.
	fn is_closed(&self) -> bool;
}

/// Surface opener backed by a shared closure flag, for tests and demos.
///
/// All handles opened by one `FlagSurface` observe the same flag, so a test can simulate the
/// user closing the authorization window by calling [`close`](FlagSurface::close).
#[cfg(any(test, feature = "test"))]
#[derive(Clone, Debug, Default)]
pub struct FlagSurface {
	closed: Arc<AtomicBool>,
	blocked: Arc<AtomicBool>,
	opened: Arc<Mutex<Vec<SurfaceRequest>>>,
}
#[cfg(any(test, feature = "test"))]
impl FlagSurface {
	/// Creates an opener whose surfaces start open.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an opener that refuses every open request.
	pub fn refusing() -> Self {
		let surface = Self::default();

		surface.blocked.store(true, Ordering::SeqCst);

		surface
	}

	/// Simulates the user closing the surface.
	pub fn close(&self) {
		self.closed.store(true, Ordering::SeqCst);
	}

	/// Requests passed to [`AuthSurface::open`] so far.
	pub fn opened_requests(&self) -> Vec<SurfaceRequest> {
		self.opened.lock().clone()
	}
}
#[cfg(any(test, feature = "test"))]
impl AuthSurface for FlagSurface {
	fn open(&self, request: SurfaceRequest) -> Result<Box<dyn SurfaceHandle>, SurfaceError> {
		if self.blocked.load(Ordering::SeqCst) {
			return Err(SurfaceError::blocked("Please allow popups for this site."));
		}

		self.opened.lock().push(request);

		Ok(Box::new(FlagHandle(self.closed.clone())))
	}
}

#[cfg(any(test, feature = "test"))]
struct FlagHandle(Arc<AtomicBool>);
#[cfg(any(test, feature = "test"))]
impl SurfaceHandle for FlagHandle {
	fn is_closed(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn requests_default_to_fixed_dimensions() {
		let request = SurfaceRequest::new("https://auth.example/abc", "Hubspot Authorization");

		assert_eq!(request.width, DEFAULT_WIDTH);
		assert_eq!(request.height, DEFAULT_HEIGHT);
		assert_eq!(request.name, "Hubspot Authorization");
	}

	#[test]
	fn flag_surface_tracks_open_and_closure() {
		let surface = FlagSurface::new();
		let handle = surface
			.open(SurfaceRequest::new("https://auth.example/abc", "Test"))
			.expect("Open surface should succeed when not blocked.");

		assert!(!handle.is_closed());
		assert_eq!(surface.opened_requests().len(), 1);

		surface.close();

		assert!(handle.is_closed());
	}

	#[test]
	fn refusing_surface_reports_blocked() {
		let surface = FlagSurface::refusing();
		let Err(err) = surface.open(SurfaceRequest::new("https://auth.example/abc", "Test"))
		else {
			panic!("Blocked opener must refuse.");
		};

		assert!(err.to_string().contains("blocked"));
		assert!(surface.opened_requests().is_empty());
	}
}
