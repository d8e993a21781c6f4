//! Opaque credential bundle transported—but never inspected—by the broker.

// self
use crate::_prelude::*;

/// Credential bundle returned by the backend token exchange.
///
/// The internal shape is provider-specific; the broker only transports it. The sole inspection
/// the broker performs is [`is_empty`](Credentials::is_empty), which decides whether an
/// exchange actually produced credentials. `Debug`/`Display` redact the contents so bundles
/// never leak into logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials(Json);
impl Credentials {
	/// Wraps a backend-issued credential payload.
	pub fn new(value: Json) -> Self {
		Self(value)
	}

	/// True when the payload carries no credentials (JSON `null` or an empty string).
	pub fn is_empty(&self) -> bool {
		match &self.0 {
			Json::Null => true,
			Json::String(s) => s.is_empty(),
			_ => false,
		}
	}

	/// Returns the inner payload. Callers must avoid logging this value.
	pub fn expose(&self) -> &Json {
		&self.0
	}

	/// Serializes the bundle for transport in a form field.
	#[cfg_attr(not(feature = "reqwest"), allow(dead_code))]
	pub(crate) fn to_form_value(&self) -> String {
		self.0.to_string()
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Credentials").field(&"<redacted>").finish()
	}
}
impl Display for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
