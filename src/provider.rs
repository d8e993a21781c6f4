//! Provider identity and backend endpoint routing.
//!
//! Each supported provider maps to a stable lowercase routing key used to address its backend
//! endpoints (`/integrations/{key}/...`). The mapping is total by construction—every enum
//! variant has a key—and injectivity is enforced by test. Unknown provider names fail loudly
//! at the parse boundary instead of silently routing to an invalid endpoint.

// self
use crate::_prelude::*;

/// Third-party data providers supported by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderType {
	/// Notion workspace integration.
	Notion,
	/// Airtable base integration.
	Airtable,
	/// HubSpot CRM integration.
	Hubspot,
}
impl ProviderType {
	/// Every supported provider, in declaration order.
	pub const ALL: [ProviderType; 3] =
		[ProviderType::Notion, ProviderType::Airtable, ProviderType::Hubspot];

	/// Stable lowercase key used to address the provider's backend endpoints.
	pub const fn routing_key(self) -> &'static str {
		match self {
			ProviderType::Notion => "notion",
			ProviderType::Airtable => "airtable",
			ProviderType::Hubspot => "hubspot",
		}
	}

	/// Human-readable provider name shown on connect controls and surface titles.
	pub const fn display_name(self) -> &'static str {
		match self {
			ProviderType::Notion => "Notion",
			ProviderType::Airtable => "Airtable",
			ProviderType::Hubspot => "Hubspot",
		}
	}
}
impl Display for ProviderType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.display_name())
	}
}
impl FromStr for ProviderType {
	type Err = UnknownProviderError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ProviderType::ALL
			.into_iter()
			.find(|provider| s == provider.display_name() || s == provider.routing_key())
			.ok_or_else(|| UnknownProviderError { name: s.to_owned() })
	}
}
impl TryFrom<String> for ProviderType {
	type Error = UnknownProviderError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}
impl From<ProviderType> for String {
	fn from(value: ProviderType) -> Self {
		value.display_name().to_owned()
	}
}

/// Error returned when a provider name has no routing mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
#[error("No routing mapping exists for provider `{name}`.")]
pub struct UnknownProviderError {
	/// The unmapped provider name as received.
	pub name: String,
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashSet;
	// self
	use super::*;

	#[test]
	fn routing_keys_are_defined_and_injective() {
		let keys: HashSet<_> = ProviderType::ALL.iter().map(|p| p.routing_key()).collect();

		assert_eq!(keys.len(), ProviderType::ALL.len());

		for provider in ProviderType::ALL {
			assert!(!provider.routing_key().is_empty());
			assert_eq!(provider.routing_key(), provider.routing_key().to_lowercase());
		}
	}

	#[test]
	fn parsing_accepts_display_names_and_routing_keys() {
		assert_eq!("Hubspot".parse::<ProviderType>(), Ok(ProviderType::Hubspot));
		assert_eq!("hubspot".parse::<ProviderType>(), Ok(ProviderType::Hubspot));
		assert_eq!("notion".parse::<ProviderType>(), Ok(ProviderType::Notion));
	}

	#[test]
	fn unknown_names_fail_before_any_routing() {
		let err = "Linear".parse::<ProviderType>().expect_err("Unmapped names must be rejected.");

		assert_eq!(err.name, "Linear");
		assert!(err.to_string().contains("Linear"));
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let provider: ProviderType = serde_json::from_str("\"Airtable\"")
			.expect("Known provider names should deserialize successfully.");

		assert_eq!(provider, ProviderType::Airtable);
		assert_eq!(
			serde_json::to_string(&provider).expect("Provider should serialize to JSON."),
			"\"Airtable\""
		);
		assert!(serde_json::from_str::<ProviderType>("\"Linear\"").is_err());
	}
}
