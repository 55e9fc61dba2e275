use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// CRM object types that are pulled incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
	Contacts,
	Companies,
	Meetings,
}

impl ResourceType {
	/// Order in which an account's resources are synced.
	#[cfg(test)]
	pub const SYNC_ORDER: [ResourceType; 3] = [
		ResourceType::Contacts,
		ResourceType::Companies,
		ResourceType::Meetings,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			ResourceType::Contacts => "contacts",
			ResourceType::Companies => "companies",
			ResourceType::Meetings => "meetings",
		}
	}

	/// Path segment of the `crm/v3/objects/{object}/search` endpoint.
	pub fn object_path(&self) -> &'static str {
		self.as_str()
	}

	/// Object key used by the associations API.
	pub fn association_key(&self) -> &'static str {
		match self {
			ResourceType::Contacts => "CONTACTS",
			ResourceType::Companies => "COMPANIES",
			ResourceType::Meetings => "MEETINGS",
		}
	}

	/// Property holding the last-modified timestamp of an object.
	pub fn modified_date_property(&self) -> &'static str {
		match self {
			ResourceType::Contacts => "lastmodifieddate",
			ResourceType::Companies | ResourceType::Meetings => "hs_lastmodifieddate",
		}
	}

	/// Properties requested from the search API for this resource.
	pub fn search_properties(&self) -> &'static [&'static str] {
		match self {
			ResourceType::Contacts => &[
				"firstname",
				"lastname",
				"jobtitle",
				"email",
				"hubspotscore",
				"hs_lead_status",
				"hs_analytics_source",
				"hs_latest_source",
			],
			ResourceType::Companies => &[
				"name",
				"domain",
				"country",
				"industry",
				"description",
				"annualrevenue",
				"numberofemployees",
				"hs_lead_status",
			],
			ResourceType::Meetings => &[
				"hs_meeting_title",
				"hs_meeting_start_time",
				"hs_meeting_end_time",
				"hubspot_owner_id",
			],
		}
	}
}

impl fmt::Display for ResourceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// OAuth credentials of one connected HubSpot account.
///
/// Passed explicitly to every transport call; there is no process-wide token.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
	pub access_token: String,
	pub refresh_token: String,
	#[serde(default)]
	pub token_expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
	/// An unknown expiry counts as expired.
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		match self.token_expires_at {
			Some(expires_at) => now > expires_at,
			None => true,
		}
	}

	/// Install a freshly issued access token valid for `expires_in_secs`.
	///
	/// A lifetime that does not fit a timestamp leaves the expiry unknown, so the token is
	/// refreshed again on next use.
	pub fn apply_refresh(
		&mut self,
		access_token: String,
		refresh_token: Option<String>,
		expires_in_secs: i64,
		now: DateTime<Utc>,
	) {
		self.access_token = access_token;
		if let Some(refresh_token) = refresh_token {
			self.refresh_token = refresh_token;
		}
		self.token_expires_at =
			TimeDelta::try_seconds(expires_in_secs).and_then(|lifetime| now.checked_add_signed(lifetime));
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("token_expires_at", &self.token_expires_at)
			.finish()
	}
}

/// A connected HubSpot portal and its sync state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
	pub hub_id: String,
	#[serde(flatten)]
	pub credentials: Credentials,
	#[serde(default)]
	pub last_pulled_dates: HashMap<ResourceType, DateTime<Utc>>,
}

impl Account {
	pub fn last_pulled_date(&self, resource: ResourceType) -> Option<DateTime<Utc>> {
		self.last_pulled_dates.get(&resource).copied()
	}

	pub fn mark_pulled(&mut self, resource: ResourceType, until: DateTime<Utc>) {
		self.last_pulled_dates.insert(resource, until);
	}
}

/// Error types for the account store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Unknown account: {0}")]
	UnknownAccount(String),
}
