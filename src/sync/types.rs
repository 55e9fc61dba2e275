use crate::accounts::{ResourceType, StoreError};
use crate::hubspot::HubspotError;

/// Errors raised by the incremental sync engine
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	/// Exchanging the refresh token failed.
	#[error("Token refresh failed for hub {hub_id}: {source}")]
	Auth {
		hub_id: String,
		#[source]
		source: HubspotError,
	},

	/// Every attempt to fetch a page failed; fatal to that resource's stage.
	#[error("Failed to fetch {resource} after {attempts} attempts: {source}")]
	FetchExhausted {
		resource: ResourceType,
		attempts: u32,
		#[source]
		source: HubspotError,
	},

	#[error("Association lookup {from} -> {to} failed: {source}")]
	AssociationLookup {
		from: ResourceType,
		to: ResourceType,
		#[source]
		source: HubspotError,
	},

	#[error("Failed to persist account {hub_id}: {source}")]
	Persistence {
		hub_id: String,
		#[source]
		source: StoreError,
	},

	#[error("Account store error: {0}")]
	Store(#[from] StoreError),
}

/// Stages of one account's sync, used to label logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
	RefreshToken,
	Resource(ResourceType),
	Drain,
	Persist,
}

impl std::fmt::Display for Stage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Stage::RefreshToken => f.write_str("refresh_token"),
			Stage::Resource(ResourceType::Contacts) => f.write_str("sync_contacts"),
			Stage::Resource(ResourceType::Companies) => f.write_str("sync_companies"),
			Stage::Resource(ResourceType::Meetings) => f.write_str("sync_meetings"),
			Stage::Drain => f.write_str("drain_events"),
			Stage::Persist => f.write_str("persist_account"),
		}
	}
}
