use crate::accounts::{Credentials, ResourceType};
use crate::config::ConfigError;
use crate::hubspot::CrmRecord;
use crate::sync::associations::{AssociationIndex, AssociationResolver};
use crate::sync::batcher::FLUSH_THRESHOLD;
use crate::sync::events::{
	Event, company_event, contact_event, meeting_event, meeting_participant_events,
};
use crate::sync::pagination::PAGE_LIMIT;
use crate::sync::retry::BackoffPolicy;
use crate::sync::types::SyncError;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Largest page size the search API accepts.
const MAX_PAGE_LIMIT: u32 = 200;

/// Turns fetched pages of one resource type into events
#[async_trait::async_trait]
pub trait ResourceSync: Send + Sync {
	fn resource(&self) -> ResourceType;

	/// Build the events of one page. `last_pulled_date` is the value from before this run.
	async fn events_for_page(
		&self,
		credentials: &Credentials,
		records: &[CrmRecord],
		last_pulled_date: Option<DateTime<Utc>>,
	) -> Result<Vec<Event>, SyncError>;

	/// Whether an empty page ends paging even when a cursor came back.
	fn stops_on_empty_page(&self) -> bool {
		false
	}

	/// Get the name of this strategy
	fn name(&self) -> &'static str;
}

/// Engine tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
	/// Events that may accumulate before a batch is flushed
	pub flush_threshold: usize,
	pub page_limit: u32,
	/// Fetch attempts per page, including the first
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub email_chunk_size: usize,
	pub email_lookup_concurrency: usize,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			flush_threshold: FLUSH_THRESHOLD,
			page_limit: PAGE_LIMIT,
			max_attempts: 5,
			base_delay: Duration::from_millis(5000),
			email_chunk_size: 50,
			email_lookup_concurrency: 4,
		}
	}
}

impl SyncConfig {
	pub fn backoff_policy(&self) -> BackoffPolicy {
		BackoffPolicy::new(self.base_delay, self.max_attempts)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_attempts == 0 {
			return Err(invalid("SYNC_MAX_ATTEMPTS", self.max_attempts));
		}
		if self.page_limit == 0 || self.page_limit > MAX_PAGE_LIMIT {
			return Err(invalid("SYNC_PAGE_LIMIT", self.page_limit));
		}
		if self.flush_threshold == 0 {
			return Err(invalid("SYNC_FLUSH_THRESHOLD", self.flush_threshold));
		}
		if self.email_chunk_size == 0 {
			return Err(invalid("SYNC_EMAIL_CHUNK_SIZE", self.email_chunk_size));
		}
		if self.email_lookup_concurrency == 0 {
			return Err(invalid("SYNC_EMAIL_CONCURRENCY", self.email_lookup_concurrency));
		}
		Ok(())
	}
}

fn invalid(name: &'static str, value: impl ToString) -> ConfigError {
	ConfigError::Invalid {
		name,
		value: value.to_string(),
	}
}

fn record_ids(records: &[CrmRecord]) -> Vec<String> {
	records.iter().map(|record| record.id.clone()).collect()
}

fn participants_of<'a>(index: &'a AssociationIndex, record: &CrmRecord) -> &'a [String] {
	index.get(&record.id).map(Vec::as_slice).unwrap_or_default()
}

/// Contacts, enriched with their primary company
pub struct ContactSync {
	resolver: AssociationResolver,
}

impl ContactSync {
	pub fn new(resolver: AssociationResolver) -> Self {
		Self { resolver }
	}
}

#[async_trait::async_trait]
impl ResourceSync for ContactSync {
	fn resource(&self) -> ResourceType {
		ResourceType::Contacts
	}

	async fn events_for_page(
		&self,
		credentials: &Credentials,
		records: &[CrmRecord],
		last_pulled_date: Option<DateTime<Utc>>,
	) -> Result<Vec<Event>, SyncError> {
		let companies = self
			.resolver
			.resolve_first(
				credentials,
				&record_ids(records),
				ResourceType::Contacts,
				ResourceType::Companies,
			)
			.await?;

		let events: Vec<Event> = records
			.iter()
			.filter_map(|record| {
				let company_id = companies.get(&record.id).map(String::as_str);
				contact_event(record, last_pulled_date, company_id)
			})
			.collect();

		debug!(
			records = records.len(),
			events = events.len(),
			with_company = companies.len(),
			"Mapped contact page"
		);
		Ok(events)
	}

	fn name(&self) -> &'static str {
		"ContactSync"
	}
}

pub struct CompanySync;

#[async_trait::async_trait]
impl ResourceSync for CompanySync {
	fn resource(&self) -> ResourceType {
		ResourceType::Companies
	}

	async fn events_for_page(
		&self,
		_credentials: &Credentials,
		records: &[CrmRecord],
		last_pulled_date: Option<DateTime<Utc>>,
	) -> Result<Vec<Event>, SyncError> {
		Ok(records
			.iter()
			.filter_map(|record| company_event(record, last_pulled_date))
			.collect())
	}

	fn name(&self) -> &'static str {
		"CompanySync"
	}
}

/// Meetings and their participants
pub struct MeetingSync {
	resolver: AssociationResolver,
}

impl MeetingSync {
	pub fn new(resolver: AssociationResolver) -> Self {
		Self { resolver }
	}
}

#[async_trait::async_trait]
impl ResourceSync for MeetingSync {
	fn resource(&self) -> ResourceType {
		ResourceType::Meetings
	}

	async fn events_for_page(
		&self,
		credentials: &Credentials,
		records: &[CrmRecord],
		last_pulled_date: Option<DateTime<Utc>>,
	) -> Result<Vec<Event>, SyncError> {
		let participants = self
			.resolver
			.resolve_associations(
				credentials,
				&record_ids(records),
				ResourceType::Meetings,
				ResourceType::Contacts,
			)
			.await?;

		let contact_ids: Vec<String> = records
			.iter()
			.filter_map(|record| participants.get(&record.id))
			.flatten()
			.cloned()
			.collect();
		let emails = self.resolver.resolve_emails(credentials, &contact_ids).await;

		// participant events for the whole page come before the meeting events
		let mut events: Vec<Event> = records
			.iter()
			.flat_map(|record| {
				meeting_participant_events(record, participants_of(&participants, record), &emails)
			})
			.collect();
		events.extend(records.iter().filter_map(|record| {
			meeting_event(
				record,
				last_pulled_date,
				participants_of(&participants, record),
				&emails,
			)
		}));

		Ok(events)
	}

	fn stops_on_empty_page(&self) -> bool {
		true
	}

	fn name(&self) -> &'static str {
		"MeetingSync"
	}
}
