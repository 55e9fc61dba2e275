//! In-memory fakes for the CRM, the account store and the event sink.

use crate::accounts::{Account, AccountStore, Credentials, ResourceType, StoreError};
use crate::hubspot::{
	AssociationBatchResponse, AssociationResult, AssociationTarget, CrmApi, CrmRecord,
	FilterOperator, HubspotError, NextPage, ObjectId, Paging, SearchRequest, SearchResponse,
	TokenResponse,
};
use crate::sink::{EventSink, SinkError};
use crate::sync::events::{Event, company_event};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub fn api_failure() -> HubspotError {
	HubspotError::ApiError {
		status: 500,
		body: "internal error".to_string(),
	}
}

pub fn account(hub_id: &str) -> Account {
	Account {
		hub_id: hub_id.to_string(),
		credentials: Credentials {
			access_token: "stale-token".to_string(),
			refresh_token: "refresh-token".to_string(),
			token_expires_at: None,
		},
		last_pulled_dates: HashMap::new(),
	}
}

/// A record with an empty (but present) property bag.
pub fn record(id: &str, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> CrmRecord {
	record_with(id, created_at, updated_at, &[])
}

pub fn record_with(
	id: &str,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
	properties: &[(&str, &str)],
) -> CrmRecord {
	CrmRecord {
		id: id.to_string(),
		properties: Some(
			properties
				.iter()
				.map(|(k, v)| (k.to_string(), Some(v.to_string())))
				.collect(),
		),
		created_at,
		updated_at,
	}
}

pub fn page(records: Vec<CrmRecord>, next_after: Option<&str>) -> SearchResponse {
	SearchResponse {
		results: records,
		paging: next_after.map(|after| Paging {
			next: Some(NextPage {
				after: after.to_string(),
			}),
		}),
	}
}

/// A distinct company event, handy where only identity and order matter.
pub fn sample_event(n: usize) -> Event {
	let at = Utc.timestamp_opt(1_700_000_000 + n as i64, 0).unwrap();
	let company = record(&format!("co{}", n), at, at);
	company_event(&company, None).unwrap()
}

enum Step {
	Page(SearchResponse),
	Fail,
}

#[derive(Default)]
struct CrmState {
	pages: HashMap<ResourceType, VecDeque<Step>>,
	searches: Vec<(ResourceType, SearchRequest)>,
	associations: HashMap<(ResourceType, ResourceType), HashMap<String, Vec<String>>>,
	association_calls: usize,
	failing_associations: bool,
	emails: HashMap<String, String>,
	email_chunks: Vec<Vec<String>>,
	failing_email_ids: HashSet<String>,
	refresh_calls: u32,
	failing_refresh: bool,
}

/// Scripted CRM. Search pages are served per resource in the order they were added; once a
/// resource runs out of scripted pages it answers with an empty last page.
#[derive(Default)]
pub struct FakeCrm {
	state: Mutex<CrmState>,
}

impl FakeCrm {
	fn with_state(self, f: impl FnOnce(&mut CrmState)) -> Self {
		f(&mut self.state.lock().unwrap());
		self
	}

	pub fn with_page(self, resource: ResourceType, response: SearchResponse) -> Self {
		self.with_state(|s| s.pages.entry(resource).or_default().push_back(Step::Page(response)))
	}

	pub fn with_failures(self, resource: ResourceType, count: usize) -> Self {
		self.with_state(|s| {
			let steps = s.pages.entry(resource).or_default();
			for _ in 0..count {
				steps.push_back(Step::Fail);
			}
		})
	}

	pub fn with_association(
		self,
		from: ResourceType,
		to: ResourceType,
		id: &str,
		targets: &[&str],
	) -> Self {
		self.with_state(|s| {
			s.associations.entry((from, to)).or_default().insert(
				id.to_string(),
				targets.iter().map(|t| t.to_string()).collect(),
			);
		})
	}

	pub fn failing_associations(self) -> Self {
		self.with_state(|s| s.failing_associations = true)
	}

	pub fn with_email(self, contact_id: &str, email: &str) -> Self {
		self.with_state(|s| {
			s.emails.insert(contact_id.to_string(), email.to_string());
		})
	}

	/// Fail every email lookup chunk that contains `contact_id`.
	pub fn failing_email_lookup_for(self, contact_id: &str) -> Self {
		self.with_state(|s| {
			s.failing_email_ids.insert(contact_id.to_string());
		})
	}

	pub fn failing_refresh(self) -> Self {
		self.with_state(|s| s.failing_refresh = true)
	}

	pub fn refresh_calls(&self) -> u32 {
		self.state.lock().unwrap().refresh_calls
	}

	pub fn association_calls(&self) -> usize {
		self.state.lock().unwrap().association_calls
	}

	pub fn email_chunks(&self) -> Vec<Vec<String>> {
		self.state.lock().unwrap().email_chunks.clone()
	}

	/// Window searches issued for `resource`, excluding email lookups.
	pub fn searches(&self, resource: ResourceType) -> Vec<SearchRequest> {
		self.state
			.lock()
			.unwrap()
			.searches
			.iter()
			.filter(|(r, _)| *r == resource)
			.map(|(_, request)| request.clone())
			.collect()
	}
}

fn email_lookup_ids(request: &SearchRequest) -> Option<Vec<String>> {
	request
		.filter_groups
		.iter()
		.flat_map(|group| group.filters.iter())
		.find(|filter| filter.operator == FilterOperator::In && filter.property_name == "hs_object_id")
		.and_then(|filter| filter.values.clone())
}

#[async_trait::async_trait]
impl CrmApi for FakeCrm {
	async fn search(
		&self,
		_credentials: &Credentials,
		resource: ResourceType,
		request: &SearchRequest,
	) -> Result<SearchResponse, HubspotError> {
		let mut state = self.state.lock().unwrap();

		if let Some(ids) = email_lookup_ids(request) {
			state.email_chunks.push(ids.clone());
			if ids.iter().any(|id| state.failing_email_ids.contains(id)) {
				return Err(api_failure());
			}
			let results = ids
				.iter()
				.filter_map(|id| {
					let email = state.emails.get(id)?;
					let at = DateTime::UNIX_EPOCH;
					Some(record_with(id, at, at, &[("email", email.as_str())]))
				})
				.collect();
			return Ok(page(results, None));
		}

		state.searches.push((resource, request.clone()));
		match state.pages.get_mut(&resource).and_then(VecDeque::pop_front) {
			Some(Step::Page(response)) => Ok(response),
			Some(Step::Fail) => Err(api_failure()),
			None => Ok(SearchResponse::default()),
		}
	}

	async fn associations_batch_read(
		&self,
		_credentials: &Credentials,
		from: ResourceType,
		to: ResourceType,
		ids: &[String],
	) -> Result<AssociationBatchResponse, HubspotError> {
		let mut state = self.state.lock().unwrap();
		state.association_calls += 1;
		if state.failing_associations {
			return Err(api_failure());
		}

		let known = state.associations.get(&(from, to));
		let results = ids
			.iter()
			.filter_map(|id| {
				let targets = known?.get(id)?;
				Some(AssociationResult {
					from: Some(ObjectId { id: id.clone() }),
					to: targets
						.iter()
						.map(|target| AssociationTarget { id: target.clone() })
						.collect(),
				})
			})
			.collect();
		Ok(AssociationBatchResponse { results })
	}

	async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, HubspotError> {
		let mut state = self.state.lock().unwrap();
		state.refresh_calls += 1;
		if state.failing_refresh {
			return Err(HubspotError::ApiError {
				status: 400,
				body: "invalid_grant".to_string(),
			});
		}
		Ok(TokenResponse {
			access_token: format!("fresh-token-{}", state.refresh_calls),
			refresh_token: None,
			expires_in: 1800,
		})
	}
}

#[derive(Default)]
pub struct MemoryAccountStore {
	accounts: Mutex<Vec<Account>>,
	saved: Mutex<Vec<Account>>,
	failing_saves: bool,
	failing_find: bool,
}

impl MemoryAccountStore {
	pub fn with_accounts(accounts: Vec<Account>) -> Self {
		Self {
			accounts: Mutex::new(accounts),
			..Self::default()
		}
	}

	pub fn failing_saves(mut self) -> Self {
		self.failing_saves = true;
		self
	}

	pub fn failing_find(mut self) -> Self {
		self.failing_find = true;
		self
	}

	/// Every account passed to `save`, in call order.
	pub fn saved(&self) -> Vec<Account> {
		self.saved.lock().unwrap().clone()
	}

	pub fn account(&self, hub_id: &str) -> Option<Account> {
		self.accounts
			.lock()
			.unwrap()
			.iter()
			.find(|a| a.hub_id == hub_id)
			.cloned()
	}
}

fn io_failure() -> StoreError {
	StoreError::IoError(std::io::Error::other("disk unavailable"))
}

#[async_trait::async_trait]
impl AccountStore for MemoryAccountStore {
	async fn find_accounts(&self) -> Result<Vec<Account>, StoreError> {
		if self.failing_find {
			return Err(io_failure());
		}
		Ok(self.accounts.lock().unwrap().clone())
	}

	async fn save(&self, account: &Account) -> Result<(), StoreError> {
		if self.failing_saves {
			return Err(io_failure());
		}
		self.saved.lock().unwrap().push(account.clone());
		let mut accounts = self.accounts.lock().unwrap();
		match accounts.iter_mut().find(|a| a.hub_id == account.hub_id) {
			Some(existing) => *existing = account.clone(),
			None => accounts.push(account.clone()),
		}
		Ok(())
	}
}

/// Keeps every successfully emitted batch.
#[derive(Default)]
pub struct RecordingSink {
	batches: Mutex<Vec<Vec<Event>>>,
	calls: Mutex<usize>,
	failing_calls: HashSet<usize>,
	delay: Option<Duration>,
}

impl RecordingSink {
	/// Reject the `call`-th emit (0-based).
	pub fn failing_on(mut self, call: usize) -> Self {
		self.failing_calls.insert(call);
		self
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);
		self
	}

	pub fn batches(&self) -> Vec<Vec<Event>> {
		self.batches.lock().unwrap().clone()
	}

	pub fn events(&self) -> Vec<Event> {
		self.batches().into_iter().flatten().collect()
	}
}

#[async_trait::async_trait]
impl EventSink for RecordingSink {
	async fn emit(&self, batch: &[Event]) -> Result<(), SinkError> {
		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}

		let call = {
			let mut calls = self.calls.lock().unwrap();
			*calls += 1;
			*calls - 1
		};
		if self.failing_calls.contains(&call) {
			return Err(SinkError::Rejected {
				status: 503,
				body: "unavailable".to_string(),
			});
		}

		self.batches.lock().unwrap().push(batch.to_vec());
		Ok(())
	}

	fn name(&self) -> &'static str {
		"recording"
	}
}
