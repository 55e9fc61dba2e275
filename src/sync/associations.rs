//! Cross-entity association resolution.
//!
//! Two lookups are supported: a single batch read of CRM associations (meeting to contacts,
//! contact to company) and a chunked reverse lookup of contact emails by id. Ids with no
//! match are simply absent from the returned maps; callers treat absence as "no association".

use crate::accounts::{Credentials, ResourceType};
use crate::hubspot::{CrmApi, Filter, FilterGroup, SearchRequest};
use crate::sync::types::SyncError;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Mapping from a source id to its related ids, rebuilt per page.
pub type AssociationIndex = HashMap<String, Vec<String>>;

/// Mapping from contact id to email address.
pub type EmailIndex = HashMap<String, String>;

#[derive(Clone)]
pub struct AssociationResolver {
	api: Arc<dyn CrmApi>,
	email_chunk_size: usize,
	concurrency: usize,
}

impl AssociationResolver {
	pub fn new(api: Arc<dyn CrmApi>, email_chunk_size: usize, concurrency: usize) -> Self {
		Self {
			api,
			email_chunk_size: email_chunk_size.max(1),
			concurrency: concurrency.max(1),
		}
	}

	/// Resolve every association of `source_ids` from `from` to `to` in one batch read.
	pub async fn resolve_associations(
		&self,
		credentials: &Credentials,
		source_ids: &[String],
		from: ResourceType,
		to: ResourceType,
	) -> Result<AssociationIndex, SyncError> {
		if source_ids.is_empty() {
			return Ok(AssociationIndex::new());
		}

		let response = self
			.api
			.associations_batch_read(credentials, from, to, source_ids)
			.await
			.map_err(|source| SyncError::AssociationLookup { from, to, source })?;

		let index: AssociationIndex = response
			.results
			.into_iter()
			.filter_map(|result| {
				let from_id = result.from?.id;
				let targets: Vec<String> = result.to.into_iter().map(|target| target.id).collect();
				(!targets.is_empty()).then_some((from_id, targets))
			})
			.collect();

		debug!(
			from = %from,
			to = %to,
			requested = source_ids.len(),
			resolved = index.len(),
			"Resolved associations"
		);
		Ok(index)
	}

	/// Resolve a 1:1 relation, keeping only the first associated id.
	pub async fn resolve_first(
		&self,
		credentials: &Credentials,
		source_ids: &[String],
		from: ResourceType,
		to: ResourceType,
	) -> Result<HashMap<String, String>, SyncError> {
		let index = self
			.resolve_associations(credentials, source_ids, from, to)
			.await?;

		Ok(index
			.into_iter()
			.filter_map(|(id, targets)| targets.into_iter().next().map(|target| (id, target)))
			.collect())
	}

	/// Look up emails for `contact_ids` in fixed-size chunks.
	///
	/// A failing chunk is logged and contributes nothing; the lookup itself never fails.
	pub async fn resolve_emails(&self, credentials: &Credentials, contact_ids: &[String]) -> EmailIndex {
		let unique: Vec<String> = contact_ids.iter().unique().cloned().collect();
		if unique.is_empty() {
			debug!("No contact ids provided for email lookup");
			return EmailIndex::new();
		}

		let chunks: Vec<Vec<String>> = unique
			.chunks(self.email_chunk_size)
			.map(|chunk| chunk.to_vec())
			.collect();
		info!(
			contacts = unique.len(),
			chunks = chunks.len(),
			"Fetching emails for meeting participants"
		);

		let lookups = stream::iter(chunks.into_iter().enumerate())
			.map(|(n, chunk)| {
				let api = self.api.clone();
				let credentials = credentials.clone();
				async move {
					let request = email_search_request(&chunk);
					match api.search(&credentials, ResourceType::Contacts, &request).await {
						Ok(response) => response
							.results
							.into_iter()
							.filter_map(|contact| {
								let email = contact.property("email")?.to_string();
								Some((contact.id, email))
							})
							.collect::<Vec<_>>(),
						Err(source) => {
							let err = SyncError::AssociationLookup {
								from: ResourceType::Meetings,
								to: ResourceType::Contacts,
								source,
							};
							error!(chunk = n + 1, size = chunk.len(), "Email lookup failed: {}", err);
							Vec::new()
						}
					}
				}
			})
			.buffer_unordered(self.concurrency)
			.collect::<Vec<_>>()
			.await;

		lookups.into_iter().flatten().collect()
	}
}

fn email_search_request(chunk: &[String]) -> SearchRequest {
	SearchRequest {
		filter_groups: vec![FilterGroup {
			filters: vec![Filter::one_of("hs_object_id", chunk.to_vec())],
		}],
		sorts: Vec::new(),
		properties: vec!["email".to_string()],
		limit: chunk.len() as u32,
		after: None,
	}
}
