//! HTTP client for the HubSpot CRM v3 API.
//!
//! Every call takes the caller's [`Credentials`] explicitly, so one client can serve any
//! number of accounts. Non-success responses are turned into [`HubspotError`] values that
//! carry the status code and response body for logging.

use super::types::*;
use crate::accounts::{Credentials, ResourceType};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Operations the sync engine needs from the CRM.
#[async_trait::async_trait]
pub trait CrmApi: Send + Sync {
	/// Run one page of an object search.
	async fn search(
		&self,
		credentials: &Credentials,
		resource: ResourceType,
		request: &SearchRequest,
	) -> Result<SearchResponse, HubspotError>;

	/// Read the associations of `ids` from one object type to another.
	async fn associations_batch_read(
		&self,
		credentials: &Credentials,
		from: ResourceType,
		to: ResourceType,
		ids: &[String],
	) -> Result<AssociationBatchResponse, HubspotError>;

	/// Exchange a refresh token for a new access token.
	async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, HubspotError>;
}

/// HubSpot REST client
#[derive(Clone)]
pub struct HubspotClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the API, e.g. `https://api.hubapi.com`.
	api_base: String,
	/// OAuth application client id.
	client_id: String,
	/// OAuth application client secret.
	client_secret: String,
}

impl HubspotClient {
	/// Create a new HubSpot client.
	///
	/// # Arguments
	/// * `api_base` - Base URL of the HubSpot API.
	/// * `client_id` - OAuth client id of the app.
	/// * `client_secret` - OAuth client secret of the app.
	pub fn new(
		api_base: String,
		client_id: String,
		client_secret: String,
	) -> Result<Self, HubspotError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			http_client,
			api_base: api_base.trim_end_matches('/').to_string(),
			client_id,
			client_secret,
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.api_base, path)
	}

	/// Send a request and decode a JSON body, mapping error statuses.
	async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, HubspotError> {
		let response = request.send().await?;
		let status = response.status();

		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			if status == StatusCode::TOO_MANY_REQUESTS {
				return Err(HubspotError::RateLimited(body));
			}
			return Err(HubspotError::ApiError {
				status: status.as_u16(),
				body,
			});
		}

		let bytes = response.bytes().await?;
		Ok(serde_json::from_slice(&bytes)?)
	}
}

#[async_trait::async_trait]
impl CrmApi for HubspotClient {
	async fn search(
		&self,
		credentials: &Credentials,
		resource: ResourceType,
		request: &SearchRequest,
	) -> Result<SearchResponse, HubspotError> {
		let url = self.url(&format!("/crm/v3/objects/{}/search", resource.object_path()));
		debug!(
			resource = %resource,
			after = ?request.after,
			limit = request.limit,
			"Searching CRM objects"
		);

		let builder = self
			.http_client
			.post(url)
			.bearer_auth(&credentials.access_token)
			.json(request);
		self.execute(builder).await
	}

	async fn associations_batch_read(
		&self,
		credentials: &Credentials,
		from: ResourceType,
		to: ResourceType,
		ids: &[String],
	) -> Result<AssociationBatchResponse, HubspotError> {
		let url = self.url(&format!(
			"/crm/v3/associations/{}/{}/batch/read",
			from.association_key(),
			to.association_key()
		));
		debug!(from = %from, to = %to, count = ids.len(), "Reading associations");

		let builder = self
			.http_client
			.post(url)
			.bearer_auth(&credentials.access_token)
			.json(&AssociationBatchRequest::new(ids));
		self.execute(builder).await
	}

	async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, HubspotError> {
		let form = [
			("grant_type", "refresh_token"),
			("client_id", self.client_id.as_str()),
			("client_secret", self.client_secret.as_str()),
			("refresh_token", refresh_token),
		];

		let builder = self.http_client.post(self.url("/oauth/v1/token")).form(&form);
		self.execute(builder).await
	}
}
