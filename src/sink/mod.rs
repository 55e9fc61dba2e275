//! Destinations for flushed event batches.
//!
//! The sync engine hands every batch to an [`EventSink`] and never looks at it again. Two
//! sinks ship with the worker: one that writes a structured log record per batch and one that
//! posts the batch as a JSON array to an HTTP endpoint.

use crate::sync::Event;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Receiver of flushed event batches
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
	/// Deliver one batch. Batches arrive in the order they were flushed.
	async fn emit(&self, batch: &[Event]) -> Result<(), SinkError>;

	fn name(&self) -> &'static str;
}

/// Error types for event delivery
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON serialization error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Event sink rejected batch with {status}: {body}")]
	Rejected { status: u16, body: String },
}

/// Writes each batch to the log.
#[derive(Debug, Default, Clone)]
pub struct LogEventSink;

#[async_trait::async_trait]
impl EventSink for LogEventSink {
	async fn emit(&self, batch: &[Event]) -> Result<(), SinkError> {
		let first = batch.first().map(|event| event.action_date());
		let last = batch.last().map(|event| event.action_date());
		info!(
			events = batch.len(),
			first_action_date = ?first,
			last_action_date = ?last,
			"Emitting event batch"
		);
		debug!("{}", serde_json::to_string(batch)?);
		Ok(())
	}

	fn name(&self) -> &'static str {
		"log"
	}
}

/// Posts each batch as a JSON array.
#[derive(Clone)]
pub struct HttpEventSink {
	http_client: Client,
	url: String,
}

impl HttpEventSink {
	pub fn new(url: String) -> Result<Self, SinkError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
		Ok(Self { http_client, url })
	}
}

#[async_trait::async_trait]
impl EventSink for HttpEventSink {
	async fn emit(&self, batch: &[Event]) -> Result<(), SinkError> {
		let response = self.http_client.post(&self.url).json(batch).send().await?;
		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(SinkError::Rejected {
				status: status.as_u16(),
				body,
			});
		}

		debug!(url = %self.url, events = batch.len(), "Posted event batch");
		Ok(())
	}

	fn name(&self) -> &'static str {
		"http"
	}
}
