//! Process configuration loaded from environment variables.

use crate::sync::SyncConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.hubapi.com";
const DEFAULT_ACCOUNTS_FILE: &str = "data/accounts.json";

/// Everything the worker needs to run once over all accounts
#[derive(Debug, Clone)]
pub struct Config {
	/// OAuth client id of the HubSpot app (`HUBSPOT_CID`).
	pub client_id: String,
	/// OAuth client secret of the HubSpot app (`HUBSPOT_CS`).
	pub client_secret: String,
	pub api_base: String,
	pub accounts_file: PathBuf,
	/// When unset, batches are written to the log instead of posted.
	pub event_sink_url: Option<String>,
	pub sync: SyncConfig,
}

impl Config {
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Build the configuration from an arbitrary variable source.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| {
			lookup(name)
				.map(|value| value.trim().to_string())
				.filter(|value| !value.is_empty())
		};

		let client_id = var("HUBSPOT_CID").ok_or(ConfigError::Missing("HUBSPOT_CID"))?;
		let client_secret = var("HUBSPOT_CS").ok_or(ConfigError::Missing("HUBSPOT_CS"))?;

		let mut sync = SyncConfig::default();
		if let Some(value) = var("SYNC_FLUSH_THRESHOLD") {
			sync.flush_threshold = parse("SYNC_FLUSH_THRESHOLD", &value)?;
		}
		if let Some(value) = var("SYNC_PAGE_LIMIT") {
			sync.page_limit = parse("SYNC_PAGE_LIMIT", &value)?;
		}
		if let Some(value) = var("SYNC_MAX_ATTEMPTS") {
			sync.max_attempts = parse("SYNC_MAX_ATTEMPTS", &value)?;
		}
		if let Some(value) = var("SYNC_BASE_DELAY_MS") {
			sync.base_delay = Duration::from_millis(parse("SYNC_BASE_DELAY_MS", &value)?);
		}
		if let Some(value) = var("SYNC_EMAIL_CHUNK_SIZE") {
			sync.email_chunk_size = parse("SYNC_EMAIL_CHUNK_SIZE", &value)?;
		}
		if let Some(value) = var("SYNC_EMAIL_CONCURRENCY") {
			sync.email_lookup_concurrency = parse("SYNC_EMAIL_CONCURRENCY", &value)?;
		}
		sync.validate()?;

		Ok(Self {
			client_id,
			client_secret,
			api_base: var("HUBSPOT_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
			accounts_file: var("ACCOUNTS_FILE")
				.map(PathBuf::from)
				.unwrap_or_else(|| PathBuf::from(DEFAULT_ACCOUNTS_FILE)),
			event_sink_url: var("EVENT_SINK_URL"),
			sync,
		})
	}
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
	value.parse().map_err(|_| ConfigError::Invalid {
		name,
		value: value.to_string(),
	})
}

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Missing required environment variable {0}")]
	Missing(&'static str),

	#[error("Invalid value {value:?} for {name}")]
	Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn defaults_apply_when_only_credentials_are_set() {
		let config =
			Config::from_lookup(lookup(&[("HUBSPOT_CID", "cid"), ("HUBSPOT_CS", "secret")]))
				.unwrap();

		assert_eq!(config.client_id, "cid");
		assert_eq!(config.api_base, DEFAULT_API_BASE);
		assert_eq!(config.accounts_file, PathBuf::from(DEFAULT_ACCOUNTS_FILE));
		assert!(config.event_sink_url.is_none());
		assert_eq!(config.sync.flush_threshold, 2000);
		assert_eq!(config.sync.page_limit, 100);
		assert_eq!(config.sync.max_attempts, 5);
		assert_eq!(config.sync.base_delay, Duration::from_millis(5000));
		assert_eq!(config.sync.email_chunk_size, 50);
	}

	#[test]
	fn missing_client_secret_is_reported() {
		let err = Config::from_lookup(lookup(&[("HUBSPOT_CID", "cid")])).unwrap_err();
		assert!(matches!(err, ConfigError::Missing("HUBSPOT_CS")));
	}

	#[test]
	fn blank_values_count_as_unset() {
		let config = Config::from_lookup(lookup(&[
			("HUBSPOT_CID", "cid"),
			("HUBSPOT_CS", "secret"),
			("EVENT_SINK_URL", "   "),
		]))
		.unwrap();
		assert!(config.event_sink_url.is_none());
	}

	#[test]
	fn overrides_are_parsed() {
		let config = Config::from_lookup(lookup(&[
			("HUBSPOT_CID", "cid"),
			("HUBSPOT_CS", "secret"),
			("SYNC_FLUSH_THRESHOLD", "10"),
			("SYNC_BASE_DELAY_MS", "250"),
			("EVENT_SINK_URL", "http://localhost:9000/events"),
		]))
		.unwrap();
		assert_eq!(config.sync.flush_threshold, 10);
		assert_eq!(config.sync.base_delay, Duration::from_millis(250));
		assert_eq!(
			config.event_sink_url.as_deref(),
			Some("http://localhost:9000/events")
		);
	}

	#[test]
	fn invalid_numbers_are_rejected() {
		let err = Config::from_lookup(lookup(&[
			("HUBSPOT_CID", "cid"),
			("HUBSPOT_CS", "secret"),
			("SYNC_PAGE_LIMIT", "lots"),
		]))
		.unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { name: "SYNC_PAGE_LIMIT", .. }));
	}

	#[test]
	fn zero_attempts_is_rejected() {
		let err = Config::from_lookup(lookup(&[
			("HUBSPOT_CID", "cid"),
			("HUBSPOT_CS", "secret"),
			("SYNC_MAX_ATTEMPTS", "0"),
		]))
		.unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { name: "SYNC_MAX_ATTEMPTS", .. }));
	}
}
