mod accounts;
mod config;
mod hubspot;
mod sink;
mod sync;

use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use crate::accounts::FileAccountStore;
use crate::config::Config;
use crate::hubspot::HubspotClient;
use crate::sink::{EventSink, HttpEventSink, LogEventSink};
use crate::sync::SyncOrchestrator;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting HubSpot event sync");

	let config = match Config::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let client = match HubspotClient::new(
		config.api_base.clone(),
		config.client_id.clone(),
		config.client_secret.clone(),
	) {
		Ok(client) => client,
		Err(e) => {
			error!("Failed to create HubSpot client: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let sink: Arc<dyn EventSink> = match &config.event_sink_url {
		Some(url) => match HttpEventSink::new(url.clone()) {
			Ok(sink) => Arc::new(sink),
			Err(e) => {
				error!("Failed to create event sink: {}", e);
				return ExitCode::FAILURE;
			}
		},
		None => Arc::new(LogEventSink),
	};
	info!(sink = sink.name(), accounts_file = ?config.accounts_file, "Configured sync");

	let store = Arc::new(FileAccountStore::new(config.accounts_file.clone()));
	let orchestrator = SyncOrchestrator::new(Arc::new(client), store, sink, config.sync);

	match orchestrator.run().await {
		Ok(summary) => {
			for report in &summary.accounts {
				info!(
					hub_id = %report.hub_id,
					events = report.flush.events,
					failed_stages = ?report.failed_stages(),
					"Account summary"
				);
			}
			info!("Finished pulling data from HubSpot");
			ExitCode::SUCCESS
		}
		Err(e) => {
			error!("Failed to load accounts: {}", e);
			ExitCode::FAILURE
		}
	}
}
