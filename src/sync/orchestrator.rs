//! Sync orchestrator and integration point for all sync services.
//!
//! This module defines the `SyncOrchestrator`, which runs one pass over every connected account.
//! Accounts are processed strictly one after another, and each account goes through the same
//! stages: make sure the access token is valid, sync contacts, companies and meetings, drain the
//! event batcher, and persist the account's new sync state.
//!
//! A failing stage is logged with the account's hub id and the stage name and never prevents
//! later stages or later accounts from running. Only a failure to load the accounts at all ends
//! the run with an error. A resource's `lastPulledDate` only moves forward when all of its pages
//! were processed, so an aborted stage is retried in full on the next run.

use crate::accounts::{Account, AccountStore};
use crate::hubspot::CrmApi;
use crate::sink::EventSink;
use crate::sync::{
    associations::AssociationResolver,
    batcher::{EventBatcher, FlushReport},
    credentials::CredentialManager,
    pagination::{ChangeKind, PageState, ResourceCursor},
    progress_tracker::{ResourceStats, SyncProgressTracker},
    retry::RetryController,
    strategies::{CompanySync, ContactSync, MeetingSync, ResourceSync, SyncConfig},
    types::{Stage, SyncError},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a single stage of an account's sync ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
}

/// Outcome of one account's sync
#[derive(Debug, Clone)]
pub struct AccountReport {
    pub hub_id: String,
    pub stages: Vec<StageOutcome>,
    pub resources: Vec<ResourceStats>,
    pub flush: FlushReport,
}

impl AccountReport {
    fn new(hub_id: &str) -> Self {
        Self {
            hub_id: hub_id.to_string(),
            stages: Vec::new(),
            resources: Vec::new(),
            flush: FlushReport::default(),
        }
    }

    fn completed(&mut self, stage: Stage) {
        self.stages.push(StageOutcome {
            stage,
            status: StageStatus::Completed,
        });
    }

    fn failed(&mut self, stage: Stage, err: &SyncError) {
        error!(hub_id = %self.hub_id, stage = %stage, "Stage failed: {}", err);
        self.stages.push(StageOutcome {
            stage,
            status: StageStatus::Failed(err.to_string()),
        });
    }

    #[cfg(test)]
    pub fn status_of(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages
            .iter()
            .find(|outcome| outcome.stage == stage)
            .map(|outcome| &outcome.status)
    }

    pub fn failed_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|outcome| matches!(outcome.status, StageStatus::Failed(_)))
            .map(|outcome| outcome.stage)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed_stages().is_empty()
    }
}

/// Outcome of one run over all accounts
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub accounts: Vec<AccountReport>,
}

impl RunSummary {
    pub fn events_emitted(&self) -> usize {
        self.accounts
            .iter()
            .map(|report| report.flush.events - report.flush.failed_events)
            .sum()
    }

    pub fn failed_accounts(&self) -> usize {
        self.accounts.iter().filter(|report| !report.is_success()).count()
    }
}

/// Runs the incremental sync over every account.
pub struct SyncOrchestrator {
    api: Arc<dyn CrmApi>,
    store: Arc<dyn AccountStore>,
    sink: Arc<dyn EventSink>,
    credentials: CredentialManager,
    retry: RetryController,
    /// Resource strategies in sync order
    strategies: Vec<Box<dyn ResourceSync>>,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(
        api: Arc<dyn CrmApi>,
        store: Arc<dyn AccountStore>,
        sink: Arc<dyn EventSink>,
        config: SyncConfig,
    ) -> Self {
        let credentials = CredentialManager::new(api.clone(), store.clone());
        let retry = RetryController::new(config.backoff_policy(), credentials.clone());
        let resolver = AssociationResolver::new(
            api.clone(),
            config.email_chunk_size,
            config.email_lookup_concurrency,
        );

        let strategies: Vec<Box<dyn ResourceSync>> = vec![
            Box::new(ContactSync::new(resolver.clone())),
            Box::new(CompanySync),
            Box::new(MeetingSync::new(resolver)),
        ];

        Self {
            api,
            store,
            sink,
            credentials,
            retry,
            strategies,
            config,
        }
    }

    /// Sync every account once.
    ///
    /// # Errors
    /// Only when the accounts cannot be loaded; per-stage failures end up in the summary.
    pub async fn run(&self) -> Result<RunSummary, SyncError> {
        let accounts = self.store.find_accounts().await?;
        info!(accounts = accounts.len(), "Starting HubSpot sync run");

        let mut summary = RunSummary::default();
        for mut account in accounts {
            let report = self.sync_account(&mut account).await;
            summary.accounts.push(report);
        }

        info!(
            accounts = summary.accounts.len(),
            failed_accounts = summary.failed_accounts(),
            events = summary.events_emitted(),
            "HubSpot sync run finished"
        );
        Ok(summary)
    }

    async fn sync_account(&self, account: &mut Account) -> AccountReport {
        info!(hub_id = %account.hub_id, "Start processing account");
        let mut report = AccountReport::new(&account.hub_id);
        let mut batcher =
            EventBatcher::spawn(&account.hub_id, self.sink.clone(), self.config.flush_threshold);

        match self.credentials.ensure_valid_token(account).await {
            Ok(_) => report.completed(Stage::RefreshToken),
            Err(err) => report.failed(Stage::RefreshToken, &err),
        }

        for strategy in &self.strategies {
            let stage = Stage::Resource(strategy.resource());
            match self
                .sync_resource(strategy.as_ref(), account, &mut batcher, Utc::now())
                .await
            {
                Ok(stats) => {
                    info!(hub_id = %account.hub_id, stage = %stage, "{}", stats.summary());
                    report.resources.push(stats);
                    report.completed(stage);
                    self.checkpoint(account, stage).await;
                }
                Err(err) => report.failed(stage, &err),
            }
        }

        report.flush = batcher.drain().await;
        if report.flush.failed_batches == 0 {
            report.completed(Stage::Drain);
        } else {
            warn!(
                hub_id = %account.hub_id,
                stage = %Stage::Drain,
                failed_batches = report.flush.failed_batches,
                failed_events = report.flush.failed_events,
                "Some event batches were not delivered"
            );
            report.stages.push(StageOutcome {
                stage: Stage::Drain,
                status: StageStatus::Failed(format!(
                    "{} of {} batches failed",
                    report.flush.failed_batches, report.flush.batches
                )),
            });
        }

        match self.store.save(account).await {
            Ok(()) => report.completed(Stage::Persist),
            Err(source) => {
                let err = SyncError::Persistence {
                    hub_id: account.hub_id.clone(),
                    source,
                };
                report.failed(Stage::Persist, &err);
            }
        }

        info!(
            hub_id = %account.hub_id,
            events = report.flush.events,
            failed_stages = report.failed_stages().len(),
            "Finished processing account"
        );
        report
    }

    /// Save the account after a resource completed. Failures are logged only; the final
    /// persist stage writes the same state again.
    async fn checkpoint(&self, account: &Account, stage: Stage) {
        if let Err(source) = self.store.save(account).await {
            let err = SyncError::Persistence {
                hub_id: account.hub_id.clone(),
                source,
            };
            error!(hub_id = %account.hub_id, stage = %stage, "{}", err);
        }
    }

    /// Page through one resource type and push its events.
    ///
    /// `now` closes the window; it becomes the resource's `lastPulledDate` once every page
    /// has been processed.
    async fn sync_resource(
        &self,
        strategy: &dyn ResourceSync,
        account: &mut Account,
        batcher: &mut EventBatcher,
        now: DateTime<Utc>,
    ) -> Result<ResourceStats, SyncError> {
        let resource = strategy.resource();
        let last_pulled_date = account.last_pulled_date(resource);
        let mut cursor = ResourceCursor::open(resource, last_pulled_date, now, self.config.page_limit);
        let mut tracker = SyncProgressTracker::new(resource);

        info!(
            hub_id = %account.hub_id,
            resource = %resource,
            strategy = strategy.name(),
            window_start = %cursor.window_start(),
            window_end = %cursor.window_end(),
            "Starting resource sync"
        );

        loop {
            let request = cursor.search_request();
            let api = self.api.clone();
            let response = self
                .retry
                .with_retry(account, resource, |credentials| {
                    let api = api.clone();
                    let request = request.clone();
                    async move { api.search(&credentials, resource, &request).await }
                })
                .await?;
            tracker.record_page();

            if response.results.is_empty() && strategy.stops_on_empty_page() {
                debug!(hub_id = %account.hub_id, resource = %resource, "Empty page, no more records");
                break;
            }

            for record in &response.results {
                tracker.record_change(
                    &record.id,
                    ChangeKind::classify(record.created_at, last_pulled_date),
                );
            }

            let events = strategy
                .events_for_page(&account.credentials, &response.results, last_pulled_date)
                .await?;
            tracker.record_events(events.len());
            batcher.extend(events);
            tracker.log_progress(&account.hub_id, false);

            match cursor.advance(response.next_after(), &response.results) {
                PageState::More => {}
                PageState::Slid => tracker.record_slide(),
                PageState::Done => break,
            }
        }

        account.mark_pulled(resource, cursor.window_end());
        tracker.log_progress(&account.hub_id, true);
        tracker.validate_completion(&account.hub_id);
        Ok(tracker.get_stats())
    }
}
