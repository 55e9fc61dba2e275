//! Retry controller for remote page fetches
//!
//! Two policies are composed here: a pure exponential backoff schedule (retry number to delay)
//! and a refresh-on-expiry precondition that renews the account's access token before the next
//! attempt. Refresh failures are logged and the attempt goes ahead with the old token; the
//! attempt budget is shared between both.

use crate::accounts::{Account, Credentials, ResourceType};
use crate::hubspot::HubspotError;
use crate::sync::credentials::CredentialManager;
use crate::sync::types::SyncError;
use backoff::backoff::Backoff;
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff: retry `n` (1-based) waits `base_delay * 2^(n-1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
	pub base_delay: Duration,
	/// Total attempts including the first one.
	pub max_attempts: u32,
}

impl BackoffPolicy {
	pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
		Self {
			base_delay,
			max_attempts,
		}
	}

	/// Delay before retry number `retry` (1-based).
	pub fn delay_for(&self, retry: u32) -> Duration {
		let exponent = retry.saturating_sub(1).min(31);
		self.base_delay.saturating_mul(1u32 << exponent)
	}

	/// A fresh schedule yielding `max_attempts - 1` delays.
	pub fn schedule(&self) -> BackoffSchedule {
		BackoffSchedule {
			policy: *self,
			retries: 0,
		}
	}
}

impl Default for BackoffPolicy {
	fn default() -> Self {
		Self::new(Duration::from_millis(5000), 5)
	}
}

/// Iterator-like view of a [`BackoffPolicy`] for one call.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
	policy: BackoffPolicy,
	retries: u32,
}

impl Backoff for BackoffSchedule {
	fn next_backoff(&mut self) -> Option<Duration> {
		if self.retries + 1 >= self.policy.max_attempts {
			return None;
		}
		self.retries += 1;
		Some(self.policy.delay_for(self.retries))
	}

	fn reset(&mut self) {
		self.retries = 0;
	}
}

/// Runs a fetch with bounded retries, refreshing expired credentials between attempts.
#[derive(Clone)]
pub struct RetryController {
	policy: BackoffPolicy,
	credentials: CredentialManager,
}

impl RetryController {
	pub fn new(policy: BackoffPolicy, credentials: CredentialManager) -> Self {
		Self {
			policy,
			credentials,
		}
	}

	/// Execute `operation` with the account's current credentials until it succeeds or the
	/// attempt budget is spent.
	///
	/// # Errors
	/// Returns [`SyncError::FetchExhausted`] carrying the last transport error.
	pub async fn with_retry<T, F, Fut>(
		&self,
		account: &mut Account,
		resource: ResourceType,
		mut operation: F,
	) -> Result<T, SyncError>
	where
		F: FnMut(Credentials) -> Fut,
		Fut: Future<Output = Result<T, HubspotError>>,
	{
		let mut schedule = self.policy.schedule();
		let mut attempt = 0u32;

		loop {
			attempt += 1;
			let err = match operation(account.credentials.clone()).await {
				Ok(result) => return Ok(result),
				Err(err) => err,
			};

			let Some(delay) = schedule.next_backoff() else {
				warn!(
					hub_id = %account.hub_id,
					resource = %resource,
					attempts = attempt,
					error = %err,
					"Max attempts exhausted"
				);
				return Err(SyncError::FetchExhausted {
					resource,
					attempts: attempt,
					source: err,
				});
			};

			warn!(
				hub_id = %account.hub_id,
				resource = %resource,
				attempt,
				max_attempts = self.policy.max_attempts,
				backoff_ms = delay.as_millis() as u64,
				error = %err,
				"Fetch failed, retrying"
			);

			if account.credentials.is_expired(Utc::now()) {
				debug!(hub_id = %account.hub_id, "Access token expired, refreshing before retry");
				if let Err(refresh_err) = self.credentials.refresh(account).await {
					warn!(
						hub_id = %account.hub_id,
						resource = %resource,
						error = %refresh_err,
						"Token refresh failed, retrying with current token"
					);
				}
			}

			tokio::time::sleep(delay).await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::hubspot::CrmApi;
	use crate::sync::testing::{FakeCrm, MemoryAccountStore, account, api_failure};
	use chrono::Duration as ChronoDuration;
	use std::sync::Arc;
	use std::sync::atomic::{AtomicU32, Ordering};

	fn controller(crm: Arc<FakeCrm>) -> RetryController {
		let store = Arc::new(MemoryAccountStore::default());
		RetryController::new(
			BackoffPolicy::default(),
			CredentialManager::new(crm as Arc<dyn CrmApi>, store),
		)
	}

	#[test]
	fn delays_double_from_base() {
		let policy = BackoffPolicy::default();
		let delays: Vec<u64> = (1..=4).map(|n| policy.delay_for(n).as_secs()).collect();
		assert_eq!(delays, vec![5, 10, 20, 40]);
	}

	#[test]
	fn schedule_yields_one_delay_per_retry() {
		let mut schedule = BackoffPolicy::default().schedule();
		let mut delays = Vec::new();
		while let Some(delay) = schedule.next_backoff() {
			delays.push(delay.as_secs());
		}
		assert_eq!(delays, vec![5, 10, 20, 40]);

		schedule.reset();
		assert_eq!(schedule.next_backoff(), Some(Duration::from_secs(5)));
	}

	#[test]
	fn single_attempt_policy_never_sleeps() {
		let mut schedule = BackoffPolicy::new(Duration::from_secs(5), 1).schedule();
		assert_eq!(schedule.next_backoff(), None);
	}

	#[tokio::test(start_paused = true)]
	async fn first_success_returns_without_sleeping() {
		let crm = Arc::new(FakeCrm::default());
		let retry = controller(crm.clone());
		let mut acct = account("1");
		let started = tokio::time::Instant::now();

		let result: Result<u32, SyncError> = retry
			.with_retry(&mut acct, ResourceType::Contacts, |_| async { Ok(7) })
			.await;

		assert_eq!(result.unwrap(), 7);
		assert_eq!(started.elapsed(), Duration::ZERO);
		assert_eq!(crm.refresh_calls(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn four_failures_then_success_sleeps_with_growing_delays() {
		let crm = Arc::new(FakeCrm::default().failing_refresh());
		let retry = controller(crm.clone());
		let mut acct = account("1");
		let calls = Arc::new(AtomicU32::new(0));
		let started = tokio::time::Instant::now();
		let marks = Arc::new(std::sync::Mutex::new(Vec::new()));

		let result = retry
			.with_retry(&mut acct, ResourceType::Companies, |_| {
				let calls = calls.clone();
				let marks = marks.clone();
				async move {
					marks.lock().unwrap().push(started.elapsed().as_secs());
					if calls.fetch_add(1, Ordering::SeqCst) < 4 {
						Err(api_failure())
					} else {
						Ok("page")
					}
				}
			})
			.await;

		assert_eq!(result.unwrap(), "page");
		assert_eq!(calls.load(Ordering::SeqCst), 5);
		// attempts start at 0s, 5s, 15s, 35s and 75s
		assert_eq!(*marks.lock().unwrap(), vec![0, 5, 15, 35, 75]);
		assert_eq!(crm.refresh_calls(), 4);
	}

	#[tokio::test(start_paused = true)]
	async fn successful_refresh_is_used_by_next_attempt() {
		let crm = Arc::new(FakeCrm::default());
		let retry = controller(crm.clone());
		let mut acct = account("1");
		let tokens = Arc::new(std::sync::Mutex::new(Vec::new()));

		let result = retry
			.with_retry(&mut acct, ResourceType::Contacts, |creds| {
				let tokens = tokens.clone();
				async move {
					let mut tokens = tokens.lock().unwrap();
					tokens.push(creds.access_token);
					if tokens.len() == 1 {
						Err(api_failure())
					} else {
						Ok(())
					}
				}
			})
			.await;

		assert!(result.is_ok());
		assert_eq!(
			*tokens.lock().unwrap(),
			vec!["stale-token".to_string(), "fresh-token-1".to_string()]
		);
		assert_eq!(crm.refresh_calls(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn unexpired_token_is_not_refreshed() {
		let crm = Arc::new(FakeCrm::default());
		let retry = controller(crm.clone());
		let mut acct = account("1");
		acct.credentials.token_expires_at = Some(Utc::now() + ChronoDuration::hours(1));
		let calls = Arc::new(AtomicU32::new(0));

		let _ = retry
			.with_retry(&mut acct, ResourceType::Contacts, |_| {
				let calls = calls.clone();
				async move {
					if calls.fetch_add(1, Ordering::SeqCst) == 0 {
						Err(api_failure())
					} else {
						Ok(())
					}
				}
			})
			.await;

		assert_eq!(crm.refresh_calls(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn five_failures_exhaust_the_budget() {
		let crm = Arc::new(FakeCrm::default());
		let retry = controller(crm.clone());
		let mut acct = account("1");
		let calls = Arc::new(AtomicU32::new(0));
		let started = tokio::time::Instant::now();

		let result: Result<(), SyncError> = retry
			.with_retry(&mut acct, ResourceType::Meetings, |_| {
				let calls = calls.clone();
				async move {
					calls.fetch_add(1, Ordering::SeqCst);
					Err(api_failure())
				}
			})
			.await;

		match result {
			Err(SyncError::FetchExhausted {
				resource, attempts, ..
			}) => {
				assert_eq!(resource, ResourceType::Meetings);
				assert_eq!(attempts, 5);
			}
			other => panic!("expected FetchExhausted, got {:?}", other),
		}
		assert_eq!(calls.load(Ordering::SeqCst), 5);
		// no sleep after the final failure
		assert_eq!(started.elapsed().as_secs(), 75);
	}
}
