//! Access token lifecycle for a single account.
//!
//! The `CredentialManager` exchanges an account's refresh token for a new access token when
//! the current one has expired, updates the account in memory, and tells the account store
//! that the credentials changed. It never retries on its own; callers decide what a failed
//! refresh means for them.

use crate::accounts::{Account, AccountStore};
use crate::hubspot::CrmApi;
use crate::sync::types::SyncError;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct CredentialManager {
    api: Arc<dyn CrmApi>,
    store: Arc<dyn AccountStore>,
}

impl CredentialManager {
    pub fn new(api: Arc<dyn CrmApi>, store: Arc<dyn AccountStore>) -> Self {
        Self { api, store }
    }

    /// Return a usable access token, refreshing it first when expired.
    pub async fn ensure_valid_token(&self, account: &mut Account) -> Result<String, SyncError> {
        if account.credentials.is_expired(Utc::now()) {
            self.refresh(account).await?;
        }
        Ok(account.credentials.access_token.clone())
    }

    /// Unconditionally exchange the refresh token for a new access token.
    pub async fn refresh(&self, account: &mut Account) -> Result<(), SyncError> {
        let response = self
            .api
            .refresh_token(&account.credentials.refresh_token)
            .await
            .map_err(|source| SyncError::Auth {
                hub_id: account.hub_id.clone(),
                source,
            })?;

        account.credentials.apply_refresh(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            Utc::now(),
        );
        info!(
            hub_id = %account.hub_id,
            expires_at = ?account.credentials.token_expires_at,
            "Refreshed access token"
        );

        if let Err(source) = self.store.save(account).await {
            let err = SyncError::Persistence {
                hub_id: account.hub_id.clone(),
                source,
            };
            error!(hub_id = %account.hub_id, stage = "refresh_token", "{}", err);
        }

        Ok(())
    }
}
