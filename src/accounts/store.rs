use crate::accounts::types::{Account, StoreError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Persistence of connected accounts and their sync state
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
	async fn find_accounts(&self) -> Result<Vec<Account>, StoreError>;

	/// Persist refreshed credentials and `lastPulledDates` for one account.
	async fn save(&self, account: &Account) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsDocument {
	#[serde(default)]
	accounts: Vec<Account>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// File-based implementation of AccountStore
///
/// Accounts live in a single pretty-printed JSON document. Every save rewrites the
/// document through a temporary file followed by a rename.
pub struct FileAccountStore {
	path: PathBuf,
	write_lock: Mutex<()>,
}

impl FileAccountStore {
	pub fn new(path: PathBuf) -> Self {
		Self {
			path,
			write_lock: Mutex::new(()),
		}
	}

	async fn read_document(&self) -> Result<AccountsDocument, StoreError> {
		if !tokio::fs::try_exists(&self.path).await? {
			debug!("Accounts file {:?} does not exist yet", self.path);
			return Ok(AccountsDocument::default());
		}

		let content = tokio::fs::read_to_string(&self.path).await?;
		Ok(serde_json::from_str(&content)?)
	}

	async fn write_document(&self, document: &AccountsDocument) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await?;
			}
		}

		let tmp_path = self.path.with_extension("json.tmp");
		tokio::fs::write(&tmp_path, serde_json::to_string_pretty(document)?).await?;
		tokio::fs::rename(&tmp_path, &self.path).await?;
		Ok(())
	}
}

#[async_trait::async_trait]
impl AccountStore for FileAccountStore {
	async fn find_accounts(&self) -> Result<Vec<Account>, StoreError> {
		let document = self.read_document().await?;
		info!(
			"Loaded {} accounts from {:?}",
			document.accounts.len(),
			self.path
		);
		Ok(document.accounts)
	}

	async fn save(&self, account: &Account) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock().await;

		let mut document = self.read_document().await?;
		let slot = document
			.accounts
			.iter_mut()
			.find(|stored| stored.hub_id == account.hub_id)
			.ok_or_else(|| StoreError::UnknownAccount(account.hub_id.clone()))?;
		*slot = account.clone();
		document.updated_at = Some(chrono::Utc::now());

		self.write_document(&document).await?;
		debug!(hub_id = %account.hub_id, "Saved account state to {:?}", self.path);
		Ok(())
	}
}
