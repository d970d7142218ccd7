//! Storage client: account resolution, cache mutation and client factories.
//!
//! Resolution order for [`StorageClient::find_account`]:
//! 1. Directory (cache hit)
//! 2. Subscription-wide enumeration, bulk-populating the directory
//! 3. Directory again (hit, or the account does not exist)

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::account::AccountDetails;
use crate::data_plane::{DataPlaneClient, DataPlaneKind};
use crate::directory::AccountDirectory;
use crate::error::{StorageError, StorageResult};
use crate::management::{ArmClient, ManagementClient};
use crate::types::{ManagementConfig, PopulateMode, StorageAccount};

/// Storage client.
///
/// Cheap to clone; clones share the directory, the resolve gate and the
/// keyed key cache.
#[derive(Clone)]
pub struct StorageClient {
    /// Management plane.
    management: Arc<dyn ManagementClient>,

    /// Name -> account cache.
    directory: Arc<AccountDirectory>,

    /// Serializes cache-miss enumerations.
    resolve_gate: Arc<Mutex<()>>,

    /// "{resource_group}/{name}" (lower-cased) -> key cell, for lookups that
    /// bypass the directory. The map lock is never held across a fetch.
    key_cache: Arc<RwLock<HashMap<String, Arc<OnceCell<String>>>>>,

    /// Malformed-id handling during bulk populate.
    populate: PopulateMode,

    /// Storage DNS suffix for data-plane endpoints.
    storage_suffix: String,
}

impl StorageClient {
    /// Create a client over `management` with an empty directory.
    pub fn new(management: Arc<dyn ManagementClient>) -> Self {
        Self::with_directory(management, Arc::new(AccountDirectory::new()))
    }

    /// Create a client over an existing directory.
    pub fn with_directory(
        management: Arc<dyn ManagementClient>,
        directory: Arc<AccountDirectory>,
    ) -> Self {
        let defaults = ManagementConfig::default();
        Self {
            management,
            directory,
            resolve_gate: Arc::new(Mutex::new(())),
            key_cache: Arc::new(RwLock::new(HashMap::new())),
            populate: defaults.populate,
            storage_suffix: defaults.storage_suffix,
        }
    }

    /// Create a client backed by Resource Manager.
    pub fn from_config(config: ManagementConfig) -> StorageResult<Self> {
        let populate = config.populate;
        let storage_suffix = config.storage_suffix.clone();
        let management = Arc::new(ArmClient::new(config)?);

        Ok(Self::new(management)
            .with_populate_mode(populate)
            .with_storage_suffix(storage_suffix))
    }

    pub fn from_env() -> StorageResult<Self> {
        Self::from_config(ManagementConfig::from_env())
    }

    /// Set how malformed ids are handled during bulk populate.
    pub fn with_populate_mode(mut self, populate: PopulateMode) -> Self {
        self.populate = populate;
        self
    }

    /// Set the storage DNS suffix.
    pub fn with_storage_suffix(mut self, storage_suffix: impl Into<String>) -> Self {
        self.storage_suffix = storage_suffix.into();
        self
    }

    pub fn directory(&self) -> &Arc<AccountDirectory> {
        &self.directory
    }

    pub fn management(&self) -> &Arc<dyn ManagementClient> {
        &self.management
    }

    pub fn populate_mode(&self) -> PopulateMode {
        self.populate
    }

    /// Resolve an account by name.
    ///
    /// Returns `Ok(None)` when the account is absent from both the directory
    /// and a full enumeration of the subscription. On a miss, every
    /// enumerated account is cached, not only the requested one.
    pub async fn find_account(&self, name: &str) -> StorageResult<Option<Arc<AccountDetails>>> {
        if let Some(existing) = self.directory.get(name).await {
            debug!(account = name, "account cache hit");
            return Ok(Some(existing));
        }

        let _gate = self.resolve_gate.lock().await;

        // Someone ahead of us in the queue may have populated it.
        if let Some(existing) = self.directory.get(name).await {
            debug!(account = name, "account populated while waiting");
            return Ok(Some(existing));
        }

        debug!(account = name, "account cache miss, enumerating subscription");
        let since = self.directory.snapshot().await;

        let accounts = self
            .management
            .list_accounts()
            .await
            .map_err(|e| StorageError::ListAccounts {
                source: Box::new(e),
            })?;

        let (entries, requested_error) = self.collect_entries(name, &accounts)?;
        let outcome = self.directory.populate(since, entries).await;

        info!(
            account = name,
            listed = accounts.len(),
            inserted = outcome.inserted,
            retained = outcome.retained,
            stale = outcome.stale,
            "populated account directory"
        );

        if let Some(e) = requested_error {
            return Err(e);
        }

        let found = self.directory.get(name).await;
        if found.is_none() {
            debug!(account = name, "account not found in subscription");
        }
        Ok(found)
    }

    /// Turn enumerated accounts into directory entries.
    ///
    /// In all-or-nothing mode the first bad id fails the whole batch. In
    /// best-effort mode bad entries are skipped and, if the requested name
    /// was one of them, its error is handed back separately.
    fn collect_entries(
        &self,
        requested: &str,
        accounts: &[StorageAccount],
    ) -> StorageResult<(Vec<(String, AccountDetails)>, Option<StorageError>)> {
        let mut entries = Vec::with_capacity(accounts.len());
        let mut requested_error = None;

        for account in accounts {
            let Some(name) = account.name.as_deref() else {
                continue;
            };

            match AccountDetails::from_account(name, account) {
                Ok(details) => entries.push((name.to_string(), details)),
                Err(e) => match self.populate {
                    PopulateMode::AllOrNothing => return Err(e),
                    PopulateMode::BestEffort => {
                        warn!(account = name, error = %e, "skipping account with malformed id");
                        if name == requested {
                            requested_error = Some(e);
                        }
                    }
                },
            }
        }

        Ok((entries, requested_error))
    }

    /// Primary access key for a resolved account.
    pub async fn account_key(&self, account: &AccountDetails) -> StorageResult<String> {
        account.account_key(self.management.as_ref()).await
    }

    /// Seed the directory after a successful create.
    ///
    /// Replaces any existing entry for `name`; the new entry has no cached key.
    pub async fn add_to_cache(&self, name: &str, account: &StorageAccount) -> StorageResult<()> {
        let details = AccountDetails::from_account(name, account)?;
        let details = self.cache_details(name, details).await;

        debug!(account = name, resource_group = %details.resource_group(), "added account to cache");
        Ok(())
    }

    /// Re-read one account from the management API and cache it.
    ///
    /// For callers that only hold the resource group and name after a create
    /// or update. An account that no longer exists is evicted and `Ok(None)`
    /// is returned.
    pub async fn refresh_account(
        &self,
        resource_group: &str,
        name: &str,
    ) -> StorageResult<Option<Arc<AccountDetails>>> {
        let account = self
            .management
            .get_account(resource_group, name)
            .await
            .map_err(|e| StorageError::GetAccount {
                account: name.to_string(),
                resource_group: resource_group.to_string(),
                source: Box::new(e),
            })?;

        let Some(account) = account else {
            debug!(account = name, resource_group, "account gone, evicting");
            self.remove_account_from_cache(name).await;
            return Ok(None);
        };

        let details = AccountDetails::from_account(name, &account)?;
        let details = self.cache_details(name, details).await;

        debug!(account = name, resource_group, "refreshed account");
        Ok(Some(details))
    }

    /// Evict an account after a successful delete. No-op if absent.
    ///
    /// Also drops every keyed lookup for `name`, whatever resource group it
    /// was fetched under.
    pub async fn remove_account_from_cache(&self, name: &str) {
        let removed = self.directory.delete(name).await;
        let evicted = self.evict_keys(name).await;

        if removed.is_some() || evicted > 0 {
            debug!(account = name, evicted_keys = evicted, "removed account from cache");
        }
    }

    async fn cache_details(&self, name: &str, details: AccountDetails) -> Arc<AccountDetails> {
        let details = self.directory.put(name, details).await;
        self.evict_keys(name).await;
        details
    }

    async fn evict_keys(&self, name: &str) -> usize {
        let name = name.to_ascii_lowercase();
        let mut cache = self.key_cache.write().await;
        let before = cache.len();
        cache.retain(|index, _| {
            !index
                .rsplit_once('/')
                .is_some_and(|(_, cached_name)| cached_name == name)
        });
        before - cache.len()
    }

    /// Primary key for an account addressed by resource group and name.
    ///
    /// Bypasses the directory. Returns `Ok(None)` if the management API
    /// reports the account does not exist. Concurrent lookups for the same
    /// account share one `list_keys` call; different accounts fetch in
    /// parallel.
    pub async fn key_for_account(
        &self,
        resource_group: &str,
        name: &str,
    ) -> StorageResult<Option<String>> {
        let cell = self.key_cell(resource_group, name).await;

        if let Some(key) = cell.get() {
            return Ok(Some(key.clone()));
        }

        let result = cell
            .get_or_try_init(|| async {
                debug!(account = name, resource_group, "keyed lookup miss, listing account keys");

                let keys = self
                    .management
                    .list_keys(resource_group, name)
                    .await
                    .map_err(|e| StorageError::ListKeys {
                        account: name.to_string(),
                        resource_group: resource_group.to_string(),
                        source: Box::new(e),
                    })?;

                let primary = keys.primary().ok_or_else(|| StorageError::MissingKeys {
                    account: name.to_string(),
                    resource_group: resource_group.to_string(),
                })?;

                Ok::<_, StorageError>(primary.to_string())
            })
            .await;

        match result {
            Ok(key) => Ok(Some(key.clone())),
            Err(e) if e.is_not_found() => {
                debug!(account = name, resource_group, "account not found while listing keys");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Cell for a keyed lookup, created empty on first use.
    async fn key_cell(&self, resource_group: &str, name: &str) -> Arc<OnceCell<String>> {
        let index = key_cache_index(resource_group, name);

        if let Some(cell) = self.key_cache.read().await.get(&index) {
            return Arc::clone(cell);
        }

        let mut cache = self.key_cache.write().await;
        Arc::clone(cache.entry(index).or_default())
    }

    /// Blob client for a resolved account.
    pub async fn blobs_client(&self, account: &AccountDetails) -> StorageResult<DataPlaneClient> {
        self.data_plane_client(DataPlaneKind::Blobs, account).await
    }

    /// Container client for a resolved account.
    pub async fn containers_client(
        &self,
        account: &AccountDetails,
    ) -> StorageResult<DataPlaneClient> {
        self.data_plane_client(DataPlaneKind::Containers, account)
            .await
    }

    async fn data_plane_client(
        &self,
        kind: DataPlaneKind,
        account: &AccountDetails,
    ) -> StorageResult<DataPlaneClient> {
        let key = self
            .account_key(account)
            .await
            .map_err(|e| StorageError::Credential {
                account: account.name().to_string(),
                source: Box::new(e),
            })?;

        DataPlaneClient::new(kind, account, key, &self.storage_suffix)
    }
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("populate", &self.populate)
            .field("storage_suffix", &self.storage_suffix)
            .finish_non_exhaustive()
    }
}

/// Resource group and account names are case-insensitive upstream.
fn key_cache_index(resource_group: &str, name: &str) -> String {
    format!(
        "{}/{}",
        resource_group.to_ascii_lowercase(),
        name.to_ascii_lowercase()
    )
}
