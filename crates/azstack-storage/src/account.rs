//! Resolved storage accounts and their lazily-fetched access key.

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::id::StorageAccountId;
use crate::management::ManagementClient;
use crate::types::{AccountProperties, StorageAccount};

/// One resolved storage account.
///
/// Identity fields never change for the lifetime of an entry. The access key
/// is fetched on first use and then kept until the entry is evicted from the
/// directory; a replacement entry starts without a key.
pub struct AccountDetails {
    id: String,
    resource_group: String,
    name: String,
    properties: Option<AccountProperties>,
    cached_at: DateTime<Utc>,
    key: OnceCell<String>,
}

impl AccountDetails {
    /// Build details for `name` from a management API account.
    ///
    /// Fails if the account carries no id or an id that does not parse as a
    /// storage account id.
    pub fn from_account(name: &str, account: &StorageAccount) -> StorageResult<Self> {
        let id = account
            .id
            .as_deref()
            .ok_or_else(|| StorageError::MissingResourceId {
                account: name.to_string(),
            })?;

        let parsed = StorageAccountId::parse_insensitively(id)?;

        Ok(Self {
            id: id.to_string(),
            resource_group: parsed.resource_group,
            name: name.to_string(),
            properties: account.properties.clone(),
            cached_at: Utc::now(),
            key: OnceCell::new(),
        })
    }

    /// Resource id, as returned by the management API.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> Option<&AccountProperties> {
        self.properties.as_ref()
    }

    /// When this entry was created.
    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// Whether the access key has been fetched for this entry.
    pub fn has_cached_key(&self) -> bool {
        self.key.initialized()
    }

    /// Primary access key, fetched through `client` on first use.
    ///
    /// Concurrent callers on the same entry share one `list_keys` call.
    /// Failures leave the entry without a key so a later call retries.
    pub async fn account_key(&self, client: &dyn ManagementClient) -> StorageResult<String> {
        if let Some(key) = self.key.get() {
            return Ok(key.clone());
        }

        let key = self
            .key
            .get_or_try_init(|| async {
                debug!(
                    account = %self.name,
                    resource_group = %self.resource_group,
                    "key cache miss, listing account keys"
                );

                let keys = client
                    .list_keys(&self.resource_group, &self.name)
                    .await
                    .map_err(|e| StorageError::ListKeys {
                        account: self.name.clone(),
                        resource_group: self.resource_group.clone(),
                        source: Box::new(e),
                    })?;

                let primary = keys.primary().ok_or_else(|| StorageError::MissingKeys {
                    account: self.name.clone(),
                    resource_group: self.resource_group.clone(),
                })?;

                info!(account = %self.name, "cached account key");
                Ok::<_, StorageError>(primary.to_string())
            })
            .await?;

        Ok(key.clone())
    }
}

impl PartialEq for AccountDetails {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.resource_group == other.resource_group
            && self.name == other.name
            && self.properties == other.properties
    }
}

impl std::fmt::Debug for AccountDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountDetails")
            .field("id", &self.id)
            .field("resource_group", &self.resource_group)
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("cached_at", &self.cached_at)
            .field("has_cached_key", &self.has_cached_key())
            .finish()
    }
}
