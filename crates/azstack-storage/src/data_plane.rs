//! Data-plane client configuration built from a resolved account.
//!
//! No blob or file I/O happens here; a [`DataPlaneClient`] is the endpoint
//! plus the shared-key credential that a data-plane SDK needs.

use url::Url;

use crate::account::AccountDetails;
use crate::error::{StorageError, StorageResult};
use crate::id::ContainerDataPlaneId;

/// Which data-plane surface a client targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPlaneKind {
    /// Blob operations.
    Blobs,

    /// Container operations.
    Containers,
}

/// Shared-key credential for one storage account.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKeyCredential {
    account_name: String,
    key: String,
}

impl SharedKeyCredential {
    pub fn new(account_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            key: key.into(),
        }
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Secret account key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account_name", &self.account_name)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Authenticated, account-scoped data-plane client configuration.
#[derive(Debug, Clone)]
pub struct DataPlaneClient {
    kind: DataPlaneKind,
    endpoint: Url,
    domain_suffix: String,
    credential: SharedKeyCredential,
}

impl DataPlaneClient {
    /// Build a client for `account`.
    ///
    /// The blob endpoint comes from the account's `primaryEndpoints.blob`
    /// when the management API reported one, otherwise it is derived from
    /// `storage_suffix`.
    pub fn new(
        kind: DataPlaneKind,
        account: &AccountDetails,
        key: impl Into<String>,
        storage_suffix: &str,
    ) -> StorageResult<Self> {
        let derived = format!("https://{}.blob.{}/", account.name(), storage_suffix);
        let raw = account
            .properties()
            .and_then(|p| p.primary_endpoint("blob"))
            .unwrap_or(derived.as_str());

        let endpoint = Url::parse(raw).map_err(|e| StorageError::InvalidResponse {
            message: format!("invalid blob endpoint {:?}: {}", raw, e),
        })?;

        let domain_suffix = endpoint
            .host_str()
            .and_then(|host| host.split_once(".blob."))
            .map(|(_, suffix)| suffix.to_string())
            .unwrap_or_else(|| storage_suffix.to_string());

        Ok(Self {
            kind,
            endpoint,
            domain_suffix,
            credential: SharedKeyCredential::new(account.name(), key),
        })
    }

    pub fn kind(&self) -> DataPlaneKind {
        self.kind
    }

    /// Blob service endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn account_name(&self) -> &str {
        self.credential.account_name()
    }

    pub fn credential(&self) -> &SharedKeyCredential {
        &self.credential
    }

    /// Data-plane id for a container in this account.
    pub fn container_id(&self, container: &str) -> ContainerDataPlaneId {
        ContainerDataPlaneId::new(self.account_name(), &self.domain_suffix, container)
    }

    /// URL of a blob in this account.
    pub fn blob_url(&self, container: &str, blob: &str) -> StorageResult<Url> {
        if container.is_empty() || blob.is_empty() {
            return Err(StorageError::Config {
                message: "container and blob names must not be empty".to_string(),
            });
        }

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidResponse {
                message: format!("blob endpoint {} cannot carry a path", self.endpoint),
            })?
            .clear()
            .push(container)
            .extend(blob.split('/'));
        Ok(url)
    }
}
