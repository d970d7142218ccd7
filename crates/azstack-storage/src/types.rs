//! Management API wire types and configuration.

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// A storage account as returned by the management API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageAccount {
    /// Fully-qualified resource id.
    #[serde(default)]
    pub id: Option<String>,

    /// Account name.
    #[serde(default)]
    pub name: Option<String>,

    /// Azure region.
    #[serde(default)]
    pub location: Option<String>,

    /// Account kind (e.g. "StorageV2").
    #[serde(default)]
    pub kind: Option<String>,

    /// Account properties, kept opaque.
    #[serde(default)]
    pub properties: Option<AccountProperties>,
}

impl StorageAccount {
    /// Build an account from an id and name (mostly useful in tests and fakes).
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Attach properties.
    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = Some(AccountProperties(properties));
        self
    }
}

/// Opaque account properties payload.
///
/// Only read back for later queries; never interpreted by the directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountProperties(pub serde_json::Value);

impl AccountProperties {
    /// Raw JSON.
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    /// `provisioningState`, if present.
    pub fn provisioning_state(&self) -> Option<&str> {
        self.0.get("provisioningState").and_then(|v| v.as_str())
    }

    /// Primary endpoint for a service (`blob`, `queue`, `table`, `file`, ...).
    pub fn primary_endpoint(&self, service: &str) -> Option<&str> {
        self.0
            .get("primaryEndpoints")
            .and_then(|v| v.get(service))
            .and_then(|v| v.as_str())
    }
}

/// One page of `GET .../storageAccounts`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountListPage {
    /// Accounts on this page.
    #[serde(default)]
    pub value: Vec<StorageAccount>,

    /// URL of the next page, absent on the last one.
    #[serde(default, rename = "nextLink")]
    pub next_link: Option<String>,
}

/// Response from `POST .../listKeys`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountKeys {
    /// Keys, primary first.
    #[serde(default)]
    pub keys: Option<Vec<AccountKey>>,
}

impl AccountKeys {
    /// Build a key listing from plain values.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| AccountKey {
                key_name: Some(format!("key{}", i + 1)),
                value: Some(value.into()),
                permissions: Some("FULL".to_string()),
            })
            .collect();
        Self { keys: Some(keys) }
    }

    /// Value of the first key, if present and non-null.
    pub fn primary(&self) -> Option<&str> {
        self.keys
            .as_ref()
            .and_then(|keys| keys.first())
            .and_then(|key| key.value.as_deref())
    }
}

/// A single access key.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AccountKey {
    /// Key name ("key1", "key2").
    #[serde(default, rename = "keyName")]
    pub key_name: Option<String>,

    /// Secret value.
    #[serde(default)]
    pub value: Option<String>,

    /// Permissions ("FULL", "READ").
    #[serde(default)]
    pub permissions: Option<String>,
}

impl std::fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKey")
            .field("key_name", &self.key_name)
            .field("value", &self.value.as_ref().map(|_| "<redacted>"))
            .field("permissions", &self.permissions)
            .finish()
    }
}

/// How a cache-miss enumeration treats accounts with malformed ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PopulateMode {
    /// Any malformed id aborts the whole populate; nothing is cached.
    #[default]
    AllOrNothing,

    /// Malformed entries are skipped; only a malformed requested name fails.
    BestEffort,
}

impl std::str::FromStr for PopulateMode {
    type Err = StorageError;

    fn from_str(s: &str) -> StorageResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all-or-nothing" | "strict" => Ok(Self::AllOrNothing),
            "best-effort" | "lenient" => Ok(Self::BestEffort),
            other => Err(StorageError::Config {
                message: format!("unknown populate mode: {}", other),
            }),
        }
    }
}

/// Management client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementConfig {
    /// Resource Manager endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Subscription to enumerate.
    #[serde(default)]
    pub subscription_id: Option<String>,

    /// Bearer token for the management plane.
    #[serde(default)]
    pub token: Option<String>,

    /// Storage resource provider API version.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Storage DNS suffix for data-plane endpoints.
    #[serde(default = "default_storage_suffix")]
    pub storage_suffix: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Bulk populate behaviour on malformed ids.
    #[serde(default)]
    pub populate: PopulateMode,
}

fn default_endpoint() -> String {
    "https://management.azure.com".to_string()
}

fn default_api_version() -> String {
    "2019-06-01".to_string()
}

fn default_storage_suffix() -> String {
    "core.windows.net".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            subscription_id: None,
            token: None,
            api_version: default_api_version(),
            storage_suffix: default_storage_suffix(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            populate: PopulateMode::default(),
        }
    }
}

impl ManagementConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `ARM_ENDPOINT` | Resource Manager endpoint |
    /// | `ARM_SUBSCRIPTION_ID` | Subscription to enumerate |
    /// | `ARM_ACCESS_TOKEN` | Bearer token |
    /// | `ARM_STORAGE_API_VERSION` | Storage provider API version |
    /// | `ARM_STORAGE_SUFFIX` | Storage DNS suffix |
    /// | `ARM_TIMEOUT` | Request timeout in seconds |
    /// | `ARM_MAX_RETRIES` | Max retries for transient failures |
    /// | `ARM_STORAGE_POPULATE` | `all-or-nothing` or `best-effort` |
    ///
    /// Unparseable numeric or mode values fall back to their defaults.
    pub fn from_env() -> Self {
        Self {
            endpoint: non_empty_var("ARM_ENDPOINT").unwrap_or_else(default_endpoint),
            subscription_id: non_empty_var("ARM_SUBSCRIPTION_ID"),
            token: non_empty_var("ARM_ACCESS_TOKEN"),
            api_version: non_empty_var("ARM_STORAGE_API_VERSION")
                .unwrap_or_else(default_api_version),
            storage_suffix: non_empty_var("ARM_STORAGE_SUFFIX")
                .unwrap_or_else(default_storage_suffix),
            timeout_secs: std::env::var("ARM_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            max_retries: std::env::var("ARM_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_retries),
            populate: std::env::var("ARM_STORAGE_POPULATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Set the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the subscription.
    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    /// Set the token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the API version.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Set the max retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the populate mode.
    pub fn with_populate(mut self, populate: PopulateMode) -> Self {
        self.populate = populate;
        self
    }

    /// Subscription id, or a config error if unset.
    pub fn require_subscription(&self) -> StorageResult<&str> {
        self.subscription_id
            .as_deref()
            .ok_or_else(|| StorageError::Config {
                message: "subscription id is required (set ARM_SUBSCRIPTION_ID)".to_string(),
            })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
