//! Storage account directory for the Azure Stack provisioning toolkit.
//!
//! Provisioning operations need to go from a storage account *name* to its
//! resource group, its properties and, for data-plane work, its access key.
//! The management API that answers those questions is slow and rate limited,
//! so this crate keeps an in-memory directory in front of it:
//!
//! - Name → account resolution with a subscription-wide enumeration on miss
//!   that caches every account it sees
//! - Lazily-fetched, per-account access keys (fetched at most once per entry)
//! - Explicit invalidation hooks for the create/delete lifecycle
//! - Data-plane client configuration (endpoint + shared key)
//!
//! # Quick Start
//!
//! ```no_run
//! use azstack_storage::StorageClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = StorageClient::from_env()?;
//!
//! if let Some(account) = client.find_account("provisionlogs").await? {
//!     println!("{} lives in {}", account.name(), account.resource_group());
//!
//!     let blobs = client.blobs_client(&account).await?;
//!     println!("blob endpoint: {}", blobs.endpoint());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Lifecycle hooks
//!
//! After creating an account, hand its management representation to
//! [`StorageClient::add_to_cache`]; after deleting one, call
//! [`StorageClient::remove_account_from_cache`]. Entries are never expired
//! otherwise.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `ARM_ENDPOINT` | Resource Manager endpoint (default: `https://management.azure.com`) |
//! | `ARM_SUBSCRIPTION_ID` | Subscription to enumerate (required) |
//! | `ARM_ACCESS_TOKEN` | Bearer token for the management plane |
//! | `ARM_STORAGE_API_VERSION` | Storage provider API version (default: `2019-06-01`) |
//! | `ARM_STORAGE_SUFFIX` | Storage DNS suffix (default: `core.windows.net`) |
//! | `ARM_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `ARM_MAX_RETRIES` | Max retries for transient failures (default: 3) |
//! | `ARM_STORAGE_POPULATE` | `all-or-nothing` (default) or `best-effort` |

pub mod account;
pub mod auth;
pub mod client;
pub mod data_plane;
pub mod directory;
pub mod error;
pub mod id;
pub mod management;
pub mod types;

// Re-export main types
pub use account::AccountDetails;
pub use auth::TokenProvider;
pub use client::StorageClient;
pub use data_plane::{DataPlaneClient, DataPlaneKind, SharedKeyCredential};
pub use directory::{AccountDirectory, DirectoryStats, Generation, PopulateOutcome};
pub use error::{StorageError, StorageResult};
pub use id::{ContainerDataPlaneId, StorageAccountId};
pub use management::{ArmClient, ManagementClient, MANAGEMENT_USER_AGENT};
pub use types::{
    AccountKey, AccountKeys, AccountListPage, AccountProperties, ManagementConfig, PopulateMode,
    StorageAccount,
};
