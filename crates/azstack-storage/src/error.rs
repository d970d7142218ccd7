//! Error types for the storage account directory.

use std::time::Duration;

/// Storage directory errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Resource not found upstream (HTTP 404).
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Authentication failed or token invalid.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Invalid response from the management API.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Enumerating the subscription's storage accounts failed.
    #[error("retrieving storage accounts: {source}")]
    ListAccounts {
        #[source]
        source: Box<StorageError>,
    },

    /// Listing keys for an account failed.
    #[error("listing keys for storage account {account:?} (resource group {resource_group:?}): {source}")]
    ListKeys {
        account: String,
        resource_group: String,
        #[source]
        source: Box<StorageError>,
    },

    /// Reading back a single account failed.
    #[error("retrieving storage account {account:?} (resource group {resource_group:?}): {source}")]
    GetAccount {
        account: String,
        resource_group: String,
        #[source]
        source: Box<StorageError>,
    },

    /// The key listing succeeded but carried no usable key.
    #[error("keys were nil for storage account {account:?} (resource group {resource_group:?})")]
    MissingKeys {
        account: String,
        resource_group: String,
    },

    /// An account came back without a resource id.
    #[error("`id` was nil for account {account:?}")]
    MissingResourceId { account: String },

    /// A resource id could not be parsed.
    #[error("parsing {id:?} as a resource id: {reason}")]
    InvalidResourceId { id: String, reason: String },

    /// Key retrieval failed while building a data-plane client.
    #[error("retrieving account key for {account:?}: {source}")]
    Credential {
        account: String,
        #[source]
        source: Box<StorageError>,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl StorageError {
    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }

    /// Whether the error means the resource does not exist upstream.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::ListKeys { source, .. } | Self::ListAccounts { source } => source.is_not_found(),
            _ => false,
        }
    }

    pub(crate) fn invalid_id(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidResourceId {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for storage directory operations.
pub type StorageResult<T> = Result<T, StorageError>;
