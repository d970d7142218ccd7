//! Bearer token for the management plane.
//!
//! Acquiring the token (service principal, managed identity, CLI) happens
//! outside this crate; the directory only needs something to put in the
//! `Authorization` header.

use crate::error::StorageResult;

/// Token provider for management API authentication.
#[derive(Clone)]
pub enum TokenProvider {
    /// Static token (from config or env).
    Static(String),

    /// No authentication.
    None,
}

impl TokenProvider {
    /// Create a static token provider.
    pub fn static_token(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    /// Create from the `ARM_ACCESS_TOKEN` environment variable.
    ///
    /// An empty value counts as unset.
    pub fn from_env() -> Self {
        match std::env::var("ARM_ACCESS_TOKEN") {
            Ok(token) if !token.is_empty() => Self::Static(token),
            _ => Self::None,
        }
    }

    /// Get the current token.
    pub async fn get_token(&self) -> StorageResult<Option<String>> {
        match self {
            Self::Static(token) => Ok(Some(token.clone())),
            Self::None => Ok(None),
        }
    }

    /// Check if authentication is configured.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl Default for TokenProvider {
    fn default() -> Self {
        Self::from_env()
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => f.write_str("TokenProvider::Static(<redacted>)"),
            Self::None => f.write_str("TokenProvider::None"),
        }
    }
}
