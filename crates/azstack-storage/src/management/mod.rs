//! Management plane client for storage accounts.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::auth::TokenProvider;
use crate::error::{StorageError, StorageResult};
use crate::types::{AccountKeys, AccountListPage, ManagementConfig, StorageAccount};

mod http;

use http::HttpBackend;

const USER_AGENT_VALUE: &str = concat!("azstack-storage/", env!("CARGO_PKG_VERSION"));

/// User agent sent with every management request.
pub const MANAGEMENT_USER_AGENT: &str = USER_AGENT_VALUE;

/// Upper bound on followed `nextLink`s, in case the API hands back a cycle.
const MAX_PAGES: usize = 1000;

/// Control-plane operations the directory depends on.
///
/// Implementations own authentication, retry and pagination; callers see a
/// single result per operation.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Every storage account in the subscription.
    async fn list_accounts(&self) -> StorageResult<Vec<StorageAccount>>;

    /// Access keys for one account.
    async fn list_keys(&self, resource_group: &str, account_name: &str)
        -> StorageResult<AccountKeys>;

    /// One account, `None` if it does not exist.
    async fn get_account(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> StorageResult<Option<StorageAccount>>;
}

/// Azure Resource Manager client for `Microsoft.Storage/storageAccounts`.
#[derive(Debug, Clone)]
pub struct ArmClient {
    http: HttpBackend,
    subscription_id: String,
}

impl ArmClient {
    pub fn new(config: ManagementConfig) -> StorageResult<Self> {
        let token_provider = config
            .token
            .as_ref()
            .map(TokenProvider::static_token)
            .unwrap_or_else(TokenProvider::from_env);

        Self::with_token_provider(config, token_provider)
    }

    pub fn with_token_provider(
        config: ManagementConfig,
        token_provider: TokenProvider,
    ) -> StorageResult<Self> {
        let subscription_id = config.require_subscription()?.to_string();

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| StorageError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let base_url = config.endpoint.trim_end_matches('/').to_string();

        Ok(Self {
            http: HttpBackend {
                client,
                base_url,
                token_provider,
                config,
            },
            subscription_id,
        })
    }

    pub fn from_env() -> StorageResult<Self> {
        Self::new(ManagementConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.http.base_url
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.http.token_provider.is_authenticated()
    }

    fn accounts_url(&self) -> String {
        format!(
            "{}/subscriptions/{}/providers/Microsoft.Storage/storageAccounts?api-version={}",
            self.http.base_url, self.subscription_id, self.http.config.api_version
        )
    }

    fn account_path(&self, resource_group: &str, account_name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}",
            self.http.base_url, self.subscription_id, resource_group, account_name
        )
    }
}

#[async_trait]
impl ManagementClient for ArmClient {
    async fn list_accounts(&self) -> StorageResult<Vec<StorageAccount>> {
        let mut accounts = Vec::new();
        let mut next = Some(self.accounts_url());
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages == MAX_PAGES {
                return Err(StorageError::InvalidResponse {
                    message: format!("account listing exceeded {} pages", MAX_PAGES),
                });
            }
            pages += 1;

            debug!(url = %url, page = pages, "listing storage accounts");
            let page: AccountListPage = self.http.get_json(&url).await?;
            accounts.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty() && *link != url);
        }

        debug!(count = accounts.len(), pages, "listed storage accounts");
        Ok(accounts)
    }

    async fn list_keys(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> StorageResult<AccountKeys> {
        let url = format!(
            "{}/listKeys?api-version={}",
            self.account_path(resource_group, account_name),
            self.http.config.api_version
        );
        debug!(account = account_name, resource_group, "listing account keys");

        self.http.post_json(&url).await
    }

    async fn get_account(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> StorageResult<Option<StorageAccount>> {
        let url = format!(
            "{}?api-version={}",
            self.account_path(resource_group, account_name),
            self.http.config.api_version
        );
        debug!(url = %url, "fetching storage account");

        match self.http.get_json(&url).await {
            Ok(account) => Ok(Some(account)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
