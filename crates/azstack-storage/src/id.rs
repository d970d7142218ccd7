//! Resource id parsing.
//!
//! Supports two formats:
//! - `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Storage/storageAccounts/{name}`
//!   → [`StorageAccountId`]
//! - `https://{account}.blob.{suffix}/{container}` → [`ContainerDataPlaneId`]

use url::Url;

use crate::error::{StorageError, StorageResult};

const SUBSCRIPTIONS: &str = "subscriptions";
const RESOURCE_GROUPS: &str = "resourceGroups";
/// Lower-cased form some API versions emit; accepted even by the strict parser.
const RESOURCE_GROUPS_LOWER: &str = "resourcegroups";
const PROVIDERS: &str = "providers";
const STORAGE_ACCOUNTS: &str = "storageAccounts";
const STORAGE_NAMESPACE: &str = "Microsoft.Storage";

/// A parsed storage account resource id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageAccountId {
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
}

impl StorageAccountId {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }

    /// Parse an id, matching segment keys exactly.
    ///
    /// `resourcegroups` is accepted alongside `resourceGroups`. The provider
    /// namespace is not checked; [`StorageAccountId::id`] always renders
    /// `Microsoft.Storage`.
    ///
    /// # Examples
    ///
    /// ```
    /// use azstack_storage::StorageAccountId;
    ///
    /// let id = StorageAccountId::parse(
    ///     "/subscriptions/0000/resourceGroups/infra/providers/Microsoft.Storage/storageAccounts/logs",
    /// )
    /// .unwrap();
    /// assert_eq!(id.resource_group, "infra");
    /// assert_eq!(id.name, "logs");
    ///
    /// assert!(StorageAccountId::parse("/subscriptions/0000").is_err());
    /// ```
    pub fn parse(input: &str) -> StorageResult<Self> {
        parse_account_id(input, false)
    }

    /// Parse an id, matching segment keys case-insensitively.
    ///
    /// The management API does not return consistent casing for segment
    /// keys (`resourcegroups`, `StorageAccounts`), so ids read back from it
    /// go through this parser. Values keep their original casing.
    pub fn parse_insensitively(input: &str) -> StorageResult<Self> {
        parse_account_id(input, true)
    }

    /// Canonical resource id.
    pub fn id(&self) -> String {
        format!(
            "/{}/{}/{}/{}/{}/{}/{}/{}",
            SUBSCRIPTIONS,
            self.subscription_id,
            RESOURCE_GROUPS,
            self.resource_group,
            PROVIDERS,
            STORAGE_NAMESPACE,
            STORAGE_ACCOUNTS,
            self.name
        )
    }
}

impl std::fmt::Display for StorageAccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Storage Account: (Name {:?} / Resource Group {:?})",
            self.name, self.resource_group
        )
    }
}

fn parse_account_id(input: &str, insensitive: bool) -> StorageResult<StorageAccountId> {
    let input = input.trim();

    if input.is_empty() {
        return Err(StorageError::invalid_id(input, "empty id"));
    }

    let path = input
        .strip_prefix('/')
        .ok_or_else(|| StorageError::invalid_id(input, "id must start with '/'"))?;
    let path = path.strip_suffix('/').unwrap_or(path);

    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() % 2 != 0 {
        return Err(StorageError::invalid_id(
            input,
            "the number of segments is not divisible by 2",
        ));
    }

    let key_is = |key: &str, expected: &str| {
        if insensitive {
            key.eq_ignore_ascii_case(expected)
        } else {
            key == expected
        }
    };

    let mut subscription_id = None;
    let mut resource_group = None;
    let mut namespace = None;
    let mut name = None;

    for pair in segments.chunks(2) {
        let (key, value) = (pair[0], pair[1]);

        if key.is_empty() || value.is_empty() {
            return Err(StorageError::invalid_id(
                input,
                format!("segment {:?} has an empty key or value", key),
            ));
        }

        let slot = if key_is(key, SUBSCRIPTIONS) {
            &mut subscription_id
        } else if key_is(key, RESOURCE_GROUPS) || key == RESOURCE_GROUPS_LOWER {
            &mut resource_group
        } else if key_is(key, PROVIDERS) {
            &mut namespace
        } else if key_is(key, STORAGE_ACCOUNTS) {
            &mut name
        } else {
            return Err(StorageError::invalid_id(
                input,
                format!("unexpected segment {:?}", key),
            ));
        };

        if slot.replace(value.to_string()).is_some() {
            return Err(StorageError::invalid_id(
                input,
                format!("segment {:?} appears more than once", key),
            ));
        }
    }

    let subscription_id = subscription_id.ok_or_else(|| {
        StorageError::invalid_id(input, "id was missing the 'subscriptions' element")
    })?;
    let resource_group = resource_group.ok_or_else(|| {
        StorageError::invalid_id(input, "id was missing the 'resourceGroups' element")
    })?;
    let name = name.ok_or_else(|| {
        StorageError::invalid_id(input, "id was missing the 'storageAccounts' element")
    })?;

    Ok(StorageAccountId {
        subscription_id,
        resource_group,
        name,
    })
}

/// A container addressed on the blob data plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerDataPlaneId {
    pub account_name: String,
    pub domain_suffix: String,
    pub name: String,
}

impl ContainerDataPlaneId {
    pub fn new(
        account_name: impl Into<String>,
        domain_suffix: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            domain_suffix: domain_suffix.into(),
            name: name.into(),
        }
    }

    /// Parse `https://{account}.blob.{suffix}/{container}`.
    pub fn parse(input: &str) -> StorageResult<Self> {
        let url = Url::parse(input).map_err(|e| StorageError::invalid_id(input, e.to_string()))?;

        let host = url
            .host_str()
            .ok_or_else(|| StorageError::invalid_id(input, "missing host"))?;

        let (account_name, rest) = host
            .split_once('.')
            .ok_or_else(|| StorageError::invalid_id(input, "expected multiple host segments"))?;

        let domain_suffix = rest
            .strip_prefix("blob.")
            .filter(|suffix| !suffix.is_empty())
            .ok_or_else(|| StorageError::invalid_id(input, "expected a blob endpoint host"))?;

        let mut segments = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default();

        let name = match (segments.pop(), segments.is_empty()) {
            (Some(name), true) => name.to_string(),
            _ => {
                return Err(StorageError::invalid_id(
                    input,
                    "expected exactly one path segment (the container name)",
                ))
            }
        };

        Ok(Self {
            account_name: account_name.to_string(),
            domain_suffix: domain_suffix.to_string(),
            name,
        })
    }

    /// Data-plane URL of the container.
    pub fn id(&self) -> String {
        format!(
            "https://{}.blob.{}/{}",
            self.account_name, self.domain_suffix, self.name
        )
    }
}
