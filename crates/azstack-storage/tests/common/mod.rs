//! Shared test fixtures: an in-memory management client that counts calls.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use azstack_storage::{
    AccountKeys, ManagementClient, StorageAccount, StorageClient, StorageError, StorageResult,
};
use tokio::sync::{Barrier, Notify};

pub fn account_id(group: &str, name: &str) -> String {
    format!(
        "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}",
        group, name
    )
}

pub fn account(group: &str, name: &str) -> StorageAccount {
    StorageAccount::new(account_id(group, name), name)
        .with_properties(serde_json::json!({ "provisioningState": "Succeeded" }))
}

/// Pauses `list_accounts` until the test releases it.
#[derive(Default)]
pub struct ListPause {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct FakeManagement {
    accounts: Mutex<Vec<StorageAccount>>,
    list_errors: Mutex<VecDeque<StorageError>>,
    get_errors: Mutex<VecDeque<StorageError>>,
    key_responses: Mutex<HashMap<String, VecDeque<StorageResult<AccountKeys>>>>,
    list_delay: Option<Duration>,
    key_delay: Option<Duration>,
    list_pause: Option<Arc<ListPause>>,
    key_barrier: Option<Arc<Barrier>>,
    pub list_calls: AtomicUsize,
    pub key_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
}

impl FakeManagement {
    pub fn with_accounts(accounts: Vec<StorageAccount>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
            ..Default::default()
        }
    }

    pub fn list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn key_delay(mut self, delay: Duration) -> Self {
        self.key_delay = Some(delay);
        self
    }

    pub fn list_pause(mut self, pause: Arc<ListPause>) -> Self {
        self.list_pause = Some(pause);
        self
    }

    /// Every `list_keys` call waits until `parties` calls are in flight.
    pub fn key_barrier(mut self, parties: usize) -> Self {
        self.key_barrier = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub fn set_accounts(&self, accounts: Vec<StorageAccount>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    /// Fail the next `list_accounts` call.
    pub fn fail_next_list(&self, error: StorageError) {
        self.list_errors.lock().unwrap().push_back(error);
    }

    /// Fail the next `get_account` call.
    pub fn fail_next_get(&self, error: StorageError) {
        self.get_errors.lock().unwrap().push_back(error);
    }

    /// Queue a `list_keys` response for `name`; without one, a key named
    /// `{name}-key1` is returned.
    pub fn queue_keys(&self, name: &str, response: StorageResult<AccountKeys>) {
        self.key_responses
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn key_count(&self) -> usize {
        self.key_calls.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.list_count() + self.key_count() + self.get_count()
    }
}

#[async_trait]
impl ManagementClient for FakeManagement {
    async fn list_accounts(&self) -> StorageResult<Vec<StorageAccount>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(pause) = &self.list_pause {
            pause.entered.notify_one();
            pause.release.notified().await;
        }

        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }

        let error = self.list_errors.lock().unwrap().pop_front();
        if let Some(error) = error {
            return Err(error);
        }

        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn list_keys(&self, _resource_group: &str, name: &str) -> StorageResult<AccountKeys> {
        self.key_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(barrier) = &self.key_barrier {
            barrier.wait().await;
        }

        if let Some(delay) = self.key_delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .key_responses
            .lock()
            .unwrap()
            .get_mut(name)
            .and_then(|q| q.pop_front());

        queued.unwrap_or_else(|| {
            Ok(AccountKeys::from_values([
                format!("{}-key1", name),
                format!("{}-key2", name),
            ]))
        })
    }

    async fn get_account(
        &self,
        resource_group: &str,
        name: &str,
    ) -> StorageResult<Option<StorageAccount>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        let error = self.get_errors.lock().unwrap().pop_front();
        if let Some(error) = error {
            return Err(error);
        }

        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| {
                a.name.as_deref() == Some(name)
                    && a.id
                        .as_deref()
                        .is_some_and(|id| id.contains(&format!("/resourceGroups/{}/", resource_group)))
            })
            .cloned())
    }
}

pub fn client_over(fake: FakeManagement) -> (StorageClient, Arc<FakeManagement>) {
    let fake = Arc::new(fake);
    let client = StorageClient::new(fake.clone());
    (client, fake)
}
