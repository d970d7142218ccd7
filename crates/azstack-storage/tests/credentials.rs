//! Access key caching, keyed key lookups and data-plane client factories.

mod common;

use std::sync::Arc;
use std::time::Duration;

use azstack_storage::{AccountDetails, AccountKeys, DataPlaneKind, StorageClient, StorageError};
use common::{account, client_over, FakeManagement};

#[tokio::test]
async fn test_account_key_fetched_once() {
    let (client, fake) = client_over(FakeManagement::with_accounts(vec![account("rg1", "a")]));
    let a = client.find_account("a").await.unwrap().unwrap();

    let first = client.account_key(&a).await.unwrap();
    let second = client.account_key(&a).await.unwrap();

    assert_eq!(first, "a-key1");
    assert_eq!(first, second);
    assert_eq!(fake.key_count(), 1);
    assert!(a.has_cached_key());
}

#[tokio::test]
async fn test_key_survives_on_cached_entry() {
    let (client, fake) = client_over(FakeManagement::with_accounts(vec![account("rg1", "a")]));

    let a = client.find_account("a").await.unwrap().unwrap();
    client.account_key(&a).await.unwrap();

    let again = client.find_account("a").await.unwrap().unwrap();
    client.account_key(&again).await.unwrap();

    assert_eq!(fake.key_count(), 1);
    assert_eq!(client.directory().stats().await.keys_cached, 1);
}

#[tokio::test]
async fn test_empty_key_list_is_not_cached() {
    let (client, fake) = client_over(FakeManagement::with_accounts(vec![account("rg1", "a")]));
    fake.queue_keys("a", Ok(AccountKeys::from_values(Vec::<String>::new())));
    fake.queue_keys("a", Ok(AccountKeys::default()));

    let a = client.find_account("a").await.unwrap().unwrap();

    let empty = client.account_key(&a).await;
    assert!(matches!(
        empty,
        Err(StorageError::MissingKeys { ref account, ref resource_group })
            if account == "a" && resource_group == "rg1"
    ));

    let null = client.account_key(&a).await;
    assert!(matches!(null, Err(StorageError::MissingKeys { .. })));
    assert!(!a.has_cached_key());

    assert_eq!(client.account_key(&a).await.unwrap(), "a-key1");
    assert_eq!(fake.key_count(), 3);
}

#[tokio::test]
async fn test_list_keys_failure_is_wrapped_and_retried() {
    let (client, fake) = client_over(FakeManagement::with_accounts(vec![account("rg1", "a")]));
    fake.queue_keys(
        "a",
        Err(StorageError::Unauthorized {
            message: "HTTP 403: forbidden".to_string(),
        }),
    );

    let a = client.find_account("a").await.unwrap().unwrap();

    match client.account_key(&a).await {
        Err(StorageError::ListKeys {
            account,
            resource_group,
            source,
        }) => {
            assert_eq!(account, "a");
            assert_eq!(resource_group, "rg1");
            assert!(matches!(*source, StorageError::Unauthorized { .. }));
        }
        other => panic!("expected ListKeys, got {:?}", other),
    }

    assert_eq!(client.account_key(&a).await.unwrap(), "a-key1");
    assert_eq!(fake.key_count(), 2);
}

#[tokio::test]
async fn test_replaced_entry_refetches_key() {
    let (client, fake) = client_over(FakeManagement::with_accounts(vec![account("rg1", "a")]));

    let a = client.find_account("a").await.unwrap().unwrap();
    client.account_key(&a).await.unwrap();

    client.add_to_cache("a", &account("rg1", "a")).await.unwrap();
    let replaced = client.find_account("a").await.unwrap().unwrap();
    assert!(!replaced.has_cached_key());

    client.account_key(&replaced).await.unwrap();
    assert_eq!(fake.key_count(), 2);
}

#[tokio::test]
async fn test_removed_entry_refetches_key() {
    let (client, fake) = client_over(FakeManagement::with_accounts(vec![account("rg1", "a")]));

    let a = client.find_account("a").await.unwrap().unwrap();
    client.account_key(&a).await.unwrap();

    client.remove_account_from_cache("a").await;
    let fresh = client.find_account("a").await.unwrap().unwrap();
    client.account_key(&fresh).await.unwrap();

    assert_eq!(fake.key_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_key_requests_share_one_call() {
    let (client, fake) = client_over(
        FakeManagement::with_accounts(vec![account("rg1", "a")])
            .key_delay(Duration::from_millis(50)),
    );
    let a = client.find_account("a").await.unwrap().unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let a = Arc::clone(&a);
        handles.push(tokio::spawn(async move { client.account_key(&a).await }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "a-key1");
    }
    assert_eq!(fake.key_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_key_fetches_for_different_accounts_run_in_parallel() {
    // Each list_keys waits for the other; serialized fetches would never finish.
    let (client, fake) = client_over(
        FakeManagement::with_accounts(vec![account("rg1", "a"), account("rg1", "b")])
            .key_barrier(2),
    );
    let a = client.find_account("a").await.unwrap().unwrap();
    let b = client.find_account("b").await.unwrap().unwrap();

    let keys = tokio::time::timeout(
        Duration::from_secs(5),
        fetch_both(client.clone(), a, b),
    )
    .await
    .expect("key fetches were serialized");

    assert_eq!(keys, ("a-key1".to_string(), "b-key1".to_string()));
    assert_eq!(fake.key_count(), 2);
}

async fn fetch_both(
    client: StorageClient,
    a: Arc<AccountDetails>,
    b: Arc<AccountDetails>,
) -> (String, String) {
    let (ka, kb) = tokio::join!(client.account_key(&a), client.account_key(&b));
    (ka.unwrap(), kb.unwrap())
}

#[tokio::test]
async fn test_key_for_account_caches_by_group_and_name() {
    let (client, fake) = client_over(FakeManagement::default());

    let first = client.key_for_account("rg1", "a").await.unwrap();
    let second = client.key_for_account("rg1", "a").await.unwrap();

    assert_eq!(first.as_deref(), Some("a-key1"));
    assert_eq!(first, second);
    assert_eq!(fake.key_count(), 1);

    client.key_for_account("rg2", "a").await.unwrap();
    assert_eq!(fake.key_count(), 2, "different resource group is a different account");
}

#[tokio::test]
async fn test_key_for_account_not_found_is_none() {
    let (client, fake) = client_over(FakeManagement::default());
    fake.queue_keys(
        "gone",
        Err(StorageError::NotFound {
            resource: "/storageAccounts/gone/listKeys".to_string(),
        }),
    );

    assert!(client.key_for_account("rg1", "gone").await.unwrap().is_none());
}

#[tokio::test]
async fn test_key_for_account_errors_are_not_cached() {
    let (client, fake) = client_over(FakeManagement::default());
    fake.queue_keys("a", Ok(AccountKeys::default()));
    fake.queue_keys(
        "a",
        Err(StorageError::Network {
            message: "reset".to_string(),
        }),
    );

    let missing = client.key_for_account("rg1", "a").await;
    assert!(matches!(missing, Err(StorageError::MissingKeys { .. })));

    let network = client.key_for_account("rg1", "a").await;
    assert!(matches!(network, Err(StorageError::ListKeys { .. })));

    assert_eq!(
        client.key_for_account("rg1", "a").await.unwrap().as_deref(),
        Some("a-key1")
    );
    assert_eq!(fake.key_count(), 3);
}

#[tokio::test]
async fn test_remove_clears_keyed_lookup() {
    let (client, fake) = client_over(FakeManagement::with_accounts(vec![account("rg1", "a")]));

    client.find_account("a").await.unwrap();
    client.key_for_account("rg1", "a").await.unwrap();
    client.remove_account_from_cache("a").await;
    client.key_for_account("rg1", "a").await.unwrap();

    assert_eq!(fake.key_count(), 2);
}

#[tokio::test]
async fn test_remove_evicts_keys_fetched_only_by_group_and_name() {
    let (client, fake) = client_over(FakeManagement::default());

    client.key_for_account("RG1", "a").await.unwrap();
    client.key_for_account("rg1", "a").await.unwrap();
    client.key_for_account("rg2", "a").await.unwrap();
    client.key_for_account("rg1", "b").await.unwrap();
    assert_eq!(fake.key_count(), 3, "group casing shares one cached key");

    // never resolved through the directory
    client.remove_account_from_cache("A").await;

    client.key_for_account("rg1", "a").await.unwrap();
    client.key_for_account("rg2", "a").await.unwrap();
    client.key_for_account("rg1", "b").await.unwrap();
    assert_eq!(fake.key_count(), 5, "only keys for the removed name are refetched");
}

#[tokio::test]
async fn test_add_to_cache_evicts_keyed_lookup() {
    let (client, fake) = client_over(FakeManagement::default());

    client.key_for_account("rg1", "a").await.unwrap();
    client.add_to_cache("a", &account("rg1", "a")).await.unwrap();
    client.key_for_account("rg1", "a").await.unwrap();

    assert_eq!(fake.key_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remove_does_not_wait_for_keyed_fetch() {
    let (client, fake) = client_over(
        FakeManagement::with_accounts(vec![account("rg1", "a")])
            .key_delay(Duration::from_secs(3)),
    );
    client.find_account("a").await.unwrap();

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.key_for_account("rg1", "other").await })
    };
    while fake.key_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    tokio::time::timeout(
        Duration::from_millis(500),
        client.remove_account_from_cache("a"),
    )
    .await
    .expect("remove blocked behind an unrelated key fetch");
    assert!(client.directory().get("a").await.is_none());

    slow.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_keyed_fetches_for_different_accounts_run_in_parallel() {
    // Each list_keys waits for the other; serialized fetches would never finish.
    let (client, fake) = client_over(FakeManagement::default().key_barrier(2));

    let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(
            client.key_for_account("rg1", "a"),
            client.key_for_account("rg1", "b")
        )
    })
    .await
    .expect("keyed fetches were serialized");

    assert_eq!(a.unwrap().as_deref(), Some("a-key1"));
    assert_eq!(b.unwrap().as_deref(), Some("b-key1"));
    assert_eq!(fake.key_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_keyed_lookups_share_one_call() {
    let (client, fake) =
        client_over(FakeManagement::default().key_delay(Duration::from_millis(50)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.key_for_account("rg1", "a").await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().as_deref(), Some("a-key1"));
    }
    assert_eq!(fake.key_count(), 1);
}

#[tokio::test]
async fn test_blobs_and_containers_clients() {
    let (client, fake) = client_over(FakeManagement::with_accounts(vec![account("rg1", "logs")]));
    let logs = client.find_account("logs").await.unwrap().unwrap();

    let blobs = client.blobs_client(&logs).await.unwrap();
    let containers = client.containers_client(&logs).await.unwrap();

    assert_eq!(blobs.kind(), DataPlaneKind::Blobs);
    assert_eq!(containers.kind(), DataPlaneKind::Containers);
    assert_eq!(blobs.endpoint().as_str(), "https://logs.blob.core.windows.net/");
    assert_eq!(blobs.account_name(), "logs");
    assert_eq!(blobs.credential().key(), "logs-key1");
    assert_eq!(
        containers.container_id("archive").id(),
        "https://logs.blob.core.windows.net/archive"
    );
    assert_eq!(fake.key_count(), 1);
}

#[tokio::test]
async fn test_clients_use_configured_suffix() {
    let fake = Arc::new(FakeManagement::with_accounts(vec![account("rg1", "logs")]));
    let client =
        StorageClient::new(fake.clone()).with_storage_suffix("local.azurestack.external");
    let logs = client.find_account("logs").await.unwrap().unwrap();

    let blobs = client.blobs_client(&logs).await.unwrap();

    assert_eq!(
        blobs.endpoint().as_str(),
        "https://logs.blob.local.azurestack.external/"
    );
}

#[tokio::test]
async fn test_client_factory_reports_credential_failure() {
    let (client, fake) = client_over(FakeManagement::with_accounts(vec![account("rg1", "logs")]));
    fake.queue_keys("logs", Ok(AccountKeys::default()));
    let logs = client.find_account("logs").await.unwrap().unwrap();

    match client.blobs_client(&logs).await {
        Err(StorageError::Credential { account, source }) => {
            assert_eq!(account, "logs");
            assert!(matches!(*source, StorageError::MissingKeys { .. }));
        }
        other => panic!("expected Credential, got {:?}", other),
    }
}
