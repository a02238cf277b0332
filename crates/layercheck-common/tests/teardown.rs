//! Teardown behaviour when fixtures live in a versioned store

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use layercheck_common::cleanup::CleanupRegistry;
use layercheck_common::memory::MemoryStore;
use layercheck_common::mutate::mutate_with_retry;
use layercheck_common::resources::{ConfigMap, Pool};
use layercheck_common::retry::RetryConfig;
use layercheck_common::store::ResourceStore;

const LABEL: &str = "example.io/managed";

fn register_delete(registry: &CleanupRegistry, store: &Arc<MemoryStore<Pool>>, name: &str) {
    let store = store.clone();
    let name = name.to_string();
    registry.register(format!("delete Pool {}", name), move || async move {
        store.delete(&name).await
    });
}

#[tokio::test]
async fn label_is_removed_before_its_pool_is_deleted() {
    let store = Arc::new(MemoryStore::<Pool>::new());
    let registry = CleanupRegistry::new(false);

    store.create(Pool::new("layered")).await.unwrap();
    register_delete(&registry, &store, "layered");

    mutate_with_retry(
        store.as_ref(),
        "layered",
        &RetryConfig::conflict_default(),
        |p: &mut Pool| {
            p.labels.insert(LABEL.into(), String::new());
        },
    )
    .await
    .unwrap();

    let unlabel_store = store.clone();
    registry.register("unlabel Pool layered", move || async move {
        mutate_with_retry(
            unlabel_store.as_ref(),
            "layered",
            &RetryConfig::conflict_default(),
            |p: &mut Pool| {
                p.labels.remove(LABEL);
            },
        )
        .await
        .map(|_| ())
    });

    let report = registry.run_all().await;

    assert!(report.is_clean(), "{:?}", report.failed);
    assert_eq!(
        report.completed,
        vec!["unlabel Pool layered", "delete Pool layered"]
    );
    assert!(store.names().is_empty());
}

#[tokio::test]
async fn teardown_runs_after_a_panicking_body() {
    let store = Arc::new(MemoryStore::<Pool>::new());
    let registry = CleanupRegistry::new(false);

    let body = async {
        store.create(Pool::new("a")).await.unwrap();
        register_delete(&registry, &store, "a");
        store.create(Pool::new("b")).await.unwrap();
        register_delete(&registry, &store, "b");
        panic!("scenario body blew up");
    };
    let outcome = AssertUnwindSafe(body).catch_unwind().await;
    assert!(outcome.is_err());

    let report = registry.run_all().await;
    assert_eq!(store.deleted(), vec!["b", "a"]);
    assert!(report.is_clean());
}

#[tokio::test]
async fn manual_early_teardown_is_not_repeated() {
    let store = Arc::new(MemoryStore::<ConfigMap>::new());
    let registry = CleanupRegistry::new(false);

    store
        .create(ConfigMap {
            name: "settings".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let delete_store = store.clone();
    let handle = registry.register("delete ConfigMap settings", move || async move {
        delete_store.delete("settings").await
    });

    handle.run().await.unwrap().unwrap();
    let report = registry.run_all().await;

    // A second delete would have failed with NotFound
    assert!(report.is_clean());
    assert_eq!(report.already_ran, vec!["delete ConfigMap settings"]);
    assert_eq!(store.deleted(), vec!["settings"]);
}
