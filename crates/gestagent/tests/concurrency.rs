//! Concurrent invocations across and within plugin instances.

use gestagent::{Payload, PluginSystem, PluginSystemConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use tokio::time::timeout;

mod helpers;
use helpers::MockPlugin;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Both calls wait on the same barrier inside `process_document`; they can only
/// finish if the two instances run at the same time.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_instances_run_in_parallel() {
    let system = Arc::new(PluginSystem::default());
    let barrier = Arc::new(Barrier::new(2));

    system
        .install(Arc::new(
            MockPlugin::new("invoices", &["invoice"]).with_barrier(Arc::clone(&barrier)),
        ))
        .await
        .unwrap();
    system
        .install(Arc::new(
            MockPlugin::new("receipts", &["receipt"]).with_barrier(Arc::clone(&barrier)),
        ))
        .await
        .unwrap();

    let a = {
        let system = Arc::clone(&system);
        tokio::spawn(async move { system.invoke("invoice", Payload::new(), TIMEOUT).await })
    };
    let b = {
        let system = Arc::clone(&system);
        tokio::spawn(async move { system.invoke("receipt", Payload::new(), TIMEOUT).await })
    };

    let (a, b) = timeout(Duration::from_secs(2), async { (a.await, b.await) })
        .await
        .expect("distinct instances should not block each other");

    assert_eq!(a.unwrap().unwrap().plugin_id, "invoices");
    assert_eq!(b.unwrap().unwrap().plugin_id, "receipts");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_instance_calls_are_serialized() {
    let system = Arc::new(PluginSystem::default());
    let plugin = Arc::new(MockPlugin::new("ocr-v1", &["invoice"]).with_delay(Duration::from_millis(15)));
    system.install(plugin.clone()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let system = Arc::clone(&system);
        handles.push(tokio::spawn(async move {
            system
                .invoke("invoice", Payload::new().with("page", i), TIMEOUT)
                .await
        }));
    }

    for handle in handles {
        let output = handle.await.expect("Task should not panic").unwrap();
        assert!(output.payload.contains_key("page"));
    }

    assert_eq!(MockPlugin::count(&plugin.process_calls), 8);
    assert_eq!(MockPlugin::count(&plugin.max_in_flight), 1);
    assert_eq!(system.statuses()[0].invocations, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reentrant_instance_accepts_parallel_calls() {
    let config = PluginSystemConfig {
        max_concurrent_calls: 3,
        ..Default::default()
    };
    let system = Arc::new(PluginSystem::new(config).unwrap());
    let barrier = Arc::new(Barrier::new(3));
    let plugin = Arc::new(
        MockPlugin::new("parallel-ocr", &["invoice"])
            .reentrant()
            .with_barrier(Arc::clone(&barrier)),
    );
    system.install(plugin.clone()).await.unwrap();

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let system = Arc::clone(&system);
            tokio::spawn(async move { system.invoke("invoice", Payload::new(), TIMEOUT).await })
        })
        .collect();

    timeout(Duration::from_secs(2), async {
        for handle in handles {
            handle.await.expect("Task should not panic").unwrap();
        }
    })
    .await
    .expect("reentrant plugin should take three calls at once");

    assert_eq!(MockPlugin::count(&plugin.max_in_flight), 3);
}
