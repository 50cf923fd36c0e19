//! Lifecycle transitions observed through the public API.

use gestagent::plugins::{LifecycleManager, PluginDescriptor};
use gestagent::{GestAgentError, Payload, PluginState, PluginSystem, PluginSystemConfig};
use std::sync::Arc;
use std::time::Duration;

mod helpers;
use helpers::MockPlugin;

#[tokio::test]
async fn test_full_lifecycle() {
    let lifecycle = LifecycleManager::default();
    let plugin = Arc::new(MockPlugin::new("ocr-v1", &["invoice"]));
    let descriptor = PluginDescriptor::from_plugin(plugin.as_ref()).unwrap();
    lifecycle.adopt(descriptor, plugin.clone()).unwrap();

    assert_eq!(lifecycle.state("ocr-v1").unwrap(), PluginState::Uninitialized);
    lifecycle.initialize("ocr-v1").await.unwrap();
    assert_eq!(lifecycle.state("ocr-v1").unwrap(), PluginState::Ready);
    lifecycle.shutdown("ocr-v1").await.unwrap();
    assert_eq!(lifecycle.state("ocr-v1").unwrap(), PluginState::Shutdown);

    assert_eq!(MockPlugin::count(&plugin.init_calls), 1);
    assert_eq!(MockPlugin::count(&plugin.shutdown_calls), 1);
}

#[tokio::test]
async fn test_shutdown_twice_is_noop() {
    let system = PluginSystem::default();
    let plugin = Arc::new(MockPlugin::new("ocr-v1", &["invoice"]));
    system.install(plugin.clone()).await.unwrap();

    system.lifecycle().shutdown("ocr-v1").await.unwrap();
    system.lifecycle().shutdown("ocr-v1").await.unwrap();

    assert_eq!(MockPlugin::count(&plugin.shutdown_calls), 1);
    assert_eq!(system.lifecycle().state("ocr-v1").unwrap(), PluginState::Shutdown);
}

#[tokio::test]
async fn test_invalid_transitions() {
    let system = PluginSystem::default();
    system
        .install(Arc::new(MockPlugin::new("ocr-v1", &["invoice"])))
        .await
        .unwrap();

    // Ready -> Initializing needs a suspect instance.
    let err = system.lifecycle().reinitialize("ocr-v1").await.unwrap_err();
    assert!(matches!(
        err,
        GestAgentError::InvalidStateTransition {
            from: PluginState::Ready,
            to: PluginState::Initializing,
            ..
        }
    ));

    system.lifecycle().shutdown("ocr-v1").await.unwrap();

    // Shutdown is terminal.
    for result in [
        system.lifecycle().initialize("ocr-v1").await,
        system.lifecycle().reinitialize("ocr-v1").await,
    ] {
        assert!(matches!(
            result,
            Err(GestAgentError::InvalidStateTransition {
                from: PluginState::Shutdown,
                ..
            })
        ));
    }

    assert!(matches!(
        system.lifecycle().initialize("missing").await,
        Err(GestAgentError::NotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_in_flight_call() {
    let system = Arc::new(PluginSystem::default());
    let plugin = Arc::new(MockPlugin::new("ocr-v1", &["invoice"]).with_delay(Duration::from_millis(150)));
    system.install(plugin.clone()).await.unwrap();

    let call = {
        let system = Arc::clone(&system);
        tokio::spawn(async move { system.invoke("invoice", Payload::new(), Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    system.lifecycle().shutdown("ocr-v1").await.unwrap();

    let output = call.await.expect("Task should not panic");
    assert!(output.is_ok(), "in-flight call should finish before shutdown");
    assert_eq!(MockPlugin::count(&plugin.in_flight), 0);
    assert_eq!(MockPlugin::count(&plugin.shutdown_calls), 1);
}

#[tokio::test]
async fn test_shutdown_grace_elapses() {
    let config = PluginSystemConfig {
        shutdown_grace_ms: 30,
        ..Default::default()
    };
    let system = Arc::new(PluginSystem::new(config).unwrap());
    let plugin = Arc::new(MockPlugin::new("ocr-v1", &["invoice"]).with_delay(Duration::from_millis(400)));
    system.install(plugin.clone()).await.unwrap();

    let call = {
        let system = Arc::clone(&system);
        tokio::spawn(async move { system.invoke("invoice", Payload::new(), Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    system.lifecycle().shutdown("ocr-v1").await.unwrap();
    assert_eq!(system.lifecycle().state("ocr-v1").unwrap(), PluginState::Shutdown);

    // The straggler is not cancelled.
    assert!(call.await.expect("Task should not panic").is_ok());
}

#[tokio::test]
async fn test_statuses_serialize() {
    let system = PluginSystem::default();
    system
        .install(Arc::new(MockPlugin::new("ocr-v1", &["invoice", "receipt"])))
        .await
        .unwrap();
    let _ = system
        .install(Arc::new(MockPlugin::new("ocr-v2", &["invoice"]).failing_init()))
        .await;

    let encoded = serde_json::to_value(system.statuses()).unwrap();
    assert_eq!(encoded[0]["plugin_id"], "ocr-v1");
    assert_eq!(encoded[0]["state"], "ready");
    assert_eq!(encoded[0]["supported_document_types"], serde_json::json!(["invoice", "receipt"]));
    assert!(encoded[0].get("last_error").is_none());
    assert_eq!(encoded[1]["state"], "failed");
    assert!(
        encoded[1]["last_error"]
            .as_str()
            .unwrap()
            .contains("initialization refused")
    );
}

#[tokio::test]
async fn test_system_shutdown_covers_all_instances() {
    let system = PluginSystem::default();
    let a = Arc::new(MockPlugin::new("a", &["invoice"]));
    let b = Arc::new(MockPlugin::new("b", &["receipt"]));
    let c = Arc::new(MockPlugin::new("c", &["contract"]).failing_init());
    system.install(a.clone()).await.unwrap();
    system.install(b.clone()).await.unwrap();
    let _ = system.install(c.clone()).await;

    system.shutdown().await.unwrap();

    for status in system.statuses() {
        assert_eq!(status.state, PluginState::Shutdown, "{} should be shut down", status.plugin_id);
    }
    assert_eq!(MockPlugin::count(&a.shutdown_calls), 1);
    assert_eq!(MockPlugin::count(&c.shutdown_calls), 1);
}
