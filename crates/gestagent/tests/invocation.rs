//! End-to-end invocation through `PluginSystem`.

use gestagent::{ErrorKind, GestAgentError, InvocationFailure, InvocationRequest, Payload, PluginState, PluginSystem};
use serde_json::json;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

mod helpers;
use helpers::MockPlugin;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_ocr_invoice_end_to_end() {
    helpers::init_tracing();
    let system = PluginSystem::default();
    let plugin = Arc::new(MockPlugin::new("ocr-v1", &["invoice"]).with_currency());
    system.install(plugin.clone()).await.unwrap();
    assert_eq!(system.lifecycle().state("ocr-v1").unwrap(), PluginState::Ready);

    let payload = Payload::try_from(json!({"amount": 100})).unwrap();
    let output = system.invoke("invoice", payload, TIMEOUT).await.unwrap();

    assert_eq!(output.plugin_id, "ocr-v1");
    assert_eq!(output.payload.into_value(), json!({"amount": 100, "currency": "EUR"}));
    assert_eq!(MockPlugin::count(&plugin.validate_calls), 1);
    assert_eq!(MockPlugin::count(&plugin.process_calls), 1);
}

#[tokio::test]
async fn test_unknown_document_type() {
    let system = PluginSystem::default();
    system
        .install(Arc::new(MockPlugin::new("ocr-v1", &["invoice"])))
        .await
        .unwrap();

    let err = system.invoke("payroll", Payload::new(), TIMEOUT).await.unwrap_err();
    assert!(matches!(err, GestAgentError::NoPluginForType { ref document_type } if document_type == "payroll"));
}

#[tokio::test]
async fn test_failed_sole_registrant_is_not_ready() {
    let system = PluginSystem::default();
    let plugin = Arc::new(MockPlugin::new("ocr-v1", &["invoice"]).failing_init());
    assert!(system.install(plugin.clone()).await.is_err());

    let err = system.invoke("invoice", Payload::new(), TIMEOUT).await.unwrap_err();
    assert!(matches!(err, GestAgentError::NoReadyPlugin { candidates: 1, .. }));
    assert_eq!(MockPlugin::count(&plugin.validate_calls), 0);
}

#[tokio::test]
async fn test_validation_rejected_skips_process() {
    let system = PluginSystem::default();
    let plugin = Arc::new(MockPlugin::new("ocr-v1", &["invoice"]).rejecting());
    system.install(plugin.clone()).await.unwrap();

    let err = system
        .invoke("invoice", Payload::new().with("amount", 100), TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GestAgentError::ValidationRejected { ref plugin_id, ref document_type }
            if plugin_id == "ocr-v1" && document_type == "invoice"
    ));
    assert_eq!(MockPlugin::count(&plugin.validate_calls), 1);
    assert_eq!(MockPlugin::count(&plugin.process_calls), 0);
    assert_eq!(system.statuses()[0].failures, 0);
}

#[tokio::test]
async fn test_process_error_carries_cause() {
    let system = PluginSystem::default();
    system
        .install(Arc::new(
            MockPlugin::new("ocr-v1", &["invoice"]).failing_process("scan resolution too low"),
        ))
        .await
        .unwrap();

    let err = system.invoke("invoice", Payload::new(), TIMEOUT).await.unwrap_err();

    assert!(matches!(err, GestAgentError::PluginProcessing { .. }));
    assert!(err.to_string().contains("scan resolution too low"));
    let source = err.source().expect("cause should be kept");
    assert!(source.to_string().contains("scan resolution too low"));

    // Instance stays usable after a plugin fault.
    assert_eq!(system.lifecycle().state("ocr-v1").unwrap(), PluginState::Ready);

    let failure = InvocationFailure::from(&err);
    assert_eq!(failure.kind, ErrorKind::PluginProcessing);
    assert_eq!(failure.plugin_id.as_deref(), Some("ocr-v1"));
}

#[tokio::test]
async fn test_falls_through_to_next_ready_plugin() {
    let system = PluginSystem::default();
    let broken = Arc::new(MockPlugin::new("ocr-v1", &["invoice"]).failing_init());
    let healthy = Arc::new(MockPlugin::new("ocr-v2", &["invoice"]));
    let _ = system.install(broken).await;
    system.install(healthy.clone()).await.unwrap();

    let output = system.invoke("invoice", Payload::new(), TIMEOUT).await.unwrap();
    assert_eq!(output.plugin_id, "ocr-v2");
    assert_eq!(MockPlugin::count(&healthy.process_calls), 1);
}

#[tokio::test]
async fn test_dispatch_request_from_json() {
    let system = PluginSystem::default();
    system
        .install(Arc::new(MockPlugin::new("ocr-v1", &["receipt"]).with_currency()))
        .await
        .unwrap();

    let request: InvocationRequest = serde_json::from_value(json!({
        "document_type": "receipt",
        "payload": {"total": 12.5},
        "timeout_ms": 2000
    }))
    .unwrap();

    let output = system.dispatch(request).await.unwrap();
    let encoded = serde_json::to_value(&output).unwrap();
    assert_eq!(encoded["payload"], json!({"total": 12.5, "currency": "EUR"}));
    assert_eq!(encoded["plugin_id"], json!("ocr-v1"));
}

#[tokio::test]
async fn test_uninstalled_plugin_no_longer_routed() {
    let system = PluginSystem::default();
    let plugin = Arc::new(MockPlugin::new("ocr-v1", &["invoice"]));
    system.install(plugin.clone()).await.unwrap();

    system.uninstall("ocr-v1").await.unwrap();

    let err = system.invoke("invoice", Payload::new(), TIMEOUT).await.unwrap_err();
    assert!(matches!(err, GestAgentError::NoPluginForType { .. }));
    assert_eq!(MockPlugin::count(&plugin.shutdown_calls), 1);
}
