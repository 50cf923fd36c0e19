//! Plugin trait definitions.
//!
//! [`Plugin`] carries identity and lifecycle hooks, [`DocumentPlugin`] adds the
//! document capabilities (validate, process) the router calls into.

use crate::Result;
use crate::plugins::PluginMetadata;
use crate::types::Payload;
use async_trait::async_trait;

/// Base trait that all plugins must implement.
///
/// # Thread Safety
///
/// Plugins are shared as `Arc<dyn DocumentPlugin>` and called with `&self` from
/// several tasks, so they must be `Send + Sync`. Use interior mutability
/// (`Mutex`, atomics, `OnceCell`) for state.
///
/// # Example
///
/// ```rust
/// use gestagent::plugins::{Plugin, PluginMetadata};
/// use gestagent::Result;
/// use async_trait::async_trait;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// struct InvoiceOcr {
///     initialized: AtomicBool,
/// }
///
/// #[async_trait]
/// impl Plugin for InvoiceOcr {
///     fn plugin_id(&self) -> &str { "ocr-v1" }
///     fn plugin_type(&self) -> &str { "ocr" }
///     fn version(&self) -> String { "1.0.0".to_string() }
///
///     fn metadata(&self) -> PluginMetadata {
///         PluginMetadata::new("Invoice OCR", ["invoice"])
///     }
///
///     async fn initialize(&self) -> Result<()> {
///         self.initialized.store(true, Ordering::Release);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Declared identifier, used as the registry key unless the host generates one.
    ///
    /// Must be non-empty and contain no whitespace, e.g. `"ocr-v1"`.
    fn plugin_id(&self) -> &str;

    /// Category tag such as `"ocr"` or `"validator"`. Not required to be unique.
    fn plugin_type(&self) -> &str;

    /// Version string, conventionally `MAJOR.MINOR.PATCH`. Informational only.
    fn version(&self) -> String;

    /// Descriptive metadata, including the document types this plugin handles.
    fn metadata(&self) -> PluginMetadata;

    /// Prepare the plugin for traffic.
    ///
    /// Called by the lifecycle manager before the plugin is routed to, and again
    /// if the plugin is re-initialized after a failure or timeout, so it should
    /// tolerate being called more than once.
    ///
    /// # Errors
    ///
    /// Any error leaves the plugin in the `Failed` state with the error recorded.
    async fn initialize(&self) -> Result<()>;

    /// Release resources. Defaults to a no-op.
    ///
    /// Errors are reported to the caller of the shutdown, but the plugin is
    /// considered shut down either way.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Document processing capabilities.
///
/// The router always calls [`validate_document`](DocumentPlugin::validate_document)
/// first and only calls [`process_document`](DocumentPlugin::process_document)
/// when validation returned `true`.
///
/// # Example
///
/// ```rust
/// use gestagent::plugins::{DocumentPlugin, Plugin, PluginMetadata};
/// use gestagent::{Payload, Result};
/// use async_trait::async_trait;
///
/// struct EuroInvoices;
///
/// #[async_trait]
/// impl Plugin for EuroInvoices {
///     fn plugin_id(&self) -> &str { "euro-invoices" }
///     fn plugin_type(&self) -> &str { "enricher" }
///     fn version(&self) -> String { "0.3.1".to_string() }
///     fn metadata(&self) -> PluginMetadata {
///         PluginMetadata::new("Euro invoices", ["invoice"]).with_author("Finance team")
///     }
///     async fn initialize(&self) -> Result<()> { Ok(()) }
/// }
///
/// #[async_trait]
/// impl DocumentPlugin for EuroInvoices {
///     async fn validate_document(&self, _document_type: &str, data: &Payload) -> Result<bool> {
///         Ok(data.get("amount").is_some_and(|v| v.is_number()))
///     }
///
///     async fn process_document(&self, _document_type: &str, data: &Payload) -> Result<Payload> {
///         Ok(data.clone().with("currency", "EUR"))
///     }
/// }
/// ```
#[async_trait]
pub trait DocumentPlugin: Plugin {
    /// Decide whether this plugin accepts the document.
    ///
    /// `Ok(false)` is a business rejection; `Err(..)` is a plugin fault.
    async fn validate_document(&self, document_type: &str, data: &Payload) -> Result<bool>;

    /// Transform the document into the plugin's output record.
    async fn process_document(&self, document_type: &str, data: &Payload) -> Result<Payload>;

    /// Whether concurrent `validate_document`/`process_document` calls on this
    /// instance are safe. Defaults to `false`: calls are serialized.
    fn is_reentrant(&self) -> bool {
        false
    }
}
