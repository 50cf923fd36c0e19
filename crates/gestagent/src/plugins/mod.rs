//! Plugin system for GestAgent document processing.
//!
//! Document processors (OCR, classifiers, enrichers) are plugins implementing
//! [`DocumentPlugin`]. The core registers them, manages their lifecycle and
//! routes documents to them; it never looks at the payloads.
//!
//! # Components
//!
//! - [`registry::PluginRegistry`] - indexes plugins by id and by document type
//! - [`lifecycle::LifecycleManager`] - owns instances and drives the state machine
//! - [`router::InvocationRouter`] - picks a ready plugin and calls validate-then-process
//!
//! # Lifecycle Pattern
//!
//! Plugins are handed over as `Arc<dyn DocumentPlugin>`. The lifecycle manager
//! owns the resulting instance, the registry only keeps a weak reference:
//!
//! ```rust
//! use gestagent::plugins::lifecycle::LifecycleManager;
//! use gestagent::plugins::registry::PluginRegistry;
//! use gestagent::plugins::{DocumentPlugin, Plugin, PluginDescriptor, PluginMetadata};
//! use gestagent::{Payload, Result};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Passthrough;
//!
//! #[async_trait]
//! impl Plugin for Passthrough {
//!     fn plugin_id(&self) -> &str { "passthrough" }
//!     fn plugin_type(&self) -> &str { "identity" }
//!     fn version(&self) -> String { "1.0.0".to_string() }
//!     fn metadata(&self) -> PluginMetadata { PluginMetadata::new("Passthrough", ["invoice"]) }
//!     async fn initialize(&self) -> Result<()> { Ok(()) }
//! }
//!
//! #[async_trait]
//! impl DocumentPlugin for Passthrough {
//!     async fn validate_document(&self, _: &str, _: &Payload) -> Result<bool> { Ok(true) }
//!     async fn process_document(&self, _: &str, data: &Payload) -> Result<Payload> { Ok(data.clone()) }
//! }
//!
//! # tokio_test::block_on(async {
//! let lifecycle = LifecycleManager::default();
//! let registry = PluginRegistry::new();
//!
//! let plugin = Arc::new(Passthrough);
//! let descriptor = PluginDescriptor::from_plugin(plugin.as_ref())?;
//! let instance = lifecycle.adopt(descriptor.clone(), plugin)?;
//! registry.register(&descriptor, &instance)?;
//! lifecycle.initialize("passthrough").await?;
//!
//! assert_eq!(registry.lookup_by_type("invoice"), vec!["passthrough"]);
//! # Ok::<(), gestagent::GestAgentError>(())
//! # }).unwrap();
//! ```

mod call;
mod descriptor;
pub mod lifecycle;
pub mod registry;
pub mod router;
mod traits;

pub use descriptor::{PluginDescriptor, PluginMetadata};
pub use lifecycle::{LifecycleManager, PluginInstance, PluginStatus};
pub use registry::PluginRegistry;
pub use router::InvocationRouter;
pub use traits::{DocumentPlugin, Plugin};
