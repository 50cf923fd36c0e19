//! The assembled plugin system.
//!
//! [`PluginSystem`] wires one registry, one lifecycle manager and one router
//! together from a [`PluginSystemConfig`]. Hosts that need finer control can use
//! the three components directly; they are exposed through accessors.

use crate::core::config::PluginSystemConfig;
use crate::plugins::{
    DocumentPlugin, InvocationRouter, LifecycleManager, PluginDescriptor, PluginRegistry, PluginStatus,
};
use crate::types::{InvocationRequest, InvocationResult, Payload, PluginState};
use crate::{GestAgentError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Registry, lifecycle manager and router sharing one configuration.
///
/// # Example
///
/// ```rust
/// use gestagent::plugins::{DocumentPlugin, Plugin, PluginMetadata};
/// use gestagent::{Payload, PluginSystem, Result};
/// use async_trait::async_trait;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// struct InvoiceOcr;
///
/// #[async_trait]
/// impl Plugin for InvoiceOcr {
///     fn plugin_id(&self) -> &str { "ocr-v1" }
///     fn plugin_type(&self) -> &str { "ocr" }
///     fn version(&self) -> String { "1.0.0".to_string() }
///     fn metadata(&self) -> PluginMetadata { PluginMetadata::new("Invoice OCR", ["invoice"]) }
///     async fn initialize(&self) -> Result<()> { Ok(()) }
/// }
///
/// #[async_trait]
/// impl DocumentPlugin for InvoiceOcr {
///     async fn validate_document(&self, _: &str, data: &Payload) -> Result<bool> {
///         Ok(data.contains_key("amount"))
///     }
///     async fn process_document(&self, _: &str, data: &Payload) -> Result<Payload> {
///         Ok(data.clone().with("currency", "EUR"))
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let system = PluginSystem::default();
/// system.install(Arc::new(InvoiceOcr)).await?;
///
/// let output = system.invoke_default("invoice", Payload::try_from(json!({"amount": 100}))?).await?;
/// assert_eq!(output.payload.into_value(), json!({"amount": 100, "currency": "EUR"}));
///
/// system.shutdown().await?;
/// # Ok::<(), gestagent::GestAgentError>(())
/// # }).unwrap();
/// ```
pub struct PluginSystem {
    config: PluginSystemConfig,
    registry: Arc<PluginRegistry>,
    lifecycle: Arc<LifecycleManager>,
    router: InvocationRouter,
}

impl PluginSystem {
    /// Build a system from a validated configuration.
    pub fn new(config: PluginSystemConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config))
    }

    fn assemble(config: PluginSystemConfig) -> Self {
        let registry = Arc::new(PluginRegistry::new());
        let lifecycle = Arc::new(LifecycleManager::new(&config));
        let router = InvocationRouter::new(Arc::clone(&registry), Arc::clone(&lifecycle), &config);

        Self {
            config,
            registry,
            lifecycle,
            router,
        }
    }

    /// Build a system from `gestagent.toml` if one is found above the current
    /// directory, otherwise from defaults.
    pub fn discover() -> Result<Self> {
        let config = PluginSystemConfig::discover()?.unwrap_or_default();
        Self::new(config)
    }

    pub fn config(&self) -> &PluginSystemConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn router(&self) -> &InvocationRouter {
        &self.router
    }

    /// Adopt, register and initialize a plugin under its declared identity.
    ///
    /// Returns the plugin id.
    ///
    /// # Errors
    ///
    /// Registration errors leave nothing behind. An initialization failure is
    /// returned, but the plugin stays registered in `Failed` state so it can be
    /// inspected and retried with [`LifecycleManager::reinitialize`].
    pub async fn install(&self, plugin: Arc<dyn DocumentPlugin>) -> Result<String> {
        let descriptor = PluginDescriptor::from_plugin(plugin.as_ref())?;
        self.install_with_descriptor(descriptor, plugin).await
    }

    /// Like [`install`](Self::install), with a host-built descriptor.
    pub async fn install_with_descriptor(
        &self,
        descriptor: PluginDescriptor,
        plugin: Arc<dyn DocumentPlugin>,
    ) -> Result<String> {
        let plugin_id = descriptor.plugin_id().to_string();

        let instance = self.lifecycle.adopt(descriptor.clone(), plugin)?;
        if let Err(err) = self.registry.register(&descriptor, &instance) {
            drop(instance);
            self.lifecycle.release(&plugin_id)?;
            return Err(err);
        }

        self.lifecycle.initialize(&plugin_id).await?;

        tracing::info!(
            plugin_id = %plugin_id,
            plugin_type = %descriptor.plugin_type(),
            version = %descriptor.version(),
            "Plugin installed"
        );
        Ok(plugin_id)
    }

    /// Route a document using an explicit deadline.
    pub async fn invoke(&self, document_type: &str, payload: Payload, timeout: Duration) -> InvocationResult {
        self.router.invoke(document_type, payload, timeout).await
    }

    /// Route a document using the configured invocation timeout.
    pub async fn invoke_default(&self, document_type: &str, payload: Payload) -> InvocationResult {
        self.router.invoke(document_type, payload, self.router.default_timeout()).await
    }

    pub async fn dispatch(&self, request: InvocationRequest) -> InvocationResult {
        self.router.dispatch(request).await
    }

    /// Unregister, shut down and release a plugin.
    ///
    /// The plugin is unregistered first so no new traffic reaches it. A
    /// plugin-side shutdown error is returned after the instance has been
    /// released. If the plugin is mid-transition the call fails with
    /// `InvalidStateTransition` and can be retried once the transition ends.
    pub async fn uninstall(&self, plugin_id: &str) -> Result<()> {
        busy_guard(plugin_id, self.lifecycle.state(plugin_id)?)?;

        match self.registry.unregister(plugin_id) {
            Ok(_) | Err(GestAgentError::NotFound { .. }) => {}
            Err(err) => return Err(err),
        }

        // Read again: an initialize may have landed before the unregister.
        let state = self.lifecycle.state(plugin_id)?;
        busy_guard(plugin_id, state)?;

        let shutdown = match state {
            PluginState::Ready | PluginState::Failed => self.lifecycle.shutdown(plugin_id).await,
            _ => Ok(()),
        };

        self.lifecycle.release(plugin_id)?;
        tracing::info!(plugin_id = %plugin_id, "Plugin uninstalled");
        shutdown
    }

    pub fn statuses(&self) -> Vec<PluginStatus> {
        self.lifecycle.statuses()
    }

    /// Shut down every plugin. Registrations stay queryable.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!(plugins = self.lifecycle.list().len(), "Shutting down plugin system");
        self.lifecycle.shutdown_all().await
    }
}

fn busy_guard(plugin_id: &str, state: PluginState) -> Result<()> {
    if matches!(state, PluginState::Initializing | PluginState::ShuttingDown) {
        return Err(GestAgentError::InvalidStateTransition {
            plugin_id: plugin_id.to_string(),
            from: state,
            to: PluginState::ShuttingDown,
        });
    }
    Ok(())
}

impl Default for PluginSystem {
    fn default() -> Self {
        Self::assemble(PluginSystemConfig::default())
    }
}

impl std::fmt::Debug for PluginSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSystem")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}
