//! Routing documents to plugins.
//!
//! For each request the [`InvocationRouter`] picks the first ready plugin
//! registered for the document type, then runs `validate_document` followed by
//! `process_document` under a single deadline.

use crate::core::config::PluginSystemConfig;
use crate::plugins::call::{CallOutcome, deadline_from, run_detached};
use crate::plugins::lifecycle::{LifecycleManager, PluginInstance};
use crate::plugins::registry::PluginRegistry;
use crate::plugins::DocumentPlugin;
use crate::types::{InvocationOutput, InvocationRequest, InvocationResult, Payload, PluginOperation};
use crate::{GestAgentError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Dispatches invocations to registered plugin instances.
///
/// # Thread Safety
///
/// The router is `Send + Sync` and holds no per-request state; share it through
/// `Arc` and call [`invoke`](Self::invoke) from as many tasks as needed. Calls on
/// distinct instances run in parallel, calls on one instance are serialized by
/// its call gate.
pub struct InvocationRouter {
    registry: Arc<PluginRegistry>,
    lifecycle: Arc<LifecycleManager>,
    default_timeout: Duration,
}

impl InvocationRouter {
    pub fn new(registry: Arc<PluginRegistry>, lifecycle: Arc<LifecycleManager>, config: &PluginSystemConfig) -> Self {
        Self {
            registry,
            lifecycle,
            default_timeout: config.invocation_timeout(),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Route a request, using its own timeout or the configured default.
    pub async fn dispatch(&self, request: InvocationRequest) -> InvocationResult {
        let timeout = request.timeout().unwrap_or(self.default_timeout);
        self.invoke(&request.document_type, request.payload, timeout).await
    }

    /// Route one document to a plugin and return the processed record.
    ///
    /// # Errors
    ///
    /// - `NoPluginForType` if nothing is registered for `document_type`
    /// - `NoReadyPlugin` if every candidate is unavailable
    /// - `ValidationRejected` if the selected plugin declined the document
    /// - `PluginValidation` / `PluginProcessing` if the plugin failed or panicked
    /// - `PluginTimeout` if the deadline passed
    #[tracing::instrument(
        skip(self, payload),
        fields(
            invocation.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            plugin.id = tracing::field::Empty,
        )
    )]
    pub async fn invoke(&self, document_type: &str, payload: Payload, timeout: Duration) -> InvocationResult {
        let started = Instant::now();
        let deadline = deadline_from(started, timeout);

        let candidates = self.registry.lookup_by_type(document_type);
        if candidates.is_empty() {
            tracing::debug!("No plugin registered for document type");
            return Err(GestAgentError::NoPluginForType {
                document_type: document_type.to_string(),
            });
        }

        let instance = match self.first_ready(&candidates).await {
            Some(instance) => instance,
            None => {
                tracing::warn!(candidates = candidates.len(), "No ready plugin for document type");
                return Err(GestAgentError::NoReadyPlugin {
                    document_type: document_type.to_string(),
                    candidates: candidates.len(),
                });
            }
        };

        tracing::Span::current().record("plugin.id", instance.plugin_id());

        let result = self
            .call(&instance, document_type, payload, deadline, timeout, candidates.len())
            .await;

        match &result {
            Ok(_) => {
                tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Invocation completed");
            }
            Err(err @ GestAgentError::ValidationRejected { .. }) => {
                tracing::info!(reason = %err, "Document rejected by plugin");
            }
            Err(
                err @ GestAgentError::PluginTimeout {
                    operation: PluginOperation::AwaitSlot,
                    ..
                },
            ) => {
                tracing::warn!(error = %err, "Timed out waiting for a plugin call slot");
            }
            Err(err) if err.kind().is_plugin_fault() => {
                instance.record_failure();
                tracing::warn!(error = %err, "Plugin invocation failed");
            }
            Err(err) => {
                tracing::debug!(error = %err, "Invocation not completed");
            }
        }

        result.map(|payload| InvocationOutput {
            plugin_id: instance.plugin_id().to_string(),
            document_type: document_type.to_string(),
            payload,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Every registered instance for `document_type` that passes its readiness
    /// check, in registration order.
    ///
    /// # Errors
    ///
    /// `NoPluginForType` if nothing is registered for the type.
    pub async fn ready_candidates(&self, document_type: &str) -> Result<Vec<Arc<PluginInstance>>> {
        let candidates = self.registry.lookup_by_type(document_type);
        if candidates.is_empty() {
            return Err(GestAgentError::NoPluginForType {
                document_type: document_type.to_string(),
            });
        }

        let mut ready = Vec::with_capacity(candidates.len());
        for plugin_id in &candidates {
            if let Ok(instance) = self.registry.instance(plugin_id)
                && self.lifecycle.check_readiness(&instance).await
            {
                ready.push(instance);
            }
        }
        Ok(ready)
    }

    async fn first_ready(&self, candidates: &[String]) -> Option<Arc<PluginInstance>> {
        for plugin_id in candidates {
            let Ok(instance) = self.registry.instance(plugin_id) else {
                continue;
            };
            if self.lifecycle.check_readiness(&instance).await {
                return Some(instance);
            }
            tracing::debug!(plugin_id = %plugin_id, state = %instance.state(), "Skipping unavailable plugin");
        }
        None
    }

    async fn call(
        &self,
        instance: &Arc<PluginInstance>,
        document_type: &str,
        payload: Payload,
        deadline: Instant,
        timeout: Duration,
        candidates: usize,
    ) -> Result<Payload> {
        let plugin_id = instance.plugin_id();
        let unavailable = || GestAgentError::NoReadyPlugin {
            document_type: document_type.to_string(),
            candidates,
        };

        let _permit = match tokio::time::timeout_at(deadline, instance.acquire_slot()).await {
            Ok(Ok(permit)) => permit,
            // Gate closed by a concurrent shutdown.
            Ok(Err(_closed)) => return Err(unavailable()),
            Err(_elapsed) => {
                return Err(GestAgentError::PluginTimeout {
                    plugin_id: plugin_id.to_string(),
                    operation: PluginOperation::AwaitSlot,
                    timeout,
                });
            }
        };

        // State may have changed while queued on the gate.
        if !instance.is_available() {
            return Err(unavailable());
        }

        instance.record_invocation();

        let document_type: Arc<str> = Arc::from(document_type);
        let payload = Arc::new(payload);

        let plugin = instance.plugin();
        let (dt, data) = (Arc::clone(&document_type), Arc::clone(&payload));
        let accepted = match run_detached(deadline, async move { plugin.validate_document(&dt, &data).await }).await {
            CallOutcome::Completed(Ok(accepted)) => accepted,
            CallOutcome::Completed(Err(cause)) => return Err(GestAgentError::plugin_validation(plugin_id, cause)),
            CallOutcome::Panicked(message) => return Err(GestAgentError::plugin_validation_message(plugin_id, message)),
            CallOutcome::TimedOut => {
                return Err(timed_out(instance, PluginOperation::Validate, timeout));
            }
        };

        if !accepted {
            return Err(GestAgentError::ValidationRejected {
                plugin_id: plugin_id.to_string(),
                document_type: document_type.to_string(),
            });
        }

        let plugin = instance.plugin();
        let (dt, data) = (Arc::clone(&document_type), Arc::clone(&payload));
        match run_detached(deadline, async move { plugin.process_document(&dt, &data).await }).await {
            CallOutcome::Completed(Ok(output)) => Ok(output),
            CallOutcome::Completed(Err(cause)) => Err(GestAgentError::plugin_processing(plugin_id, cause)),
            CallOutcome::Panicked(message) => Err(GestAgentError::plugin_processing_message(plugin_id, message)),
            CallOutcome::TimedOut => Err(timed_out(instance, PluginOperation::Process, timeout)),
        }
    }
}

fn timed_out(instance: &PluginInstance, operation: PluginOperation, timeout: Duration) -> GestAgentError {
    instance.mark_suspect();
    GestAgentError::PluginTimeout {
        plugin_id: instance.plugin_id().to_string(),
        operation,
        timeout,
    }
}

impl std::fmt::Debug for InvocationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationRouter")
            .field("registry", &self.registry)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
