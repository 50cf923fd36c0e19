//! Plugin instance ownership and lifecycle transitions.
//!
//! The [`LifecycleManager`] is the only owner of [`PluginInstance`]s. The
//! registry keeps weak references and the router borrows instances for the
//! duration of one call.
//!
//! ```text
//! Uninitialized -> Initializing -> Ready | Failed
//! Ready | Failed -> ShuttingDown -> Shutdown
//! ```

use crate::core::config::PluginSystemConfig;
use crate::plugins::call::{CallOutcome, deadline_from, run_detached};
use crate::plugins::{DocumentPlugin, Plugin, PluginDescriptor};
use crate::types::{PluginOperation, PluginState};
use crate::{GestAgentError, Result};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

#[derive(Debug)]
struct InstanceStatus {
    state: PluginState,
    last_error: Option<String>,
    state_changed_at: SystemTime,
}

/// A live plugin together with its lifecycle state.
///
/// Calls into the plugin go through a per-instance exclusion token (the call
/// gate). Non-reentrant plugins get a single permit, so at most one
/// `validate_document`/`process_document` call is in flight at a time.
pub struct PluginInstance {
    descriptor: Arc<PluginDescriptor>,
    plugin: Arc<dyn DocumentPlugin>,
    status: Mutex<InstanceStatus>,
    suspect: AtomicBool,
    gate: Arc<Semaphore>,
    permits: u32,
    invocations: AtomicU64,
    failures: AtomicU64,
}

impl PluginInstance {
    fn new(descriptor: PluginDescriptor, plugin: Arc<dyn DocumentPlugin>, permits: u32) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            plugin,
            status: Mutex::new(InstanceStatus {
                state: PluginState::Uninitialized,
                last_error: None,
                state_changed_at: SystemTime::now(),
            }),
            suspect: AtomicBool::new(false),
            gate: Arc::new(Semaphore::new(permits as usize)),
            permits,
            invocations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn plugin_id(&self) -> &str {
        self.descriptor.plugin_id()
    }

    pub fn descriptor(&self) -> &Arc<PluginDescriptor> {
        &self.descriptor
    }

    pub fn state(&self) -> PluginState {
        self.status.lock().state
    }

    /// Cause of the latest failed initialization or shutdown.
    pub fn last_error(&self) -> Option<String> {
        self.status.lock().last_error.clone()
    }

    /// Whether a call timed out and the instance awaits re-initialization.
    pub fn is_suspect(&self) -> bool {
        self.suspect.load(Ordering::Acquire)
    }

    /// Whether the router may send traffic here right now.
    pub fn is_available(&self) -> bool {
        self.state() == PluginState::Ready && !self.is_suspect()
    }

    /// Maximum number of concurrent calls this instance accepts.
    pub fn max_concurrent_calls(&self) -> u32 {
        self.permits
    }

    pub(crate) fn plugin(&self) -> Arc<dyn DocumentPlugin> {
        Arc::clone(&self.plugin)
    }

    pub(crate) async fn acquire_slot(&self) -> std::result::Result<OwnedSemaphorePermit, AcquireError> {
        Arc::clone(&self.gate).acquire_owned().await
    }

    pub(crate) fn mark_suspect(&self) {
        if !self.suspect.swap(true, Ordering::AcqRel) {
            tracing::warn!(plugin_id = %self.plugin_id(), "Plugin marked suspect, will re-initialize on next readiness check");
        }
    }

    pub(crate) fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically move into `Initializing` if the current state is one of `allowed`.
    fn begin_initialization(&self, allowed: &[PluginState]) -> Result<()> {
        let mut status = self.status.lock();
        if !allowed.contains(&status.state) {
            return Err(GestAgentError::InvalidStateTransition {
                plugin_id: self.plugin_id().to_string(),
                from: status.state,
                to: PluginState::Initializing,
            });
        }
        self.set_state(&mut status, PluginState::Initializing);
        Ok(())
    }

    fn finish(&self, state: PluginState, error: Option<String>) {
        let mut status = self.status.lock();
        if error.is_some() {
            status.last_error = error;
        }
        self.set_state(&mut status, state);
    }

    fn set_state(&self, status: &mut InstanceStatus, next: PluginState) {
        let previous = status.state;
        debug_assert!(
            previous.can_transition_to(next),
            "illegal plugin transition {} -> {}",
            previous,
            next
        );
        status.state = next;
        status.state_changed_at = SystemTime::now();
        tracing::debug!(plugin_id = %self.plugin_id(), from = %previous, to = %next, "Plugin state transition");
    }

    fn status_snapshot(&self) -> PluginStatus {
        let status = self.status.lock();
        let metadata = self.descriptor.metadata();
        PluginStatus {
            plugin_id: self.plugin_id().to_string(),
            plugin_type: self.descriptor.plugin_type().to_string(),
            name: metadata.name.clone(),
            version: self.descriptor.version().to_string(),
            state: status.state,
            suspect: self.is_suspect(),
            last_error: status.last_error.clone(),
            state_changed_at_ms: status
                .state_changed_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            invocations: self.invocations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            supported_document_types: metadata.supported_document_types.iter().cloned().collect(),
        }
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("plugin_id", &self.plugin_id())
            .field("state", &self.state())
            .field("suspect", &self.is_suspect())
            .field("permits", &self.permits)
            .finish()
    }
}

/// Diagnostic snapshot of one plugin instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginStatus {
    pub plugin_id: String,
    pub plugin_type: String,
    pub name: String,
    pub version: String,
    pub state: PluginState,
    pub suspect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Unix time of the latest state change, in milliseconds.
    pub state_changed_at_ms: u64,
    pub invocations: u64,
    pub failures: u64,
    pub supported_document_types: Vec<String>,
}

/// Owns plugin instances and drives their state machine.
///
/// # Thread Safety
///
/// All methods take `&self`; share the manager through `Arc`.
pub struct LifecycleManager {
    instances: RwLock<IndexMap<String, Arc<PluginInstance>>>,
    initialization_timeout: Duration,
    shutdown_grace: Duration,
    reinitialize_suspects: bool,
    max_concurrent_calls: u32,
}

impl LifecycleManager {
    pub fn new(config: &PluginSystemConfig) -> Self {
        Self {
            instances: RwLock::new(IndexMap::new()),
            initialization_timeout: config.initialization_timeout(),
            shutdown_grace: config.shutdown_grace(),
            reinitialize_suspects: config.reinitialize_suspects,
            max_concurrent_calls: config.max_concurrent_calls.max(1),
        }
    }

    /// Take ownership of a host-supplied plugin.
    ///
    /// The new instance starts `Uninitialized`.
    ///
    /// # Errors
    ///
    /// - `GestAgentError::Validation` if the descriptor is invalid
    /// - `GestAgentError::DuplicateId` if an instance with the same id is already owned
    pub fn adopt(&self, descriptor: PluginDescriptor, plugin: Arc<dyn DocumentPlugin>) -> Result<Arc<PluginInstance>> {
        descriptor.validate()?;

        let permits = if plugin.is_reentrant() {
            self.max_concurrent_calls
        } else {
            1
        };

        let mut instances = self.instances.write();
        if instances.contains_key(descriptor.plugin_id()) {
            return Err(GestAgentError::DuplicateId {
                plugin_id: descriptor.plugin_id().to_string(),
            });
        }

        let instance = Arc::new(PluginInstance::new(descriptor, plugin, permits));
        instances.insert(instance.plugin_id().to_string(), Arc::clone(&instance));

        tracing::debug!(plugin_id = %instance.plugin_id(), permits, "Adopted plugin instance");
        Ok(instance)
    }

    pub fn get(&self, plugin_id: &str) -> Result<Arc<PluginInstance>> {
        self.instances
            .read()
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| GestAgentError::NotFound {
                plugin_id: plugin_id.to_string(),
            })
    }

    pub fn state(&self, plugin_id: &str) -> Result<PluginState> {
        Ok(self.get(plugin_id)?.state())
    }

    pub fn last_error(&self, plugin_id: &str) -> Result<Option<String>> {
        Ok(self.get(plugin_id)?.last_error())
    }

    /// Ids of all owned instances in adoption order.
    pub fn list(&self) -> Vec<String> {
        self.instances.read().keys().cloned().collect()
    }

    pub fn statuses(&self) -> Vec<PluginStatus> {
        self.instances
            .read()
            .values()
            .map(|instance| instance.status_snapshot())
            .collect()
    }

    /// Run the plugin's `initialize` for the first time.
    ///
    /// Only valid from `Uninitialized`. A failure or timeout leaves the instance
    /// `Failed` with the cause recorded; it is not retried here, see
    /// [`reinitialize`](Self::reinitialize).
    pub async fn initialize(&self, plugin_id: &str) -> Result<()> {
        let instance = self.get(plugin_id)?;
        instance.begin_initialization(&[PluginState::Uninitialized])?;
        self.run_initialize(&instance).await
    }

    /// Explicit retry of initialization.
    ///
    /// Valid from `Failed`, or from `Ready` when the instance is suspect.
    pub async fn reinitialize(&self, plugin_id: &str) -> Result<()> {
        let instance = self.get(plugin_id)?;

        if instance.is_suspect() {
            instance.begin_initialization(&[PluginState::Failed, PluginState::Ready])?;
        } else {
            instance.begin_initialization(&[PluginState::Failed])?;
        }
        instance.suspect.store(false, Ordering::Release);

        self.run_initialize(&instance).await
    }

    /// Readiness check used before routing to an instance.
    ///
    /// Returns `true` when the instance can take traffic. A suspect `Ready`
    /// instance is re-initialized here if `reinitialize_suspects` is enabled;
    /// otherwise it stays unavailable until [`reinitialize`](Self::reinitialize)
    /// is called.
    pub async fn check_readiness(&self, instance: &Arc<PluginInstance>) -> bool {
        if instance.state() != PluginState::Ready {
            return false;
        }
        if !instance.is_suspect() {
            return true;
        }
        if !self.reinitialize_suspects {
            return false;
        }

        // Only one concurrent checker performs the re-initialization.
        if !instance.suspect.swap(false, Ordering::AcqRel) {
            return instance.is_available();
        }

        if let Err(err) = instance.begin_initialization(&[PluginState::Ready]) {
            tracing::debug!(plugin_id = %instance.plugin_id(), error = %err, "Skipping re-initialization");
            return false;
        }

        tracing::info!(plugin_id = %instance.plugin_id(), "Re-initializing suspect plugin");
        match self.run_initialize(instance).await {
            Ok(()) => instance.is_available(),
            Err(_) => false,
        }
    }

    async fn run_initialize(&self, instance: &Arc<PluginInstance>) -> Result<()> {
        let plugin_id = instance.plugin_id().to_string();
        let plugin = instance.plugin();
        let deadline = deadline_from(Instant::now(), self.initialization_timeout);

        let outcome = run_detached(deadline, async move { plugin.initialize().await }).await;

        let error = match outcome {
            CallOutcome::Completed(Ok(())) => {
                instance.finish(PluginState::Ready, None);
                tracing::info!(plugin_id = %plugin_id, "Plugin ready");
                return Ok(());
            }
            CallOutcome::Completed(Err(cause)) => GestAgentError::plugin_initialization(&plugin_id, cause),
            CallOutcome::Panicked(message) => GestAgentError::plugin_initialization_message(&plugin_id, message),
            CallOutcome::TimedOut => GestAgentError::PluginTimeout {
                plugin_id: plugin_id.clone(),
                operation: PluginOperation::Initialize,
                timeout: self.initialization_timeout,
            },
        };

        tracing::warn!(plugin_id = %plugin_id, error = %error, "Plugin initialization failed");
        instance.finish(PluginState::Failed, Some(error.to_string()));
        Err(error)
    }

    /// Shut an instance down.
    ///
    /// Valid from `Ready` or `Failed`; a second call on a `Shutdown` instance is a
    /// no-op. In-flight calls get up to the configured grace period to release
    /// the call gate, then the plugin's own `shutdown` gets the same period again. The instance ends in
    /// `Shutdown` even if the plugin reports an error, which is then returned.
    pub async fn shutdown(&self, plugin_id: &str) -> Result<()> {
        let instance = self.get(plugin_id)?;

        {
            let mut status = instance.status.lock();
            match status.state {
                PluginState::Shutdown => return Ok(()),
                PluginState::Ready | PluginState::Failed => {
                    instance.set_state(&mut status, PluginState::ShuttingDown);
                }
                other => {
                    return Err(GestAgentError::InvalidStateTransition {
                        plugin_id: plugin_id.to_string(),
                        from: other,
                        to: PluginState::ShuttingDown,
                    });
                }
            }
        }

        let drain_deadline = deadline_from(Instant::now(), self.shutdown_grace);

        match tokio::time::timeout_at(drain_deadline, instance.gate.acquire_many(instance.permits)).await {
            Ok(Ok(permits)) => drop(permits),
            Ok(Err(_closed)) => {}
            Err(_elapsed) => {
                tracing::warn!(plugin_id = %plugin_id, "In-flight calls still running after shutdown grace period");
            }
        }
        instance.gate.close();

        let plugin = instance.plugin();
        let deadline = deadline_from(Instant::now(), self.shutdown_grace);
        let outcome = run_detached(deadline, async move { plugin.shutdown().await }).await;

        let result = match outcome {
            CallOutcome::Completed(Ok(())) => Ok(()),
            CallOutcome::Completed(Err(cause)) => Err(GestAgentError::plugin_shutdown(plugin_id, cause)),
            CallOutcome::Panicked(message) => Err(GestAgentError::plugin_shutdown_message(plugin_id, message)),
            CallOutcome::TimedOut => Err(GestAgentError::PluginTimeout {
                plugin_id: plugin_id.to_string(),
                operation: PluginOperation::Shutdown,
                timeout: self.shutdown_grace,
            }),
        };

        match &result {
            Ok(()) => {
                instance.finish(PluginState::Shutdown, None);
                tracing::info!(plugin_id = %plugin_id, "Plugin shut down");
            }
            Err(err) => {
                tracing::warn!(plugin_id = %plugin_id, error = %err, "Plugin shutdown reported an error");
                instance.finish(PluginState::Shutdown, Some(err.to_string()));
            }
        }

        result
    }

    /// Shut down every instance that is still running.
    ///
    /// All instances are attempted; the first error is returned.
    pub async fn shutdown_all(&self) -> Result<()> {
        let mut first_error = None;

        for plugin_id in self.list() {
            let needs_shutdown = matches!(
                self.state(&plugin_id),
                Ok(PluginState::Ready | PluginState::Failed)
            );
            if !needs_shutdown {
                continue;
            }
            if let Err(err) = self.shutdown(&plugin_id).await
                && first_error.is_none()
            {
                first_error = Some(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drop ownership of an instance that is `Shutdown` or was never initialized.
    pub fn release(&self, plugin_id: &str) -> Result<Arc<PluginInstance>> {
        let mut instances = self.instances.write();
        let instance = instances.get(plugin_id).ok_or_else(|| GestAgentError::NotFound {
            plugin_id: plugin_id.to_string(),
        })?;

        let state = instance.state();
        if !matches!(state, PluginState::Shutdown | PluginState::Uninitialized) {
            return Err(GestAgentError::validation(format!(
                "Plugin '{}' is {} and must be shut down before release",
                plugin_id, state
            )));
        }

        let instance = instances
            .shift_remove(plugin_id)
            .ok_or_else(|| GestAgentError::NotFound {
                plugin_id: plugin_id.to_string(),
            })?;
        Ok(instance)
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new(&PluginSystemConfig::default())
    }
}
