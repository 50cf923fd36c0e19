use crate::{GestAgentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

// ============================================================================
// Payload
// ============================================================================

/// Document data handed to and returned from plugins.
///
/// An ordered mapping from string keys to tagged JSON values. The core never
/// looks inside a payload; its schema belongs to whichever plugin type handles
/// the document.
///
/// # Example
///
/// ```rust
/// use gestagent::Payload;
/// use serde_json::json;
///
/// let payload = Payload::try_from(json!({"amount": 100, "supplier": "ACME"}))?;
/// assert_eq!(payload.get("amount"), Some(&json!(100)));
/// # Ok::<(), gestagent::GestAgentError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl Deref for Payload {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Payload {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Payload {
    type Error = GestAgentError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(GestAgentError::validation(format!(
                "Payload must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Lifecycle state of a plugin instance.
///
/// ```text
/// Uninitialized -> Initializing -> Ready | Failed
/// Ready | Failed -> ShuttingDown -> Shutdown
/// ```
///
/// `Failed -> Initializing` and `Ready -> Initializing` (for suspect instances)
/// only happen through an explicit re-initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    ShuttingDown,
    Shutdown,
}

impl PluginState {
    /// Whether the state machine allows `self -> next`.
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;
        matches!(
            (self, next),
            (Uninitialized, Initializing)
                | (Initializing, Ready)
                | (Initializing, Failed)
                | (Failed, Initializing)
                | (Ready, Initializing)
                | (Ready, ShuttingDown)
                | (Failed, ShuttingDown)
                | (ShuttingDown, Shutdown)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == PluginState::Shutdown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PluginState::Uninitialized => "uninitialized",
            PluginState::Initializing => "initializing",
            PluginState::Ready => "ready",
            PluginState::Failed => "failed",
            PluginState::ShuttingDown => "shutting_down",
            PluginState::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin-side operation the core calls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginOperation {
    Initialize,
    /// Waiting for the per-instance exclusion token before calling the plugin.
    AwaitSlot,
    Validate,
    Process,
    Shutdown,
}

impl fmt::Display for PluginOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginOperation::Initialize => "initialize",
            PluginOperation::AwaitSlot => "await-slot",
            PluginOperation::Validate => "validate",
            PluginOperation::Process => "process",
            PluginOperation::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Error category, see [`GestAgentError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Io,
    Validation,
    Serialization,
    DuplicateId,
    NotFound,
    NoPluginForType,
    NoReadyPlugin,
    ValidationRejected,
    PluginValidation,
    PluginProcessing,
    PluginTimeout,
    PluginInitialization,
    PluginShutdown,
    InvalidStateTransition,
    Plugin,
    Other,
}

impl ErrorKind {
    /// Faults originating inside a plugin rather than in the core or the request.
    pub fn is_plugin_fault(self) -> bool {
        matches!(
            self,
            ErrorKind::PluginValidation
                | ErrorKind::PluginProcessing
                | ErrorKind::PluginTimeout
                | ErrorKind::PluginInitialization
                | ErrorKind::PluginShutdown
                | ErrorKind::Plugin
        )
    }

    /// Registry and routing outcomes the host can act on (retry, report unsupported type, ...).
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            ErrorKind::DuplicateId
                | ErrorKind::NotFound
                | ErrorKind::NoPluginForType
                | ErrorKind::NoReadyPlugin
                | ErrorKind::ValidationRejected
        )
    }
}

/// A single document-processing request from the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub document_type: String,
    pub payload: Payload,
    /// Per-request deadline in milliseconds (None = configured default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl InvocationRequest {
    pub fn new(document_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            document_type: document_type.into(),
            payload,
            timeout_ms: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Successful outcome of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationOutput {
    /// Plugin that handled the document.
    pub plugin_id: String,
    pub document_type: String,
    /// The transformed record returned by `process_document`.
    pub payload: Payload,
    pub elapsed_ms: u64,
}

/// Result of routing a document through the plugin system.
pub type InvocationResult = Result<InvocationOutput>;

/// Serializable form of a failed invocation, for hosts that ship results over a wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
}

impl From<&GestAgentError> for InvocationFailure {
    fn from(err: &GestAgentError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            plugin_id: err.plugin_id().map(str::to_string),
        }
    }
}
