//! Error types for GestAgent.
//!
//! Every fallible operation in this crate returns [`GestAgentError`]. The enum is
//! split into a few families:
//!
//! - **Registry errors** - `DuplicateId`, `NotFound`. Recoverable, the caller decides.
//! - **Routing errors** - `NoPluginForType`, `NoReadyPlugin`. Recoverable, the host
//!   may retry later or report an unsupported document type.
//! - **Business outcome** - `ValidationRejected`. Not a system fault; a plugin
//!   looked at the document and said no.
//! - **Plugin faults** - `PluginValidation`, `PluginProcessing`, `PluginTimeout`,
//!   `PluginInitialization`, `PluginShutdown`. The original cause is preserved
//!   through `#[source]`.
//! - **Ambient errors** - `Io`, `Validation`, `Serialization`, `Other`.
//!
//! # Example
//!
//! ```rust
//! use gestagent::{GestAgentError, Result};
//!
//! fn check_document_type(document_type: &str) -> Result<()> {
//!     if document_type.is_empty() {
//!         return Err(GestAgentError::validation("Document type cannot be empty"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_document_type("invoice").is_ok());
//! assert!(check_document_type("").is_err());
//! ```
use crate::types::{ErrorKind, PluginOperation, PluginState};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using `GestAgentError`.
pub type Result<T> = std::result::Result<T, GestAgentError>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all GestAgent operations.
#[derive(Debug, Error)]
pub enum GestAgentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Plugin '{plugin_id}' is already registered")]
    DuplicateId { plugin_id: String },

    #[error("Plugin '{plugin_id}' not found")]
    NotFound { plugin_id: String },

    #[error("No plugin registered for document type '{document_type}'")]
    NoPluginForType { document_type: String },

    #[error("No ready plugin for document type '{document_type}' ({candidates} registered)")]
    NoReadyPlugin { document_type: String, candidates: usize },

    #[error("Plugin '{plugin_id}' rejected document of type '{document_type}'")]
    ValidationRejected { plugin_id: String, document_type: String },

    #[error("Plugin '{plugin_id}' failed while validating: {message}")]
    PluginValidation {
        plugin_id: String,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Plugin '{plugin_id}' failed while processing: {message}")]
    PluginProcessing {
        plugin_id: String,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Plugin '{plugin_id}' timed out during {operation} after {timeout:?}")]
    PluginTimeout {
        plugin_id: String,
        operation: PluginOperation,
        timeout: Duration,
    },

    #[error("Plugin '{plugin_id}' failed to initialize: {message}")]
    PluginInitialization {
        plugin_id: String,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Plugin '{plugin_id}' failed to shut down: {message}")]
    PluginShutdown {
        plugin_id: String,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Plugin '{plugin_id}' cannot move from {from} to {to}")]
    InvalidStateTransition {
        plugin_id: String,
        from: PluginState,
        to: PluginState,
    },

    /// Raised by plugin implementations to report their own failures.
    #[error("Plugin error in '{plugin_name}': {message}")]
    Plugin { message: String, plugin_name: String },

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for GestAgentError {
    fn from(err: serde_json::Error) -> Self {
        GestAgentError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident) => {
        pastey::paste! {
            #[doc = "Create a " $variant " error"]
            pub fn $name<S: Into<String>>(message: S) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: None,
                }
            }

            #[doc = "Create a " $variant " error with source"]
            pub fn [<$name _with_source>]<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
                message: S,
                source: E,
            ) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: Some(Box::new(source)),
                }
            }
        }
    };
}

macro_rules! plugin_fault_constructor {
    ($name:ident, $variant:ident) => {
        pastey::paste! {
            #[doc = "Wrap a plugin-originated error as " $variant ", keeping it as the source"]
            pub fn $name(plugin_id: impl Into<String>, cause: GestAgentError) -> Self {
                Self::$variant {
                    plugin_id: plugin_id.into(),
                    message: cause.to_string(),
                    source: Some(Box::new(cause)),
                }
            }

            #[doc = "Create a " $variant " error without an underlying cause"]
            pub fn [<$name _message>](plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
                Self::$variant {
                    plugin_id: plugin_id.into(),
                    message: message.into(),
                    source: None,
                }
            }
        }
    };
}

impl GestAgentError {
    error_constructor!(validation, Validation);
    error_constructor!(serialization, Serialization);

    plugin_fault_constructor!(plugin_validation, PluginValidation);
    plugin_fault_constructor!(plugin_processing, PluginProcessing);
    plugin_fault_constructor!(plugin_initialization, PluginInitialization);
    plugin_fault_constructor!(plugin_shutdown, PluginShutdown);

    /// Classify this error for hosts that only care about the category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GestAgentError::Io(_) => ErrorKind::Io,
            GestAgentError::Validation { .. } => ErrorKind::Validation,
            GestAgentError::Serialization { .. } => ErrorKind::Serialization,
            GestAgentError::DuplicateId { .. } => ErrorKind::DuplicateId,
            GestAgentError::NotFound { .. } => ErrorKind::NotFound,
            GestAgentError::NoPluginForType { .. } => ErrorKind::NoPluginForType,
            GestAgentError::NoReadyPlugin { .. } => ErrorKind::NoReadyPlugin,
            GestAgentError::ValidationRejected { .. } => ErrorKind::ValidationRejected,
            GestAgentError::PluginValidation { .. } => ErrorKind::PluginValidation,
            GestAgentError::PluginProcessing { .. } => ErrorKind::PluginProcessing,
            GestAgentError::PluginTimeout { .. } => ErrorKind::PluginTimeout,
            GestAgentError::PluginInitialization { .. } => ErrorKind::PluginInitialization,
            GestAgentError::PluginShutdown { .. } => ErrorKind::PluginShutdown,
            GestAgentError::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            GestAgentError::Plugin { .. } => ErrorKind::Plugin,
            GestAgentError::Other(_) => ErrorKind::Other,
        }
    }

    /// The plugin this error is attributed to, if any.
    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            GestAgentError::DuplicateId { plugin_id }
            | GestAgentError::NotFound { plugin_id }
            | GestAgentError::ValidationRejected { plugin_id, .. }
            | GestAgentError::PluginValidation { plugin_id, .. }
            | GestAgentError::PluginProcessing { plugin_id, .. }
            | GestAgentError::PluginTimeout { plugin_id, .. }
            | GestAgentError::PluginInitialization { plugin_id, .. }
            | GestAgentError::PluginShutdown { plugin_id, .. }
            | GestAgentError::InvalidStateTransition { plugin_id, .. } => Some(plugin_id.as_str()),
            GestAgentError::Plugin { plugin_name, .. } => Some(plugin_name.as_str()),
            _ => None,
        }
    }
}
