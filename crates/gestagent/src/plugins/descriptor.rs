//! Plugin metadata and descriptors.

use crate::plugins::Plugin;
use crate::{GestAgentError, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// What a plugin reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Document types this plugin can handle, in declaration order.
    pub supported_document_types: IndexSet<String>,
    #[serde(default)]
    pub author: String,
}

impl PluginMetadata {
    pub fn new<I, S>(name: impl Into<String>, supported_document_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: String::new(),
            supported_document_types: supported_document_types.into_iter().map(Into::into).collect(),
            author: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn supports(&self, document_type: &str) -> bool {
        self.supported_document_types.contains(document_type)
    }
}

/// Immutable registration record for one plugin.
///
/// Built by the host from the plugin's [`PluginMetadata`] plus a declared or
/// generated id, type and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    plugin_id: String,
    plugin_type: String,
    version: String,
    metadata: PluginMetadata,
}

impl PluginDescriptor {
    /// Create a descriptor, validating the id and the supported document types.
    ///
    /// # Errors
    ///
    /// Returns `GestAgentError::Validation` if the id is empty or contains
    /// whitespace, or if the plugin supports no document type.
    pub fn new(
        plugin_id: impl Into<String>,
        plugin_type: impl Into<String>,
        version: impl Into<String>,
        metadata: PluginMetadata,
    ) -> Result<Self> {
        let descriptor = Self {
            plugin_id: plugin_id.into(),
            plugin_type: plugin_type.into(),
            version: version.into(),
            metadata,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Build a descriptor from the plugin's own declared identity.
    pub fn from_plugin(plugin: &dyn Plugin) -> Result<Self> {
        Self::new(
            plugin.plugin_id(),
            plugin.plugin_type(),
            plugin.version(),
            plugin.metadata(),
        )
    }

    /// Build a descriptor with a fresh `<plugin_type>-<uuid>` id.
    ///
    /// Useful when the same implementation is installed several times.
    pub fn with_generated_id(plugin: &dyn Plugin) -> Result<Self> {
        let plugin_id = format!("{}-{}", plugin.plugin_type(), uuid::Uuid::new_v4());
        Self::new(plugin_id, plugin.plugin_type(), plugin.version(), plugin.metadata())
    }

    /// Re-check the descriptor invariants.
    ///
    /// Descriptors can also arrive through deserialization, which bypasses [`new`](Self::new).
    pub fn validate(&self) -> Result<()> {
        validate_plugin_id(&self.plugin_id)?;

        if self.metadata.supported_document_types.is_empty() {
            return Err(GestAgentError::validation(format!(
                "Plugin '{}' must support at least one document type",
                self.plugin_id
            )));
        }

        if let Some(blank) = self
            .metadata
            .supported_document_types
            .iter()
            .find(|document_type| document_type.trim().is_empty())
        {
            return Err(GestAgentError::validation(format!(
                "Plugin '{}' declares an empty document type {:?}",
                self.plugin_id, blank
            )));
        }

        Ok(())
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    pub fn supported_document_types(&self) -> impl Iterator<Item = &str> {
        self.metadata.supported_document_types.iter().map(String::as_str)
    }
}

/// Validate a plugin id before registration.
///
/// # Rules
///
/// - Id cannot be empty
/// - Id cannot contain whitespace
fn validate_plugin_id(plugin_id: &str) -> Result<()> {
    if plugin_id.is_empty() {
        return Err(GestAgentError::validation("Plugin id cannot be empty"));
    }

    if plugin_id.contains(char::is_whitespace) {
        return Err(GestAgentError::validation(format!(
            "Plugin id '{}' cannot contain whitespace",
            plugin_id
        )));
    }

    Ok(())
}
