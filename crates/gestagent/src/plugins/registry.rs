//! Plugin registration and discovery.
//!
//! The [`PluginRegistry`] indexes plugins by id and by each supported document
//! type. It does not own instances: entries hold a weak reference, ownership
//! stays with the [`LifecycleManager`](crate::plugins::lifecycle::LifecycleManager).

use crate::plugins::PluginDescriptor;
use crate::plugins::lifecycle::PluginInstance;
use crate::{GestAgentError, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

struct RegistryEntry {
    descriptor: Arc<PluginDescriptor>,
    instance: Weak<PluginInstance>,
}

/// Id index and type index, always updated together.
#[derive(Default)]
struct RegistryIndex {
    entries: IndexMap<String, RegistryEntry>,
    /// document type -> plugin ids in registration order
    by_type: HashMap<String, Vec<String>>,
}

/// Registry of document plugins.
///
/// # Thread Safety
///
/// Registration takes the write lock; lookups take the read lock. The id index
/// and the type index live behind the same lock, so a reader never observes one
/// without the other.
///
/// # Example
///
/// ```rust,no_run
/// use gestagent::plugins::registry::PluginRegistry;
///
/// let registry = PluginRegistry::new();
/// assert!(registry.lookup_by_type("invoice").is_empty());
/// ```
#[derive(Default)]
pub struct PluginRegistry {
    index: RwLock<RegistryIndex>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin instance under its descriptor.
    ///
    /// # Errors
    ///
    /// - `GestAgentError::Validation` if the descriptor is invalid or does not
    ///   describe `instance`
    /// - `GestAgentError::DuplicateId` if the id is already registered; the
    ///   registry is left unchanged
    pub fn register(&self, descriptor: &PluginDescriptor, instance: &Arc<PluginInstance>) -> Result<()> {
        descriptor.validate()?;

        if descriptor != instance.descriptor().as_ref() {
            return Err(GestAgentError::validation(format!(
                "Descriptor '{}' does not match plugin instance '{}'",
                descriptor.plugin_id(),
                instance.plugin_id()
            )));
        }

        let plugin_id = descriptor.plugin_id().to_string();
        let mut index = self.index.write();

        if index.entries.contains_key(&plugin_id) {
            return Err(GestAgentError::DuplicateId { plugin_id });
        }

        for document_type in descriptor.supported_document_types() {
            index
                .by_type
                .entry(document_type.to_string())
                .or_default()
                .push(plugin_id.clone());
        }
        index.entries.insert(
            plugin_id.clone(),
            RegistryEntry {
                descriptor: Arc::clone(instance.descriptor()),
                instance: Arc::downgrade(instance),
            },
        );

        tracing::debug!(
            plugin_id = %plugin_id,
            document_types = ?descriptor.metadata().supported_document_types,
            "Registered plugin"
        );
        Ok(())
    }

    /// Remove a plugin and every type-index entry pointing at it.
    ///
    /// The instance itself is not shut down.
    pub fn unregister(&self, plugin_id: &str) -> Result<Arc<PluginDescriptor>> {
        let mut index = self.index.write();

        let entry = index
            .entries
            .shift_remove(plugin_id)
            .ok_or_else(|| GestAgentError::NotFound {
                plugin_id: plugin_id.to_string(),
            })?;

        for document_type in entry.descriptor.supported_document_types() {
            if let Some(ids) = index.by_type.get_mut(document_type) {
                ids.retain(|id| id != plugin_id);
                if ids.is_empty() {
                    index.by_type.remove(document_type);
                }
            }
        }

        tracing::debug!(plugin_id = %plugin_id, "Unregistered plugin");
        Ok(entry.descriptor)
    }

    /// Plugin ids supporting `document_type`, in registration order.
    pub fn lookup_by_type(&self, document_type: &str) -> Vec<String> {
        self.index
            .read()
            .by_type
            .get(document_type)
            .cloned()
            .unwrap_or_default()
    }

    pub fn lookup_by_id(&self, plugin_id: &str) -> Result<Arc<PluginDescriptor>> {
        self.index
            .read()
            .entries
            .get(plugin_id)
            .map(|entry| Arc::clone(&entry.descriptor))
            .ok_or_else(|| GestAgentError::NotFound {
                plugin_id: plugin_id.to_string(),
            })
    }

    /// The live instance behind a registration.
    ///
    /// Returns `NotFound` if the id is unknown or its owner has already dropped
    /// the instance.
    pub fn instance(&self, plugin_id: &str) -> Result<Arc<PluginInstance>> {
        self.index
            .read()
            .entries
            .get(plugin_id)
            .and_then(|entry| entry.instance.upgrade())
            .ok_or_else(|| GestAgentError::NotFound {
                plugin_id: plugin_id.to_string(),
            })
    }

    pub fn lookup_by_plugin_type(&self, plugin_type: &str) -> Vec<String> {
        self.index
            .read()
            .entries
            .values()
            .filter(|entry| entry.descriptor.plugin_type() == plugin_type)
            .map(|entry| entry.descriptor.plugin_id().to_string())
            .collect()
    }

    /// All registered plugin ids in registration order.
    pub fn list(&self) -> Vec<String> {
        self.index.read().entries.keys().cloned().collect()
    }

    /// Document types with at least one registered plugin, sorted.
    pub fn document_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.index.read().by_type.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn supports(&self, document_type: &str) -> bool {
        self.index.read().by_type.contains_key(document_type)
    }

    pub fn len(&self) -> usize {
        self.index.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().entries.is_empty()
    }

    /// Drop every registration. Instances are not shut down.
    pub fn clear(&self) {
        let mut index = self.index.write();
        index.entries.clear();
        index.by_type.clear();
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry").field("plugins", &self.list()).finish()
    }
}
