//! Shared test plugins.

#![allow(dead_code)]

use async_trait::async_trait;
use gestagent::plugins::{DocumentPlugin, Plugin, PluginMetadata};
use gestagent::{GestAgentError, Payload, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Barrier;

/// Configurable document plugin that records how it was called.
pub struct MockPlugin {
    pub id: String,
    pub plugin_type: String,
    pub document_types: Vec<String>,
    pub accept: AtomicBool,
    pub fail_init: AtomicBool,
    pub process_error: Option<String>,
    /// Adds `currency: EUR` to the processed payload.
    pub add_currency: bool,
    pub process_delay: Duration,
    /// Only the first `slow_calls` process calls are delayed.
    pub slow_calls: AtomicUsize,
    pub barrier: Option<Arc<Barrier>>,
    pub reentrant: bool,

    pub init_calls: AtomicUsize,
    pub validate_calls: AtomicUsize,
    pub process_calls: AtomicUsize,
    pub shutdown_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockPlugin {
    pub fn new(id: &str, document_types: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            plugin_type: "ocr".to_string(),
            document_types: document_types.iter().map(|t| t.to_string()).collect(),
            accept: AtomicBool::new(true),
            fail_init: AtomicBool::new(false),
            process_error: None,
            add_currency: false,
            process_delay: Duration::ZERO,
            slow_calls: AtomicUsize::new(usize::MAX),
            barrier: None,
            reentrant: false,
            init_calls: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
            process_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(self) -> Self {
        self.accept.store(false, Ordering::SeqCst);
        self
    }

    pub fn failing_init(self) -> Self {
        self.fail_init.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_process(mut self, message: &str) -> Self {
        self.process_error = Some(message.to_string());
        self
    }

    pub fn with_currency(mut self) -> Self {
        self.add_currency = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.process_delay = delay;
        self
    }

    pub fn slow_for(self, calls: usize) -> Self {
        self.slow_calls.store(calls, Ordering::SeqCst);
        self
    }

    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn reentrant(mut self) -> Self {
        self.reentrant = true;
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    fn plugin_id(&self) -> &str {
        &self.id
    }

    fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    fn version(&self) -> String {
        "1.0.0".to_string()
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(format!("Mock {}", self.id), self.document_types.iter().cloned())
            .with_description("Test plugin")
            .with_author("GestAgent tests")
    }

    async fn initialize(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(GestAgentError::Plugin {
                message: "initialization refused".to_string(),
                plugin_name: self.id.clone(),
            });
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DocumentPlugin for MockPlugin {
    async fn validate_document(&self, _document_type: &str, _data: &Payload) -> Result<bool> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accept.load(Ordering::SeqCst))
    }

    async fn process_document(&self, _document_type: &str, data: &Payload) -> Result<Payload> {
        let call = self.process_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if !self.process_delay.is_zero() && call < self.slow_calls.load(Ordering::SeqCst) {
            tokio::time::sleep(self.process_delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = &self.process_error {
            return Err(GestAgentError::Plugin {
                message: message.clone(),
                plugin_name: self.id.clone(),
            });
        }

        let mut output = data.clone();
        if self.add_currency {
            output.insert("currency".to_string(), "EUR".into());
        }
        Ok(output)
    }

    fn is_reentrant(&self) -> bool {
        self.reentrant
    }
}

/// Install tracing output for a test run, honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
