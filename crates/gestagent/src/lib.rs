//! GestAgent - Document Processing Plugin Core
//!
//! GestAgent routes business documents (invoices, receipts, ...) to pluggable
//! processors such as OCR engines, classifiers and enrichers. This crate is the
//! core those processors plug into: it registers them, manages their lifecycle
//! and invokes them with timeouts and failure isolation.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gestagent::{Payload, PluginSystem};
//! use serde_json::json;
//! # use std::sync::Arc;
//! # async fn example(plugin: Arc<dyn gestagent::plugins::DocumentPlugin>) -> gestagent::Result<()> {
//! let system = PluginSystem::default();
//! system.install(plugin).await?;
//!
//! let output = system
//!     .invoke_default("invoice", Payload::try_from(json!({"amount": 100}))?)
//!     .await?;
//! println!("Handled by {}: {:?}", output.plugin_id, output.payload);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Plugin System** (`plugins`): plugin traits, registry, lifecycle manager, invocation router
//! - **Core Module** (`core`): configuration loading and the assembled `PluginSystem`
//! - **Types** (`types`): payloads, lifecycle states, invocation requests and results
//!
//! # Features
//!
//! - Per-document-type routing with first-ready selection
//! - Validate-then-process invocation under one deadline
//! - Plugin panics and timeouts isolated from the host
//! - Per-instance call serialization, opt-in reentrancy

#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod plugins;
pub mod types;

pub use error::{GestAgentError, Result};
pub use types::*;

pub use core::config::PluginSystemConfig;
pub use core::system::PluginSystem;
