//! Configuration and the assembled plugin system.
//!
//! - **Configuration** (`config`): `PluginSystemConfig` loading from TOML, YAML or JSON and discovery of `gestagent.toml`
//! - **System** (`system`): `PluginSystem`, the registry, lifecycle manager and router wired together
//!
//! # Example
//!
//! ```rust,no_run
//! use gestagent::core::system::PluginSystem;
//!
//! # async fn example() -> gestagent::Result<()> {
//! let system = PluginSystem::discover()?;
//! println!("Invocation timeout: {:?}", system.config().invocation_timeout());
//! system.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod system;

pub use config::PluginSystemConfig;
pub use system::PluginSystem;
