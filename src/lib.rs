//! Yue Bridge: MCP tool providers as agent capabilities.
//!
//! Spawns and supervises external tool providers (child processes over stdio
//! or remote streamable-HTTP endpoints), discovers their capabilities,
//! validates arguments against each provider's schema, and hands every agent
//! the subset of capabilities its allow-list permits.
//!
//! # Quick Start
//!
//! ```no_run
//! use yue_bridge::prelude::*;
//!
//! # async fn example() -> yue_bridge::error::Result<()> {
//! let manager = BridgeManager::new(BridgeSettings::from_env());
//! let report = manager.initialize_from_store().await?;
//! for (provider, error) in &report.failed {
//!     eprintln!("{provider} unavailable: {error}");
//! }
//!
//! for capability in manager.capabilities_for(&AgentToolPolicy::AllowAll) {
//!     println!("{}: {}", capability.name(), capability.description());
//! }
//! let now = manager.capabilities_for(&AgentToolPolicy::deny_all())[0]
//!     .call(serde_json::json!({ "utc": true }))
//!     .await?;
//! println!("{now}");
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod bridge;
pub mod config;
pub mod error;
pub mod mcp;
pub mod prelude;
pub mod tools;
pub mod util;
