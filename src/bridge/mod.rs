//! Provider sessions, allow-list policy and the bridge manager.

pub mod manager;
pub mod policy;
pub mod session;

pub use manager::{BridgeManager, InitReport, ManagerState, ShutdownReport};
pub use policy::{AgentPolicySource, AgentToolPolicy};
pub use session::{
    DiscoveredCapability, McpConnector, ProviderClient, ProviderConnector, ProviderSession,
    ProviderStatus, SessionState,
};
