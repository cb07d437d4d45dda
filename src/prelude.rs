//! Convenience re-exports for common use.

pub use crate::agents::{AgentConfig, AgentStore, AgentUpdate};
pub use crate::bridge::{
    AgentPolicySource, AgentToolPolicy, BridgeManager, InitReport, ManagerState, ProviderStatus,
    SessionState, ShutdownReport,
};
pub use crate::config::{BridgeSettings, ProviderConfig, ProviderConfigStore, TransportKind};
pub use crate::error::{BridgeError, CapabilityError, Result, ValidationIssue};
pub use crate::tools::{ArgumentSchema, ArgumentType, CapabilityWrapper};
