//! MCP transport layer.
//!
//! A transport knows how to open one channel to a provider and run the MCP
//! initialize handshake over it. Each call to [`MCPTransport::connect`] opens
//! a fresh channel, so reconnecting is just connecting again.

use async_trait::async_trait;
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, DynService, RoleClient, RunningService};

pub type DynClientService = Box<dyn DynService<RoleClient>>;
pub type MCPRunningService = RunningService<RoleClient, DynClientService>;

/// Why a transport could not produce a running session.
#[derive(Debug)]
pub enum ConnectError {
    /// The channel itself could not be opened (spawn failure, bad endpoint).
    Open(String),
    /// The channel opened but the initialize exchange failed.
    Initialize(ClientInitializeError),
}

impl From<ClientInitializeError> for ConnectError {
    fn from(error: ClientInitializeError) -> Self {
        Self::Initialize(error)
    }
}

/// Transport trait for MCP communication.
#[async_trait]
pub trait MCPTransport: Send + Sync {
    /// Open a channel and run the initialize handshake on it.
    async fn connect(&mut self, client_info: ClientInfo) -> Result<MCPRunningService, ConnectError>;

    /// Short human-readable target, used in log fields.
    fn target(&self) -> String;
}

#[cfg(feature = "http")]
mod http;
mod stdio;

#[cfg(feature = "http")]
pub use http::StreamableHttpTransport;
pub use stdio::StdioTransport;
