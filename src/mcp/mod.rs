//! Model Context Protocol (MCP) client plumbing.

pub mod client;
pub mod schema;
pub mod transport;

pub use client::{MCPClient, MCPConnectionState};
pub use schema::{CallOutcome, CapabilityDescriptor, ContentBlock, SchemaBuilder};
pub use transport::{MCPTransport, StdioTransport};
#[cfg(feature = "http")]
pub use transport::StreamableHttpTransport;
