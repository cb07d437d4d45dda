//! MCP client for one provider connection.

use rmcp::{
    model::{CallToolRequestParams, CallToolResult, ClientInfo, Content, JsonObject, ProtocolVersion},
    service::{ClientInitializeError, ServiceError},
};

use crate::error::CapabilityError;

use super::schema::{CallOutcome, CapabilityDescriptor, ContentBlock};
use super::transport::{ConnectError, MCPRunningService, MCPTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MCPConnectionState {
    Disconnected,
    Initialized,
    Closed,
}

/// Client for a Model Context Protocol server.
///
/// Owns the transport so the same client can be connected again after
/// [`MCPClient::close`] or a broken channel.
pub struct MCPClient {
    provider: String,
    transport: Box<dyn MCPTransport>,
    session: Option<MCPRunningService>,
    state: MCPConnectionState,
}

impl MCPClient {
    pub fn new(provider: impl Into<String>, transport: Box<dyn MCPTransport>) -> Self {
        Self {
            provider: provider.into(),
            transport,
            session: None,
            state: MCPConnectionState::Disconnected,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn connection_state(&self) -> MCPConnectionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == MCPConnectionState::Initialized
    }

    /// Open the channel and complete the initialize handshake.
    ///
    /// Any previous session is dropped first.
    pub async fn connect(&mut self) -> Result<(), CapabilityError> {
        if let Some(previous) = self.session.take() {
            let _ = previous.cancel().await;
        }
        self.state = MCPConnectionState::Disconnected;

        let session = self.connect_with_protocol_fallback().await?;
        if let Some(info) = session.peer_info() {
            tracing::debug!(
                provider = %self.provider,
                server = %info.server_info.name,
                protocol = ?info.protocol_version,
                "MCP handshake complete"
            );
        }
        self.session = Some(session);
        self.state = MCPConnectionState::Initialized;
        Ok(())
    }

    /// List every capability the provider advertises.
    pub async fn list_tools(&self) -> Result<Vec<CapabilityDescriptor>, CapabilityError> {
        let session = self.active_session()?;

        let tools = match session.list_all_tools().await {
            Ok(tools) => tools,
            Err(ServiceError::UnexpectedResponse) => session
                .list_tools(None)
                .await
                .map(|page| page.tools)
                .map_err(|error| map_discovery_error(&self.provider, error))?,
            Err(error) => return Err(map_discovery_error(&self.provider, error)),
        };

        Ok(tools.into_iter().map(map_mcp_tool_schema).collect())
    }

    /// Invoke one capability by its provider-local name.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: JsonObject,
    ) -> Result<CallOutcome, CapabilityError> {
        let session = self.active_session()?;

        let result = session
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments: Some(arguments),
                task: None,
            })
            .await
            .map_err(|error| map_call_error(&self.provider, name, error))?;

        Ok(map_call_result(result))
    }

    /// Terminate the session. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(error) = session.cancel().await {
                tracing::debug!(provider = %self.provider, error = %error, "MCP session did not stop cleanly");
            }
        }
        self.state = MCPConnectionState::Closed;
    }

    fn active_session(&self) -> Result<&MCPRunningService, CapabilityError> {
        match (&self.session, self.state) {
            (Some(session), MCPConnectionState::Initialized) if !session.is_closed() => Ok(session),
            (Some(_), MCPConnectionState::Initialized) => Err(CapabilityError::transport_broken(
                &self.provider,
                "MCP session is closed",
            )),
            _ => Err(CapabilityError::NotReady {
                provider: self.provider.clone(),
                state: format!("{:?}", self.state).to_ascii_lowercase(),
            }),
        }
    }

    async fn connect_with_protocol_fallback(&mut self) -> Result<MCPRunningService, CapabilityError> {
        let latest_client_info = ClientInfo {
            protocol_version: ProtocolVersion::LATEST,
            ..Default::default()
        };

        match self.transport.connect(latest_client_info).await {
            Ok(session) => return Ok(session),
            Err(ConnectError::Initialize(error)) if should_retry_protocol_fallback(&error) => {
                tracing::debug!(
                    provider = %self.provider,
                    target = %self.transport.target(),
                    "retrying MCP handshake with legacy protocol version"
                );
            }
            Err(error) => return Err(map_connect_error(&self.provider, error)),
        }

        let fallback_client_info = ClientInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            ..Default::default()
        };
        self.transport
            .connect(fallback_client_info)
            .await
            .map_err(|error| map_connect_error(&self.provider, error))
    }
}

fn should_retry_protocol_fallback(error: &ClientInitializeError) -> bool {
    match error {
        ClientInitializeError::JsonRpcError(error) => {
            let message = error.message.to_ascii_lowercase();
            message.contains("protocol") && message.contains("version")
        }
        _ => false,
    }
}

fn map_mcp_tool_schema(tool: rmcp::model::Tool) -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()),
        input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
    }
}

fn map_content_block(item: &Content) -> ContentBlock {
    if let Some(text) = item.as_text() {
        return ContentBlock::Text(text.text.clone());
    }
    let kind = serde_json::to_value(item)
        .ok()
        .and_then(|value| value.get("type").and_then(|t| t.as_str()).map(str::to_owned))
        .unwrap_or_else(|| "unknown".into());
    ContentBlock::Other { kind }
}

fn map_call_result(result: CallToolResult) -> CallOutcome {
    let mut content: Vec<ContentBlock> = result.content.iter().map(map_content_block).collect();
    // Structured-only replies render as their JSON text.
    if content.is_empty() {
        if let Some(structured) = result.structured_content {
            content.push(ContentBlock::Text(structured.to_string()));
        }
    }
    CallOutcome {
        content,
        is_error: result.is_error.unwrap_or(false),
    }
}

fn map_connect_error(provider: &str, error: ConnectError) -> CapabilityError {
    match error {
        ConnectError::Open(message) => CapabilityError::connection(provider, message),
        ConnectError::Initialize(error) => map_client_initialize_error(provider, error),
    }
}

fn map_client_initialize_error(provider: &str, error: ClientInitializeError) -> CapabilityError {
    match error {
        ClientInitializeError::TransportError { error, context } => CapabilityError::connection(
            provider,
            format!("MCP initialize transport error ({context}): {error}"),
        ),
        ClientInitializeError::ConnectionClosed(context) => {
            CapabilityError::handshake(provider, format!("connection closed during initialize: {context}"))
        }
        ClientInitializeError::JsonRpcError(error) => CapabilityError::handshake(
            provider,
            format!("initialize JSON-RPC error {}: {}", error.code.0, error.message),
        ),
        ClientInitializeError::Cancelled => {
            CapabilityError::handshake(provider, "initialize cancelled")
        }
        other => CapabilityError::handshake(provider, format!("initialize error: {other}")),
    }
}

fn is_channel_failure(error: &ServiceError) -> bool {
    matches!(
        error,
        ServiceError::TransportClosed | ServiceError::TransportSend(_) | ServiceError::Cancelled { .. }
    )
}

fn map_discovery_error(provider: &str, error: ServiceError) -> CapabilityError {
    if is_channel_failure(&error) {
        return CapabilityError::transport_broken(provider, format!("tools/list: {error}"));
    }
    match error {
        ServiceError::McpError(error) => CapabilityError::discovery(
            provider,
            format!("tools/list MCP error {}: {}", error.code.0, error.message),
        ),
        ServiceError::UnexpectedResponse => {
            CapabilityError::discovery(provider, "tools/list: unexpected MCP response")
        }
        other => CapabilityError::discovery(provider, format!("tools/list: {other}")),
    }
}

fn map_call_error(provider: &str, capability: &str, error: ServiceError) -> CapabilityError {
    if is_channel_failure(&error) {
        return CapabilityError::transport_broken(provider, format!("tools/call {capability}: {error}"));
    }
    match error {
        ServiceError::McpError(error) => CapabilityError::invocation(
            capability,
            format!("MCP error {}: {}", error.code.0, error.message),
        ),
        ServiceError::UnexpectedResponse => {
            CapabilityError::invocation(capability, "unexpected MCP response")
        }
        ServiceError::Timeout { timeout } => CapabilityError::InvocationTimeout {
            capability: capability.to_owned(),
            timeout_ms: timeout.as_millis() as u64,
        },
        other => CapabilityError::invocation(capability, format!("MCP service error: {other}")),
    }
}
