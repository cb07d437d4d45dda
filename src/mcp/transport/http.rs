use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::model::ClientInfo;
use rmcp::service::ServiceExt;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;

use super::{ConnectError, MCPRunningService, MCPTransport};

/// Streamable-HTTP MCP transport (for remote MCP servers).
pub struct StreamableHttpTransport {
    url: String,
    headers: BTreeMap<String, String>,
}

impl StreamableHttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn http_client(&self) -> Result<reqwest::Client, ConnectError> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ConnectError::Open(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ConnectError::Open(format!("invalid value for header '{key}': {e}")))?;
            headers.insert(name, value);
        }
        reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConnectError::Open(format!("failed to build HTTP client: {e}")))
    }
}

#[async_trait]
impl MCPTransport for StreamableHttpTransport {
    async fn connect(&mut self, client_info: ClientInfo) -> Result<MCPRunningService, ConnectError> {
        if self.url.trim().is_empty() {
            return Err(ConnectError::Open("http provider has no url".into()));
        }
        let client = self.http_client()?;
        let transport = StreamableHttpClientTransport::with_client(
            client,
            StreamableHttpClientTransportConfig::with_uri(self.url.clone()),
        );

        Ok(client_info.into_dyn().serve(transport).await?)
    }

    fn target(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect_error(result: Result<MCPRunningService, ConnectError>) -> ConnectError {
        match result {
            Ok(_) => panic!("expected connect to fail"),
            Err(error) => error,
        }
    }

    #[tokio::test]
    async fn invalid_header_is_an_open_error() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        let mut transport = StreamableHttpTransport::new("http://127.0.0.1:1/mcp").with_headers(headers);

        let err = connect_error(transport.connect(ClientInfo::default()).await);
        assert!(matches!(err, ConnectError::Open(message) if message.contains("invalid header name")));
    }

    #[tokio::test]
    async fn blank_url_is_an_open_error() {
        let mut transport = StreamableHttpTransport::new("");
        let err = connect_error(transport.connect(ClientInfo::default()).await);
        assert!(matches!(err, ConnectError::Open(_)));
    }
}
