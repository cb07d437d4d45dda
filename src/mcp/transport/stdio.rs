use std::collections::BTreeMap;

use async_trait::async_trait;
use rmcp::model::ClientInfo;
use rmcp::service::ServiceExt;
use rmcp::transport::TokioChildProcess;
use tokio::process::Command;

use super::{ConnectError, MCPRunningService, MCPTransport};

/// Stdio-based MCP transport (for local MCP servers).
///
/// The child inherits the bridge's environment with `env` layered on top.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl StdioTransport {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn build_command(&self) -> Result<Command, ConnectError> {
        if self.command.trim().is_empty() {
            return Err(ConnectError::Open("stdio provider has no command".into()));
        }
        let mut command = Command::new(&self.command);
        command.args(&self.args).envs(&self.env).kill_on_drop(true);
        Ok(command)
    }
}

#[async_trait]
impl MCPTransport for StdioTransport {
    async fn connect(&mut self, client_info: ClientInfo) -> Result<MCPRunningService, ConnectError> {
        let command = self.build_command()?;
        let transport = TokioChildProcess::new(command).map_err(|error| {
            ConnectError::Open(format!("failed to spawn '{}': {error}", self.command))
        })?;

        Ok(client_info.into_dyn().serve(transport).await?)
    }

    fn target(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}
