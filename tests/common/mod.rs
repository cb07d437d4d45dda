//! Shared test helpers: scriptable stub providers with call counters.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use yue_bridge::bridge::{ProviderClient, ProviderConnector};
use yue_bridge::config::{BridgeSettings, ProviderConfig};
use yue_bridge::error::CapabilityError;
use yue_bridge::mcp::{CallOutcome, CapabilityDescriptor};
use yue_bridge::tools::JsonObject;

/// How a stub answers one `call`.
#[derive(Debug, Clone)]
pub enum StubReply {
    /// `"<provider>:<capability> <arguments>"`.
    Echo,
    Text(String),
    ProviderError(String),
    Hang,
    BrokenPipe,
}

/// Script and counters for one stub provider.
#[derive(Debug)]
pub struct StubProvider {
    name: String,
    refuse_spawn: bool,
    connect_delay: Option<Duration>,
    tools: Vec<CapabilityDescriptor>,
    replies: Mutex<VecDeque<StubReply>>,
    pub connects: AtomicUsize,
    pub lists: AtomicUsize,
    pub calls: AtomicUsize,
    pub closes: AtomicUsize,
    pub last_arguments: Mutex<Option<JsonObject>>,
}

impl StubProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            refuse_spawn: false,
            connect_delay: None,
            tools: Vec::new(),
            replies: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            last_arguments: Mutex::new(None),
        }
    }

    pub fn refusing_spawn(mut self) -> Self {
        self.refuse_spawn = true;
        self
    }

    /// Sleeps for `delay` before answering the handshake.
    pub fn connecting_after(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Adds a capability with one optional string argument `query`.
    pub fn tool(self, name: &str) -> Self {
        self.tool_with_schema(
            name,
            json!({ "type": "object", "properties": { "query": { "type": "string" } } }),
        )
    }

    pub fn tool_with_schema(mut self, name: &str, schema: serde_json::Value) -> Self {
        self.tools.push(
            CapabilityDescriptor::new(name, schema).with_description(format!("{name} tool")),
        );
        self
    }

    pub fn replies(self, replies: Vec<StubReply>) -> Self {
        *self.replies.lock().unwrap() = replies.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// A client whose behavior comes from a shared [`StubProvider`].
pub struct StubClient {
    provider: Arc<StubProvider>,
    connected: bool,
}

#[async_trait]
impl ProviderClient for StubClient {
    async fn connect(&mut self) -> Result<(), CapabilityError> {
        self.provider.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.provider.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.provider.refuse_spawn {
            return Err(CapabilityError::Connection {
                provider: self.provider.name.clone(),
                message: "failed to spawn: no such file or directory".into(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>, CapabilityError> {
        self.provider.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.provider.tools.clone())
    }

    async fn call(
        &self,
        capability: &str,
        arguments: JsonObject,
    ) -> Result<CallOutcome, CapabilityError> {
        self.provider.calls.fetch_add(1, Ordering::SeqCst);
        *self.provider.last_arguments.lock().unwrap() = Some(arguments.clone());
        let reply = self
            .provider
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StubReply::Echo);

        match reply {
            StubReply::Echo => Ok(CallOutcome::text(format!(
                "{}:{capability} {}",
                self.provider.name,
                serde_json::Value::Object(arguments)
            ))),
            StubReply::Text(text) => Ok(CallOutcome::text(text)),
            StubReply::ProviderError(text) => Ok(CallOutcome::error(text)),
            StubReply::Hang => std::future::pending().await,
            StubReply::BrokenPipe => Err(CapabilityError::TransportBroken {
                provider: self.provider.name.clone(),
                message: "broken pipe".into(),
            }),
        }
    }

    async fn close(&mut self) {
        if self.connected {
            self.connected = false;
            self.provider.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Hands out [`StubClient`]s keyed by provider name.
#[derive(Default)]
pub struct StubConnector {
    providers: Mutex<HashMap<String, Arc<StubProvider>>>,
}

impl StubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: StubProvider) -> Arc<StubProvider> {
        let provider = Arc::new(provider);
        self.providers
            .lock()
            .unwrap()
            .insert(provider.name.clone(), Arc::clone(&provider));
        provider
    }
}

impl ProviderConnector for StubConnector {
    fn client_for(&self, config: &ProviderConfig) -> Box<dyn ProviderClient> {
        let provider = self
            .providers
            .lock()
            .unwrap()
            .get(&config.name)
            .cloned()
            .unwrap_or_else(|| Arc::new(StubProvider::new(&config.name).refusing_spawn()));
        Box::new(StubClient {
            provider,
            connected: false,
        })
    }
}

/// Short timeouts so timeout paths finish quickly.
pub fn fast_settings() -> BridgeSettings {
    BridgeSettings::builder()
        .handshake_timeout(Duration::from_millis(500))
        .discovery_timeout(Duration::from_millis(500))
        .call_timeout(Duration::from_millis(50))
        .build()
}

pub fn configs(names: &[&str]) -> Vec<ProviderConfig> {
    names
        .iter()
        .map(|name| ProviderConfig::stdio(*name, format!("{name}-server")))
        .collect()
}

pub fn names(wrappers: &[yue_bridge::tools::CapabilityWrapper]) -> Vec<String> {
    wrappers.iter().map(|w| w.name().to_owned()).collect()
}
